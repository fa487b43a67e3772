//! Error types for the plugin host

use std::path::PathBuf;

use thiserror::Error;

use crate::plugins::environment::EnvState;

/// Failure raised by a host function.
///
/// How a failure becomes visible to the calling script depends on the
/// function's [`ErrorConvention`](crate::plugins::api::ErrorConvention).
#[derive(Error, Debug)]
pub enum HostError {
    #[error("unsupported type")]
    UnsupportedType(String),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("cannot encode non-finite number {0}")]
    NonFinite(f64),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("terminate requested with status {0}")]
    Terminated(i32),
}

/// Unit-scoped failures: logged, then the runner moves on
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to read plugin directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read script {path:?}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error running {path:?}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: mlua::Error,
    },

    #[error("Failed to set up script environment: {0}")]
    Environment(#[from] mlua::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid environment transition from {from:?} to {to:?}")]
    Lifecycle { from: EnvState, to: EnvState },
}

/// Fatal failures that halt the whole run
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Error reading plugins directory {path:?}: {source}")]
    PluginsRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;
