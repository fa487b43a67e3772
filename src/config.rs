use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

// Plugin directory convention
pub const DEFAULT_PLUGINS_DIR: &str = "./plugins";
pub const ENTRY_SCRIPT_NAME: &str = "main.lua";

/// Default User-Agent sent by the `fetch` host function
pub fn default_user_agent() -> String {
    format!("lua-plugin-host/{}", env!("CARGO_PKG_VERSION"))
}

/// Options for the outbound `fetch` host function
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Library-level host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root directory holding one subdirectory per plugin
    pub plugins_dir: PathBuf,
    /// Reserved entry-script name, executed last in every plugin
    pub entry_name: String,
    pub fetch: FetchOptions,
}

impl HostConfig {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            entry_name: ENTRY_SCRIPT_NAME.to_string(),
            fetch: FetchOptions::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PLUGINS_DIR)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run every Lua plugin found in a plugins directory")]
pub struct Cli {
    /// Plugins root directory
    #[arg(short, long, default_value = DEFAULT_PLUGINS_DIR)]
    pub plugins_dir: PathBuf,

    /// Entry script name inside each plugin directory
    #[arg(short, long, default_value = ENTRY_SCRIPT_NAME)]
    pub entry: String,

    /// Timeout in seconds for fetch() requests (default: none)
    #[arg(long)]
    pub fetch_timeout: Option<u64>,

    /// User-Agent header for fetch() requests
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    /// Emit journald structured log records
    #[arg(long)]
    pub journald: bool,
}

impl Cli {
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            plugins_dir: self.plugins_dir.clone(),
            entry_name: self.entry.clone(),
            fetch: FetchOptions {
                timeout: self.fetch_timeout.map(Duration::from_secs),
                user_agent: self.user_agent.clone().unwrap_or_else(default_user_agent),
            },
        }
    }
}
