//! Lua plugin system
//!
//! # Plugin Structure
//!
//! The plugins root holds one directory per plugin unit. Inside a unit:
//! - `main.lua` - the entry script, always executed last
//! - any other file - a library, executed first in directory-listing order
//!
//! Each unit gets its own Lua state with the standard libraries and the host
//! API from [`api`]. Plugins are trusted: there is no sandbox, and
//! `terminate` ends the whole run.

pub mod api;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod loader;
pub mod runner;
pub mod value;

pub use discovery::{PluginUnit, discover_units};
pub use environment::{EnvState, ExecOutcome, ScriptEnvironment};
pub use error::{HostError, PluginError, RunnerError};
pub use loader::load_plugin;
pub use runner::{RunSummary, Runner, UnitOutcome};
pub use value::HostValue;
