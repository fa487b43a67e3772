//! # Lua Plugin Host
//!
//! Discovers plugin directories, gives each one its own Lua state with a
//! small native API, and runs it:
//!
//! - `fetch(url)` - HTTP GET, returns the body (nothing on failure)
//! - `computeSquare(n)` - integer square
//! - `terminate(status)` - stop the whole run with an exit status
//! - `encodeJSON(value)` / `decodeJSON(text)` - JSON marshaling
//!
//! ## Library usage
//!
//! ```no_run
//! use lua_plugin_host::{HostConfig, Runner};
//!
//! fn main() -> anyhow::Result<()> {
//!     let summary = Runner::new(HostConfig::new("./plugins")).run()?;
//!     if let Some(status) = summary.terminated {
//!         std::process::exit(status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod plugins;

pub use config::{FetchOptions, HostConfig};
pub use plugins::{HostValue, RunSummary, Runner};
