//! One isolated Lua state per plugin unit
//!
//! An environment moves strictly forward through [`EnvState`]:
//! `Created -> LibrariesLoading -> EntryExecuting -> Done`.
//! The host-function catalogue is bound once, inside [`ScriptEnvironment::new`],
//! before any file is loaded.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use mlua::{Lua, Table};

use crate::config::FetchOptions;
use crate::plugins::api::{BridgeContext, TerminationSignal, register_host_functions};
use crate::plugins::error::{PluginError, PluginResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvState {
    Created,
    LibrariesLoading,
    EntryExecuting,
    /// Terminal, whether the entry script succeeded or not
    Done,
}

/// Result of running one script file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed,
    /// The script called `terminate(code)`
    Terminated(i32),
}

pub struct ScriptEnvironment {
    lua: Lua,
    state: EnvState,
    termination: TerminationSignal,
}

impl ScriptEnvironment {
    /// Create a fresh Lua state with the standard libraries and the host API
    pub fn new(unit: &str, fetch: &FetchOptions) -> PluginResult<Self> {
        let lua = Lua::new();
        let termination = TerminationSignal::default();
        let context = BridgeContext::new(fetch, termination.clone())?;
        register_host_functions(&lua, Rc::new(context))?;

        crate::log_debug!("Created script environment for '{}'", unit);

        Ok(Self {
            lua,
            state: EnvState::Created,
            termination,
        })
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    /// Move to the next lifecycle state. Only forward moves are accepted.
    pub fn advance(&mut self, to: EnvState) -> PluginResult<()> {
        let allowed = match (self.state, to) {
            (EnvState::Created, EnvState::LibrariesLoading) => true,
            (EnvState::LibrariesLoading, EnvState::EntryExecuting) => true,
            (from, EnvState::Done) => from != EnvState::Done,
            _ => false,
        };

        if !allowed {
            return Err(PluginError::Lifecycle { from: self.state, to });
        }

        self.state = to;
        Ok(())
    }

    /// Execute a script file inside this environment.
    ///
    /// A pending `terminate` request takes precedence over the script's own
    /// result, so a script that swallows the error with `pcall` still
    /// terminates once control is back in the host.
    pub fn run_file(&self, path: &Path) -> PluginResult<ExecOutcome> {
        if !matches!(self.state, EnvState::LibrariesLoading | EnvState::EntryExecuting) {
            return Err(PluginError::Lifecycle {
                from: self.state,
                to: EnvState::EntryExecuting,
            });
        }

        let code = fs::read(path).map_err(|source| PluginError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;

        let result = self
            .lua
            .load(code)
            .set_name(format!("@{}", path.display()))
            .exec();

        if let Some(code) = self.termination.requested() {
            return Ok(ExecOutcome::Terminated(code));
        }

        result
            .map(|_| ExecOutcome::Completed)
            .map_err(|source| PluginError::Script {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Status requested through `terminate`, if any
    pub fn termination_requested(&self) -> Option<i32> {
        self.termination.requested()
    }

    pub fn globals(&self) -> Table {
        self.lua.globals()
    }
}
