//! Sequential plugin runner
//!
//! Units run one after another on the calling thread. A failing unit is
//! logged and skipped; a `terminate` request stops the run and is handed
//! back to the caller in [`RunSummary::terminated`].

use crate::config::HostConfig;
use crate::core::logger::{log_task_complete_with_details, log_task_start};
use crate::plugins::discovery::{PluginUnit, discover_units};
use crate::plugins::environment::{ExecOutcome, ScriptEnvironment};
use crate::plugins::error::RunnerError;
use crate::plugins::loader::load_plugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    Failed,
    Terminated(i32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Units that were started, in the order they ran
    pub processed: Vec<String>,
    pub completed: usize,
    pub failed: usize,
    /// Exit status requested by a plugin through `terminate`
    pub terminated: Option<i32>,
}

pub struct Runner {
    config: HostConfig,
}

impl Runner {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Run every plugin unit under the configured root
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        log_task_start(&format!("Running plugins from {:?}", self.config.plugins_dir));

        let mut summary = RunSummary::default();

        for unit in discover_units(&self.config.plugins_dir)? {
            summary.processed.push(unit.name.clone());

            match self.run_unit(&unit) {
                UnitOutcome::Completed => summary.completed += 1,
                UnitOutcome::Failed => summary.failed += 1,
                UnitOutcome::Terminated(code) => {
                    crate::log_warn!(
                        "Plugin '{}' requested termination with status {}, stopping",
                        unit.name,
                        code
                    );
                    summary.terminated = Some(code);
                    break;
                }
            }
        }

        log_task_complete_with_details(
            "Plugin run finished",
            &format!("{} completed, {} failed", summary.completed, summary.failed),
        );

        Ok(summary)
    }

    /// Run a single unit in a fresh environment
    pub fn run_unit(&self, unit: &PluginUnit) -> UnitOutcome {
        let mut env = match ScriptEnvironment::new(&unit.name, &self.config.fetch) {
            Ok(env) => env,
            Err(e) => {
                crate::log_error!("Plugin '{}': {}", unit.name, e);
                return UnitOutcome::Failed;
            }
        };

        match load_plugin(&mut env, unit, &self.config.entry_name) {
            Ok(ExecOutcome::Completed) => {
                crate::log_info!("Plugin '{}' finished", unit.name);
                UnitOutcome::Completed
            }
            Ok(ExecOutcome::Terminated(code)) => UnitOutcome::Terminated(code),
            Err(e) => {
                crate::log_error!("Plugin '{}': {}", unit.name, e);
                UnitOutcome::Failed
            }
        }
    }
}
