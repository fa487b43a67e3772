//! Plugin unit discovery
//!
//! Every subdirectory of the plugins root is one plugin unit. Units are
//! produced lazily in directory-listing order, which the filesystem defines
//! and which is neither sorted nor stable across runs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::error::RunnerError;

/// One plugin directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUnit {
    pub name: String,
    pub path: PathBuf,
}

/// Lazy iterator over the plugin units of a root directory
#[derive(Debug)]
pub struct PluginUnits {
    entries: fs::ReadDir,
}

impl Iterator for PluginUnits {
    type Item = PluginUnit;

    fn next(&mut self) -> Option<PluginUnit> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    crate::log_warn!("Failed to read plugins directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            return Some(PluginUnit {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
            });
        }
    }
}

/// List the plugins root. Failing to list it is fatal for the run.
pub fn discover_units(root: &Path) -> Result<PluginUnits, RunnerError> {
    let entries = fs::read_dir(root).map_err(|source| RunnerError::PluginsRoot {
        path: root.to_path_buf(),
        source,
    })?;

    Ok(PluginUnits { entries })
}
