//! Plugin loading logic
//!
//! Every file in a plugin directory except the entry script is a library.
//! Libraries run first, in directory-listing order, and a broken library is
//! only logged. The entry script runs exactly once, last.

use std::ffi::OsStr;
use std::fs;

use crate::plugins::discovery::PluginUnit;
use crate::plugins::environment::{EnvState, ExecOutcome, ScriptEnvironment};
use crate::plugins::error::{PluginError, PluginResult};

/// Load the libraries of `unit` into `env`, then run its entry script.
///
/// Returns early with [`ExecOutcome::Terminated`] as soon as any script
/// calls `terminate`. The environment is `Done` when this returns, whatever
/// the result.
pub fn load_plugin(
    env: &mut ScriptEnvironment,
    unit: &PluginUnit,
    entry_name: &str,
) -> PluginResult<ExecOutcome> {
    let result = run_plugin(env, unit, entry_name);
    if env.state() != EnvState::Done {
        env.advance(EnvState::Done)?;
    }
    result
}

fn run_plugin(
    env: &mut ScriptEnvironment,
    unit: &PluginUnit,
    entry_name: &str,
) -> PluginResult<ExecOutcome> {
    env.advance(EnvState::LibrariesLoading)?;

    let entries = fs::read_dir(&unit.path).map_err(|source| PluginError::ReadDir {
        path: unit.path.clone(),
        source,
    })?;

    let mut loaded = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                crate::log_warn!("Failed to read entry in {:?}: {}", unit.path, e);
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() || entry.file_name().as_os_str() == OsStr::new(entry_name) {
            continue;
        }

        crate::log_debug!("Loading library {:?}", path);
        match env.run_file(&path) {
            Ok(ExecOutcome::Completed) => loaded += 1,
            Ok(terminated @ ExecOutcome::Terminated(_)) => return Ok(terminated),
            Err(e) => crate::log_warn!("Error loading library: {}", e),
        }
    }

    crate::log_debug!("Plugin '{}': loaded {} library file(s)", unit.name, loaded);

    env.advance(EnvState::EntryExecuting)?;
    env.run_file(&unit.path.join(entry_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENTRY_SCRIPT_NAME, FetchOptions};
    use tempfile::TempDir;

    fn unit_with(files: &[(&str, &str)]) -> (TempDir, PluginUnit) {
        let root = TempDir::new().unwrap();
        let path = root.path().join("p1");
        fs::create_dir(&path).unwrap();
        for (name, code) in files {
            fs::write(path.join(name), code).unwrap();
        }
        let unit = PluginUnit {
            name: "p1".to_string(),
            path,
        };
        (root, unit)
    }

    fn environment() -> ScriptEnvironment {
        ScriptEnvironment::new("p1", &FetchOptions::default()).unwrap()
    }

    #[test]
    fn test_libraries_load_before_entry() {
        let (_root, unit) = unit_with(&[
            ("lib.lua", "loads = (loads or 0) + 1\nfunction double(n) return n * 2 end"),
            (
                ENTRY_SCRIPT_NAME,
                "seen_loads = loads\nresult = computeSquare(double(3))",
            ),
        ]);

        let mut env = environment();
        let outcome = load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap();

        assert_eq!(outcome, ExecOutcome::Completed);
        assert_eq!(env.state(), EnvState::Done);
        assert_eq!(env.globals().get::<i64>("result").unwrap(), 36);
        assert_eq!(env.globals().get::<i64>("seen_loads").unwrap(), 1);
    }

    #[test]
    fn test_entry_runs_exactly_once_and_last() {
        let (_root, unit) = unit_with(&[
            ("a.lua", "order = (order or '') .. 'a'"),
            ("b.lua", "order = (order or '') .. 'b'"),
            (ENTRY_SCRIPT_NAME, "order = (order or '') .. 'M'"),
        ]);

        let mut env = environment();
        load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap();

        let order: String = env.globals().get("order").unwrap();
        assert_eq!(order.len(), 3);
        assert!(order.ends_with('M'));
        assert_eq!(order.matches('M').count(), 1);
    }

    #[test]
    fn test_broken_library_is_skipped() {
        let (_root, unit) = unit_with(&[
            ("broken.lua", "this is not lua"),
            ("good.lua", "good = true"),
            (ENTRY_SCRIPT_NAME, "ok = good"),
        ]);

        let mut env = environment();
        assert_eq!(load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap(), ExecOutcome::Completed);
        assert!(env.globals().get::<bool>("ok").unwrap());
    }

    #[test]
    fn test_subdirectories_are_ignored() {
        let (_root, unit) = unit_with(&[(ENTRY_SCRIPT_NAME, "ran = true")]);
        fs::create_dir(unit.path.join("assets")).unwrap();

        let mut env = environment();
        assert_eq!(load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap(), ExecOutcome::Completed);
    }

    #[test]
    fn test_entry_failure_is_reported() {
        let (_root, unit) = unit_with(&[(ENTRY_SCRIPT_NAME, "error('boom')")]);

        let mut env = environment();
        let err = load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap_err();
        assert!(matches!(err, PluginError::Script { .. }));
        assert!(err.to_string().contains("boom"));
        assert_eq!(env.state(), EnvState::Done);
    }

    #[test]
    fn test_missing_entry_is_an_entry_failure() {
        let (_root, unit) = unit_with(&[("lib.lua", "x = 1")]);

        let mut env = environment();
        let err = load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap_err();
        assert!(matches!(err, PluginError::ReadScript { .. }));
    }

    #[test]
    fn test_library_terminate_skips_entry() {
        let (_root, unit) = unit_with(&[
            ("lib.lua", "terminate(5)"),
            (ENTRY_SCRIPT_NAME, "entry_ran = true"),
        ]);

        let mut env = environment();
        let outcome = load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap();
        assert_eq!(outcome, ExecOutcome::Terminated(5));
        assert!(env.globals().get::<mlua::Value>("entry_ran").unwrap().is_nil());
        assert_eq!(env.state(), EnvState::Done);
    }

    #[test]
    fn test_decode_error_visible_to_entry() {
        let (_root, unit) = unit_with(&[(
            ENTRY_SCRIPT_NAME,
            r#"t, err = decodeJSON("{\"a\":1,\"b\":[1,2]}")"#,
        )]);

        let mut env = environment();
        load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME).unwrap();
        assert!(env.globals().get::<mlua::Value>("t").unwrap().is_nil());
        assert_eq!(env.globals().get::<String>("err").unwrap(), "unsupported type");
    }

    #[test]
    fn test_unreadable_plugin_dir() {
        let root = TempDir::new().unwrap();
        let unit = PluginUnit {
            name: "gone".to_string(),
            path: root.path().join("gone"),
        };

        let mut env = environment();
        assert!(matches!(
            load_plugin(&mut env, &unit, ENTRY_SCRIPT_NAME),
            Err(PluginError::ReadDir { .. })
        ));
        assert_eq!(env.state(), EnvState::Done);
    }
}
