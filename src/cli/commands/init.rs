//! Initialize a wpsync configuration.
//!
//! - **Project init (`wpsync init`)**: creates `.wpsync/config.json` in the
//!   current directory, next to the site's code. The configuration is meant
//!   to be committed; everything else in `.wpsync/` is ignored.
//! - **Global init (`wpsync init --global`)**: creates `~/.wpsync/config.json`,
//!   used when no project configuration is found.
//!
//! Both write a template with `local`, `staging` and `production`
//! environments to edit.

use crate::config::{global_state_dir, SyncConfig, CONFIG_FILE_NAME, STATE_DIR_NAME};
use crate::error::{Error, Result};
use crate::sync::ensure_gitignore;
use crate::sync::file::ensure_project_ignore_rules;
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    path: PathBuf,
    global: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ignore_rules_added: Vec<&'static str>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if a configuration exists and `force` is
/// not set, or an IO error if the files cannot be written.
pub fn execute(global: bool, force: bool, gitignore: bool, json: bool) -> Result<()> {
    let state_dir = if global {
        global_state_dir().ok_or_else(|| {
            Error::Config("Could not determine the home directory".to_string())
        })?
    } else {
        Path::new(".").join(STATE_DIR_NAME)
    };

    let config_path = state_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: config_path });
    }

    fs::create_dir_all(&state_dir)?;
    ensure_gitignore(&state_dir)?;
    SyncConfig::template().save(&config_path)?;

    let ignore_rules_added = if gitignore && !global {
        ensure_project_ignore_rules(Path::new(".gitignore"))?
    } else {
        Vec::new()
    };

    if json {
        let output = InitOutput {
            path: config_path,
            global,
            ignore_rules_added,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    println!(
        "{} {}",
        "Wrote".green(),
        config_path.display().to_string().bold()
    );
    for rule in &ignore_rules_added {
        println!("  Added {} to .gitignore", rule.cyan());
    }
    println!();
    println!("Next: edit the environments, then check them with 'wpsync env check'.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that change current directory
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn with_temp_cwd<F, R>(f: F) -> R
    where
        F: FnOnce(&Path) -> R,
    {
        let _lock = CWD_LOCK.lock().unwrap();
        let original_cwd = std::env::current_dir().unwrap();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let result = f(temp_dir.path());

        std::env::set_current_dir(original_cwd).unwrap();
        result
    }

    #[test]
    fn test_project_init_writes_template() {
        with_temp_cwd(|temp_path| {
            execute(false, false, false, true).unwrap();

            let state_dir = temp_path.join(STATE_DIR_NAME);
            let config = SyncConfig::load(&state_dir.join(CONFIG_FILE_NAME)).unwrap();
            assert_eq!(config, SyncConfig::template());

            let gitignore = fs::read_to_string(state_dir.join(".gitignore")).unwrap();
            assert!(gitignore.contains("!config.json"));
            assert!(!temp_path.join(".gitignore").exists());
        });
    }

    #[test]
    fn test_init_twice_needs_force() {
        with_temp_cwd(|temp_path| {
            execute(false, false, false, true).unwrap();

            let config_path = temp_path.join(STATE_DIR_NAME).join(CONFIG_FILE_NAME);
            fs::write(&config_path, "{}").unwrap();

            let result = execute(false, false, false, true);
            assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
            assert_eq!(fs::read_to_string(&config_path).unwrap(), "{}");

            execute(false, true, false, true).unwrap();
            assert!(SyncConfig::load(&config_path).is_ok());
        });
    }

    #[test]
    fn test_init_adds_project_ignore_rules() {
        with_temp_cwd(|temp_path| {
            fs::write(temp_path.join(".gitignore"), "node_modules/\n*.sql\n").unwrap();

            execute(false, false, true, true).unwrap();

            let content = fs::read_to_string(temp_path.join(".gitignore")).unwrap();
            assert!(content.starts_with("node_modules/\n*.sql\n"));
            assert_eq!(content.matches("*.sql").count(), 1);
            assert!(content.contains("wp-content/uploads/"));
        });
    }
}
