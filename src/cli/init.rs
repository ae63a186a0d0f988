//! Initialize docwatch for a repository.

use std::path::Path;

use tracing::info;

use crate::cli::{gitignore, Workspace};
use crate::config::{Config, STATE_DIR};
use crate::error::Error;

/// Run the init command.
pub fn run(repo: &Path) -> Result<(), Error> {
    let config_path = Config::path(repo);
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        Config::default().save(repo)?;
        info!(path = %config_path.display(), "Created config");
        println!("Created {}", config_path.display());
    }

    // Opening the workspace creates the store schema.
    let ws = Workspace::open(repo)?;
    info!(path = %ws.config.store_path(&ws.root).display(), "Store ready");

    if gitignore::ensure_ignored(&ws.root)? {
        println!("Added {}/ state files to .gitignore", STATE_DIR);
    }

    println!("docwatch initialized. Run 'docwatch run' to document changed files.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_is_repeatable() {
        let temp = TempDir::new().unwrap();
        run(temp.path()).unwrap();
        run(temp.path()).unwrap();

        assert!(Config::path(temp.path()).exists());
        assert!(temp.path().join(".docwatch/state.db").exists());
        let ignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
        assert_eq!(ignore.matches("docwatch state").count(), 2);
    }
}
