//! Helpers shared by the `haloreel` and `haloreel-daemon` front-ends.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::config::{Config, OwnerStoreConfig};
use crate::correlate::{discover_owner_stores, SqliteOwnerStores};
use crate::db::Database;
use crate::report::PassSummary;

/// Clean run.
pub const EXIT_OK: i32 = 0;
/// The pass finished but some files or owner stores failed.
pub const EXIT_FILE_ERRORS: i32 = 1;
/// Configuration or primary store failure.
pub const EXIT_FATAL: i32 = 2;

/// The value following the flag at `args[i]`.
pub fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} requires an argument", flag))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Open the primary store and bring its schema up to date.
pub fn open_store(config: &Config) -> Result<Database> {
    let db = Database::open(&config.db_path)?;
    db.initialize()?;
    info!(path = %config.db_path.display(), "Media store ready");
    Ok(db)
}

/// Owner stores from the config file, plus any found under
/// `owners.discover_dir`. Explicit entries win on an id clash.
pub fn owner_stores(config: &Config) -> SqliteOwnerStores {
    let mut stores = config.owners.stores.clone();

    if let Some(dir) = &config.owners.discover_dir {
        match discover_owner_stores(dir) {
            Ok(found) => merge_discovered(&mut stores, found),
            Err(e) => warn!(dir = %dir.display(), error = %format!("{:#}", e), "Owner discovery failed"),
        }
    }

    info!(owners = stores.len(), "Owner stores configured");
    SqliteOwnerStores::new(config.owner_id.clone(), stores)
}

fn merge_discovered(stores: &mut Vec<OwnerStoreConfig>, found: Vec<OwnerStoreConfig>) {
    for store in found {
        if !stores.iter().any(|s| s.id == store.id) {
            stores.push(store);
        }
    }
}

pub fn exit_code(summary: &PassSummary) -> i32 {
    if summary.has_errors() {
        EXIT_FILE_ERRORS
    } else {
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::owners::tests::write_store;
    use crate::correlate::OwnerStoreProvider;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_flag_value() {
        let args: Vec<String> = ["haloreel-daemon", "--interval", "30", "--config"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_value(&args, 1, "--interval").unwrap(), "30");
        let err = flag_value(&args, 3, "--config").unwrap_err();
        assert_eq!(err.to_string(), "--config requires an argument");
    }

    #[test]
    fn test_explicit_stores_win_over_discovered() {
        let dir = tempdir().unwrap();
        write_store(&dir.path().join("me/history.db"), &[]);
        write_store(&dir.path().join("friend/history.db"), &[]);

        let mut config = Config::default();
        config.owner_id = "me".to_string();
        config.owners.stores = vec![OwnerStoreConfig {
            id: "friend".to_string(),
            path: PathBuf::from("/elsewhere/friend.db"),
        }];
        config.owners.discover_dir = Some(dir.path().to_path_buf());

        let stores = owner_stores(&config);
        assert_eq!(stores.owners(), vec!["me".to_string(), "friend".to_string()]);
    }

    #[test]
    fn test_missing_discover_dir_is_not_fatal() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.owners.discover_dir = Some(dir.path().join("absent"));

        assert!(owner_stores(&config).owners().is_empty());
    }

    #[test]
    fn test_exit_code() {
        let mut summary = PassSummary::default();
        assert_eq!(exit_code(&summary), EXIT_OK);
        summary.errors.push("clip.mp4: ffmpeg timed out");
        assert_eq!(exit_code(&summary), EXIT_FILE_ERRORS);
    }

    #[test]
    fn test_open_store_creates_schema() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.db_path = dir.path().join("nested/media.db");

        let db = open_store(&config).unwrap();
        assert_eq!(db.count_media().unwrap(), 0);
        assert!(config.db_path.exists());
    }
}
