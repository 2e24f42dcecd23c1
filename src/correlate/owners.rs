//! Access to other players' match-history stores.
//!
//! Each owner keeps a private SQLite database populated by their own sync
//! pipeline. The correlator only reads them, through [`OwnerStoreProvider`],
//! so how stores are located can change without touching the join.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::OwnerStoreConfig;
use crate::db::{parse_db_time, Database};

/// One match as exposed by an owner's store.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub match_id: String,
    pub start: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub map_name: Option<String>,
}

/// Matches read from one store, plus how many rows could not be used.
#[derive(Debug, Clone, Default)]
pub struct OwnerMatches {
    pub records: Vec<MatchRecord>,
    pub malformed: usize,
}

pub trait OwnerStoreProvider {
    /// Owner identifiers in processing order. The invoking owner comes first.
    fn owners(&self) -> Vec<String>;

    /// Every match recorded for `owner_id`. An error means the store is
    /// unavailable for this run.
    fn load_matches(&self, owner_id: &str) -> Result<OwnerMatches>;
}

/// Owner stores configured explicitly as SQLite files, opened read-only.
pub struct SqliteOwnerStores {
    primary: String,
    stores: Vec<OwnerStoreConfig>,
}

impl SqliteOwnerStores {
    pub fn new(primary: impl Into<String>, stores: Vec<OwnerStoreConfig>) -> Self {
        Self {
            primary: primary.into(),
            stores,
        }
    }

    fn store_path(&self, owner_id: &str) -> Option<&Path> {
        self.stores
            .iter()
            .find(|s| s.id == owner_id)
            .map(|s| s.path.as_path())
    }
}

impl OwnerStoreProvider for SqliteOwnerStores {
    fn owners(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut owners = Vec::new();

        if self.store_path(&self.primary).is_some() {
            seen.insert(self.primary.clone());
            owners.push(self.primary.clone());
        }
        for store in &self.stores {
            if seen.insert(store.id.clone()) {
                owners.push(store.id.clone());
            }
        }
        owners
    }

    fn load_matches(&self, owner_id: &str) -> Result<OwnerMatches> {
        let path = self
            .store_path(owner_id)
            .with_context(|| format!("No store configured for owner {}", owner_id))?;
        let store = Database::open_read_only(path)?;
        read_match_history(store.conn())
            .with_context(|| format!("Failed to read matches from {}", path.display()))
    }
}

/// Longest plausible match. Anything above comes from a corrupt row.
pub const MAX_MATCH_DURATION_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Read `match_history(match_id, start_time, duration_seconds, map_name)`.
/// Rows with a missing id, an unparsable start or an implausible duration are
/// counted and skipped. Zero or negative durations count as absent.
pub fn read_match_history(conn: &Connection) -> Result<OwnerMatches> {
    let mut stmt = conn.prepare(
        "SELECT match_id, start_time, duration_seconds, map_name FROM match_history",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            text_or_number(row.get_ref(0)?),
            parse_start(row.get_ref(1)?),
            row.get::<_, Option<f64>>(2).ok().flatten(),
            row.get::<_, Option<String>>(3).ok().flatten(),
        ))
    })?;

    let mut matches = OwnerMatches::default();
    for row in rows {
        let (match_id, start, duration, map_name) = row?;
        let (Some(match_id), Some(start)) = (match_id, start) else {
            matches.malformed += 1;
            continue;
        };
        let duration = match duration {
            Some(d) if !d.is_finite() || d > MAX_MATCH_DURATION_SECS => {
                matches.malformed += 1;
                continue;
            }
            Some(d) if d > 0.0 => Some(Duration::milliseconds((d * 1000.0).round() as i64)),
            _ => None,
        };
        matches.records.push(MatchRecord {
            match_id,
            start,
            duration,
            map_name,
        });
    }

    if matches.malformed > 0 {
        debug!(malformed = matches.malformed, "Skipped malformed match rows");
    }
    Ok(matches)
}

fn text_or_number(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t).trim().to_string();
            (!s.is_empty()).then_some(s)
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn parse_start(value: ValueRef<'_>) -> Option<DateTime<Utc>> {
    match value {
        ValueRef::Text(t) => parse_db_time(String::from_utf8_lossy(t).trim()),
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0),
        ValueRef::Real(secs) => DateTime::from_timestamp_millis((secs * 1000.0) as i64),
        _ => None,
    }
}

/// Find owner stores laid out as `<dir>/<owner>/<name>.db`.
///
/// The owner id comes from the store's `store_meta` table (`key = 'owner_id'`)
/// when present, else from the subdirectory name. Used by the command line
/// front-ends only; the engine receives explicit configuration.
pub fn discover_owner_stores(dir: &Path) -> Result<Vec<OwnerStoreConfig>> {
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read owner directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    let mut seen = HashSet::new();
    let mut stores = Vec::new();

    for subdir in subdirs {
        let Some(db_path) = first_database(&subdir) else {
            continue;
        };

        let fallback = subdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let id = match read_owner_id(&db_path) {
            Ok(Some(id)) => id,
            Ok(None) => fallback,
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "Cannot read owner id, using directory name");
                fallback
            }
        };

        if seen.insert(id.clone()) {
            stores.push(OwnerStoreConfig { id, path: db_path });
        } else {
            warn!(owner = %id, path = %db_path.display(), "Duplicate owner id, ignoring store");
        }
    }

    Ok(stores)
}

fn first_database(dir: &Path) -> Option<PathBuf> {
    let mut dbs: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "db"))
        .collect();
    dbs.sort();
    dbs.into_iter().next()
}

fn read_owner_id(path: &Path) -> Result<Option<String>> {
    let store = Database::open_read_only(path)?;
    let conn = store.conn();
    let has_meta: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'store_meta'",
            [],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if !has_meta {
        return Ok(None);
    }

    let id: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'owner_id'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.filter(|s| !s.trim().is_empty()))
}
