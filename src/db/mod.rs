mod schema;
pub mod associations;
pub mod media;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::info;

use crate::report::PassSummary;

pub use associations::Association;
pub use media::{InventoryEntry, MediaFile, MediaKind, MediaStatus, ScannedMedia};
pub use schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION};

/// Format an instant the way every timestamp column stores it.
pub fn to_db_time(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's
/// `YYYY-MM-DD HH:MM:SS` form (assumed UTC).
pub fn parse_db_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// Rows removed by [`Database::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetCounts {
    pub media: usize,
    pub associations: usize,
}

/// The local media inventory and its associations.
///
/// Exactly one process writes a given store; other owners' stores are only
/// ever read through [`crate::correlate::owners`].
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open media store {}", path.display()))?;
        Ok(Self { conn })
    }

    /// Open an existing store without write access. Never creates the file.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open {} read-only", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create missing tables, then add any columns older stores lack.
    pub fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to apply media store schema")?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        for (table, column, definition) in MIGRATIONS {
            let columns = self.table_columns(table)?;
            if columns.iter().any(|c| c == column) {
                continue;
            }
            self.conn
                .execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table, column, definition
                ))
                .with_context(|| format!("Failed to add column {}.{}", table, column))?;
            info!(table, column, "Migrated media store");
        }
        Ok(())
    }

    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Clear every inventory and association row while keeping the schema.
    ///
    /// A maintenance action; scans never call this.
    pub fn reset(&self) -> Result<ResetCounts> {
        let tx = self.conn.unchecked_transaction()?;
        let associations = tx.execute("DELETE FROM media_matches", [])?;
        let media = tx.execute("DELETE FROM media_files", [])?;
        tx.commit()?;

        info!(media, associations, "Media store reset");
        Ok(ResetCounts {
            media,
            associations,
        })
    }

    pub fn record_pass(
        &self,
        started_at: &DateTime<Utc>,
        completed_at: &DateTime<Utc>,
        summary: &PassSummary,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO passes (
                started_at, completed_at,
                scanned, new, updated, deleted, associated, generated,
                fallback_durations, errors
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                to_db_time(started_at),
                to_db_time(completed_at),
                summary.scanned as i64,
                summary.new as i64,
                summary.updated as i64,
                summary.deleted as i64,
                summary.associated as i64,
                summary.generated as i64,
                summary.fallback_durations as i64,
                summary.errors.count as i64,
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn count_passes(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM passes", [], |row| row.get(0))?;
        Ok(count)
    }
}
