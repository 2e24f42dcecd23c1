//! Media ↔ match links.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::{parse_db_time, to_db_time, Database};

/// One media file linked to one owner's match.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub media_path: PathBuf,
    pub match_id: String,
    pub owner_id: String,
    pub match_start: DateTime<Utc>,
    pub map_name: Option<String>,
    pub confidence: f64,
}

impl Database {
    /// Insert unless the (media, match, owner) key already exists.
    /// Returns whether a row was written; existing rows are never modified.
    pub fn insert_association(&self, association: &Association) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO media_matches (
                media_path, match_id, owner_id, match_start, map_name, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                association.media_path.to_string_lossy(),
                association.match_id,
                association.owner_id,
                to_db_time(&association.match_start),
                association.map_name,
                association.confidence,
                to_db_time(&Utc::now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    #[cfg(test)]
    pub fn has_association_for_owner(&self, media_path: &Path, owner_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM media_matches WHERE media_path = ? AND owner_id = ?",
            rusqlite::params![media_path.to_string_lossy(), owner_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_associations(&self, media_path: &Path) -> Result<Vec<Association>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT media_path, match_id, owner_id, match_start, map_name, confidence
            FROM media_matches
            WHERE media_path = ?
            ORDER BY owner_id, match_id
            "#,
        )?;
        let rows = stmt
            .query_map([media_path.to_string_lossy()], row_to_association)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every association, in key order.
    #[cfg(test)]
    pub fn get_all_associations(&self) -> Result<Vec<Association>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT media_path, match_id, owner_id, match_start, map_name, confidence
            FROM media_matches
            ORDER BY media_path, owner_id, match_id
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_association)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_associations(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM media_matches", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_association(row: &rusqlite::Row) -> rusqlite::Result<Association> {
    let start: String = row.get(3)?;
    let match_start = parse_db_time(&start).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", start).into(),
        )
    })?;
    Ok(Association {
        media_path: PathBuf::from(row.get::<_, String>(0)?),
        match_id: row.get(1)?,
        owner_id: row.get(2)?,
        match_start,
        map_name: row.get(4)?,
        confidence: row.get(5)?,
    })
}
