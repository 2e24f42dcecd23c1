//! Media inventory rows and the upsert/soft-delete contract.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{parse_db_time, to_db_time, Database, SCHEMA_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Active,
    Deleted,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Active => "active",
            MediaStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MediaStatus::Active),
            "deleted" => Some(MediaStatus::Deleted),
            _ => None,
        }
    }
}

/// What a scan learned about one file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedMedia {
    pub path: PathBuf,
    pub content_hash: String,
    pub name: String,
    pub size_bytes: u64,
    pub extension: String,
    pub kind: MediaKind,
    pub modified_at: DateTime<Utc>,
    pub capture_start: Option<DateTime<Utc>>,
    pub capture_end: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
}

/// A stored inventory row.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub content_hash: String,
    pub name: String,
    pub size_bytes: u64,
    pub extension: String,
    pub kind: MediaKind,
    pub modified_at: DateTime<Utc>,
    pub capture_start: Option<DateTime<Utc>>,
    pub capture_end: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub thumbnail_path: Option<PathBuf>,
    pub status: MediaStatus,
    pub first_seen: DateTime<Utc>,
    pub last_scan: DateTime<Utc>,
    pub schema_version: i64,
}

/// The subset of a row the scanner needs for change detection.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub content_hash: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub status: MediaStatus,
}

const MEDIA_COLUMNS: &str = r#"
    path, content_hash, name, size_bytes, extension, kind,
    modified_at, capture_start, capture_end, duration_seconds,
    thumbnail_path, status, first_seen, last_scan, schema_version
"#;

fn time_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}

fn optional_time_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_db_time))
}

fn kind_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<MediaKind> {
    let raw: String = row.get(idx)?;
    MediaKind::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown media kind {:?}", raw).into(),
        )
    })
}

fn status_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<MediaStatus> {
    let raw: String = row.get(idx)?;
    MediaStatus::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown media status {:?}", raw).into(),
        )
    })
}

fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaFile> {
    Ok(MediaFile {
        path: PathBuf::from(row.get::<_, String>(0)?),
        content_hash: row.get(1)?,
        name: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)?.max(0) as u64,
        extension: row.get(4)?,
        kind: kind_column(row, 5)?,
        modified_at: time_column(row, 6)?,
        capture_start: optional_time_column(row, 7)?,
        capture_end: time_column(row, 8)?,
        duration_seconds: row.get(9)?,
        thumbnail_path: row.get::<_, Option<String>>(10)?.map(PathBuf::from),
        status: status_column(row, 11)?,
        first_seen: time_column(row, 12)?,
        last_scan: time_column(row, 13)?,
        schema_version: row.get(14)?,
    })
}

impl Database {
    /// Insert a path seen for the first time.
    pub fn insert_media(&self, media: &ScannedMedia, now: &DateTime<Utc>) -> Result<()> {
        let now = to_db_time(now);
        self.conn.execute(
            r#"
            INSERT INTO media_files (
                path, content_hash, name, size_bytes, extension, kind,
                modified_at, capture_start, capture_end, duration_seconds,
                status, first_seen, last_scan, schema_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?)
            "#,
            rusqlite::params![
                media.path.to_string_lossy(),
                media.content_hash,
                media.name,
                media.size_bytes as i64,
                media.extension,
                media.kind.as_str(),
                to_db_time(&media.modified_at),
                media.capture_start.as_ref().map(to_db_time),
                to_db_time(&media.capture_end),
                media.duration_seconds,
                now,
                now,
                SCHEMA_VERSION,
            ],
        )?;
        Ok(())
    }

    /// Rewrite the mutable fields of a known path and mark it active.
    /// `first_seen` and any thumbnail link are left alone.
    pub fn update_media(&self, media: &ScannedMedia, now: &DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE media_files SET
                content_hash = ?, name = ?, size_bytes = ?, extension = ?, kind = ?,
                modified_at = ?, capture_start = ?, capture_end = ?, duration_seconds = ?,
                status = 'active', last_scan = ?, schema_version = ?
            WHERE path = ?
            "#,
            rusqlite::params![
                media.content_hash,
                media.name,
                media.size_bytes as i64,
                media.extension,
                media.kind.as_str(),
                to_db_time(&media.modified_at),
                media.capture_start.as_ref().map(to_db_time),
                to_db_time(&media.capture_end),
                media.duration_seconds,
                to_db_time(now),
                SCHEMA_VERSION,
                media.path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    /// Record a metadata-only touch: new mtime and size, same content.
    pub fn touch_media(
        &self,
        path: &Path,
        modified_at: &DateTime<Utc>,
        size_bytes: u64,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE media_files SET modified_at = ?, size_bytes = ?, last_scan = ? WHERE path = ?",
            rusqlite::params![
                to_db_time(modified_at),
                size_bytes as i64,
                to_db_time(now),
                path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    /// Soft delete. The row and its associations stay.
    pub fn mark_deleted(&self, path: &Path, now: &DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE media_files SET status = 'deleted', last_scan = ? WHERE path = ? AND status = 'active'",
            rusqlite::params![to_db_time(now), path.to_string_lossy()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_thumbnail(&self, path: &Path, thumbnail: &Path) -> Result<()> {
        self.conn.execute(
            "UPDATE media_files SET thumbnail_path = ? WHERE path = ?",
            rusqlite::params![thumbnail.to_string_lossy(), path.to_string_lossy()],
        )?;
        Ok(())
    }

    pub fn get_media(&self, path: &Path) -> Result<Option<MediaFile>> {
        let media = self
            .conn
            .query_row(
                &format!("SELECT {} FROM media_files WHERE path = ?", MEDIA_COLUMNS),
                [path.to_string_lossy()],
                row_to_media,
            )
            .optional()?;
        Ok(media)
    }

    /// All active rows, ordered by path.
    pub fn get_active_media(&self) -> Result<Vec<MediaFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM media_files WHERE status = 'active' ORDER BY path",
            MEDIA_COLUMNS
        ))?;
        let media = stmt
            .query_map([], row_to_media)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(media)
    }

    /// Stored hash, mtime, size and status for every known path.
    pub fn get_inventory(&self) -> Result<HashMap<PathBuf, InventoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, content_hash, modified_at, size_bytes, status FROM media_files",
        )?;
        let inventory = stmt
            .query_map([], |row| {
                let modified_at: Option<String> = row.get(2)?;
                Ok((
                    PathBuf::from(row.get::<_, String>(0)?),
                    InventoryEntry {
                        content_hash: row.get(1)?,
                        modified_at: modified_at.as_deref().and_then(parse_db_time),
                        size_bytes: row.get::<_, i64>(3)?.max(0) as u64,
                        status: status_column(row, 4)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(inventory)
    }

    pub fn count_media(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))?;
        Ok(count)
    }
}
