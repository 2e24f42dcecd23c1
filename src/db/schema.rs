/// Version stamped onto every media row written by this build.
pub const SCHEMA_VERSION: i64 = 2;

pub const SCHEMA: &str = r#"
-- Indexed captures: one row per canonical path, soft-deleted when gone
CREATE TABLE IF NOT EXISTS media_files (
    path TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    extension TEXT NOT NULL,
    kind TEXT NOT NULL,              -- 'image' or 'video'
    modified_at TEXT NOT NULL,       -- change-detection key
    capture_start TEXT,
    capture_end TEXT NOT NULL,       -- reference instant for correlation
    duration_seconds REAL,           -- videos only, when probed
    thumbnail_path TEXT,
    status TEXT NOT NULL DEFAULT 'active',  -- 'active' or 'deleted'
    first_seen TEXT NOT NULL,
    last_scan TEXT NOT NULL,
    schema_version INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_media_files_status ON media_files(status);

-- Media to match links, one per (media, match, owner); never updated
CREATE TABLE IF NOT EXISTS media_matches (
    media_path TEXT NOT NULL,
    match_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    match_start TEXT NOT NULL,
    map_name TEXT,
    confidence REAL NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (media_path, match_id, owner_id)
);

CREATE INDEX IF NOT EXISTS idx_media_matches_owner ON media_matches(owner_id);

-- Pass history
CREATE TABLE IF NOT EXISTS passes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    scanned INTEGER NOT NULL DEFAULT 0,
    new INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    associated INTEGER NOT NULL DEFAULT 0,
    generated INTEGER NOT NULL DEFAULT 0,
    fallback_durations INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0
);
"#;

/// Columns added after the first release, as (table, column, definition).
/// Applied only when missing; existing columns are never dropped or renamed.
pub const MIGRATIONS: &[(&str, &str, &str)] = &[
    ("media_files", "capture_start", "TEXT"),
    ("media_files", "duration_seconds", "REAL"),
    ("media_files", "thumbnail_path", "TEXT"),
    ("media_files", "schema_version", "INTEGER NOT NULL DEFAULT 1"),
    ("media_matches", "map_name", "TEXT"),
    ("passes", "fallback_durations", "INTEGER NOT NULL DEFAULT 0"),
];
