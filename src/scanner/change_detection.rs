//! Change detection against the persisted inventory.
//!
//! Hashing is the expensive step, so it is skipped whenever the stored mtime
//! and size still match the file on disk. When either differs, the hash
//! decides whether the content really changed.

use chrono::{DateTime, Utc};

use crate::db::{InventoryEntry, MediaStatus};

/// Decision made from filesystem metadata alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// Path not in the inventory.
    New,
    /// Stored mtime and size match; nothing to do.
    Unchanged,
    /// Hash needed to decide.
    Rehash,
}

/// Decision for a known path once its hash is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Content differs from the stored hash.
    Changed,
    /// Soft-deleted row whose file reappeared.
    Resurrected,
    /// Same content, only mtime or size moved.
    Touched,
    /// Same content and metadata (forced rehash).
    Unchanged,
}

pub fn precheck(
    entry: Option<&InventoryEntry>,
    modified_at: &DateTime<Utc>,
    size_bytes: u64,
    force: bool,
) -> Precheck {
    let Some(entry) = entry else {
        return Precheck::New;
    };

    if force || entry.status == MediaStatus::Deleted {
        return Precheck::Rehash;
    }

    if entry.modified_at.as_ref() == Some(modified_at) && entry.size_bytes == size_bytes {
        Precheck::Unchanged
    } else {
        Precheck::Rehash
    }
}

pub fn verdict(
    entry: &InventoryEntry,
    content_hash: &str,
    modified_at: &DateTime<Utc>,
    size_bytes: u64,
) -> Verdict {
    if entry.content_hash != content_hash {
        return Verdict::Changed;
    }
    if entry.status == MediaStatus::Deleted {
        return Verdict::Resurrected;
    }
    if entry.modified_at.as_ref() != Some(modified_at) || entry.size_bytes != size_bytes {
        Verdict::Touched
    } else {
        Verdict::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(status: MediaStatus, modified_at: DateTime<Utc>) -> InventoryEntry {
        InventoryEntry {
            content_hash: "h1".to_string(),
            modified_at: Some(modified_at),
            size_bytes: 100,
            status,
        }
    }

    #[test]
    fn test_precheck_cheap_path() {
        let now = Utc::now();
        let known = entry(MediaStatus::Active, now);

        assert_eq!(precheck(None, &now, 100, false), Precheck::New);
        assert_eq!(precheck(Some(&known), &now, 100, false), Precheck::Unchanged);
        assert_eq!(precheck(Some(&known), &now, 100, true), Precheck::Rehash);
        assert_eq!(precheck(Some(&known), &now, 101, false), Precheck::Rehash);
        assert_eq!(
            precheck(Some(&known), &(now + Duration::seconds(1)), 100, false),
            Precheck::Rehash
        );
    }

    #[test]
    fn test_precheck_deleted_always_rehashes() {
        let now = Utc::now();
        let gone = entry(MediaStatus::Deleted, now);
        assert_eq!(precheck(Some(&gone), &now, 100, false), Precheck::Rehash);
    }

    #[test]
    fn test_precheck_missing_stored_mtime() {
        let now = Utc::now();
        let mut known = entry(MediaStatus::Active, now);
        known.modified_at = None;
        assert_eq!(precheck(Some(&known), &now, 100, false), Precheck::Rehash);
    }

    #[test]
    fn test_verdicts() {
        let now = Utc::now();
        let later = now + Duration::seconds(5);
        let active = entry(MediaStatus::Active, now);
        let gone = entry(MediaStatus::Deleted, now);

        assert_eq!(verdict(&active, "h2", &now, 100), Verdict::Changed);
        assert_eq!(verdict(&gone, "h2", &now, 100), Verdict::Changed);
        assert_eq!(verdict(&gone, "h1", &later, 100), Verdict::Resurrected);
        assert_eq!(verdict(&active, "h1", &later, 100), Verdict::Touched);
        assert_eq!(verdict(&active, "h1", &now, 100), Verdict::Unchanged);
    }
}
