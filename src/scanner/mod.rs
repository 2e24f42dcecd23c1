pub mod change_detection;
pub mod discovery;
pub mod hashing;
pub mod metadata;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Database, InventoryEntry, MediaStatus, ScannedMedia};
use crate::report::ErrorLog;

pub use change_detection::{Precheck, Verdict};
pub use discovery::{discover_media, Candidate, Discovery, ExtensionMap};
pub use metadata::CaptureWindow;

/// A metadata-only change to record without reprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct Touch {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// The inventory delta computed by one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Candidate files found on disk.
    pub scanned: usize,
    pub to_insert: Vec<ScannedMedia>,
    pub to_update: Vec<ScannedMedia>,
    pub to_touch: Vec<Touch>,
    pub to_delete: Vec<PathBuf>,
    pub errors: ErrorLog,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub scanned: usize,
    pub new: usize,
    pub updated: usize,
    pub touched: usize,
    pub deleted: usize,
    pub errors: ErrorLog,
}

enum Examined {
    Unchanged,
    Insert(ScannedMedia),
    Update(ScannedMedia),
    Touch(Touch),
    Failed(String),
}

pub struct Scanner {
    config: Config,
    extensions: ExtensionMap,
}

impl Scanner {
    pub fn new(config: Config) -> Self {
        let extensions = ExtensionMap::from_config(&config.scanner);
        Self { config, extensions }
    }

    /// Walk `roots` and compare what is on disk with the stored inventory.
    ///
    /// Nothing is written; see [`Scanner::apply`].
    pub fn scan(&self, db: &Database, roots: &[PathBuf], force: bool) -> Result<ScanOutcome> {
        let discovery = discover_media(roots, &self.extensions);
        let inventory = db.get_inventory()?;

        let mut outcome = ScanOutcome {
            scanned: discovery.candidates.len(),
            ..Default::default()
        };

        for failure in &discovery.failures {
            outcome
                .errors
                .push(format!("{}: {}", failure.path.display(), failure.message));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.scanner.workers.max(1))
            .build()?;

        let examined: Vec<(PathBuf, Examined)> = pool.install(|| {
            discovery
                .candidates
                .par_iter()
                .map(|c| (c.path.clone(), self.examine(c, inventory.get(&c.path), force)))
                .collect()
        });

        for (path, result) in examined {
            match result {
                Examined::Unchanged => {}
                Examined::Insert(media) => outcome.to_insert.push(media),
                Examined::Update(media) => outcome.to_update.push(media),
                Examined::Touch(touch) => outcome.to_touch.push(touch),
                Examined::Failed(message) => {
                    warn!(path = %path.display(), error = %message, "Scan error");
                    outcome.errors.push(format!("{}: {}", path.display(), message));
                }
            }
        }

        outcome.to_delete = removed_paths(&discovery, &inventory);

        Ok(outcome)
    }

    /// Write a scan's delta. Each file is its own committed unit, so an
    /// interrupted apply leaves a consistent store.
    pub fn apply(&self, db: &Database, outcome: ScanOutcome) -> Result<ScanResult> {
        let now = Utc::now();
        let mut result = ScanResult {
            scanned: outcome.scanned,
            errors: outcome.errors,
            ..Default::default()
        };

        for media in &outcome.to_insert {
            db.insert_media(media, &now)?;
            result.new += 1;
        }

        for media in &outcome.to_update {
            db.update_media(media, &now)?;
            result.updated += 1;
        }

        for touch in &outcome.to_touch {
            db.touch_media(&touch.path, &touch.modified_at, touch.size_bytes, &now)?;
            result.touched += 1;
        }

        for path in &outcome.to_delete {
            if db.mark_deleted(path, &now)? {
                result.deleted += 1;
            }
        }

        info!(
            scanned = result.scanned,
            new = result.new,
            updated = result.updated,
            touched = result.touched,
            deleted = result.deleted,
            errors = result.errors.count,
            "Scan applied"
        );

        Ok(result)
    }

    pub fn scan_and_apply(&self, db: &Database, roots: &[PathBuf], force: bool) -> Result<ScanResult> {
        let outcome = self.scan(db, roots, force)?;
        self.apply(db, outcome)
    }

    fn examine(&self, candidate: &Candidate, entry: Option<&InventoryEntry>, force: bool) -> Examined {
        match self.try_examine(candidate, entry, force) {
            Ok(examined) => examined,
            Err(e) => Examined::Failed(format!("{:#}", e)),
        }
    }

    fn try_examine(
        &self,
        candidate: &Candidate,
        entry: Option<&InventoryEntry>,
        force: bool,
    ) -> Result<Examined> {
        let file_metadata = std::fs::metadata(&candidate.path)?;
        let modified_at: DateTime<Utc> = file_metadata.modified()?.into();
        let size_bytes = file_metadata.len();

        let check = change_detection::precheck(entry, &modified_at, size_bytes, force);
        if check == Precheck::Unchanged {
            return Ok(Examined::Unchanged);
        }

        let content_hash = hashing::content_hash(&candidate.path)?;

        let Some(entry) = entry else {
            let media = self.describe(candidate, content_hash, modified_at, size_bytes);
            return Ok(Examined::Insert(media));
        };

        let examined = match change_detection::verdict(entry, &content_hash, &modified_at, size_bytes) {
            Verdict::Changed | Verdict::Resurrected => {
                debug!(path = %candidate.path.display(), "Content changed or reappeared");
                Examined::Update(self.describe(candidate, content_hash, modified_at, size_bytes))
            }
            Verdict::Touched => Examined::Touch(Touch {
                path: candidate.path.clone(),
                modified_at,
                size_bytes,
            }),
            Verdict::Unchanged => Examined::Unchanged,
        };
        Ok(examined)
    }

    fn describe(
        &self,
        candidate: &Candidate,
        content_hash: String,
        modified_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> ScannedMedia {
        let window = metadata::extract_capture_window(
            &candidate.path,
            candidate.kind,
            modified_at,
            &self.config.tools,
        );

        ScannedMedia {
            path: candidate.path.clone(),
            content_hash,
            name: display_name(&candidate.path),
            size_bytes,
            extension: candidate.extension.clone(),
            kind: candidate.kind,
            modified_at,
            capture_start: window.start,
            capture_end: window.end,
            duration_seconds: window.duration_seconds,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Active rows under a walked root that the walk did not see.
fn removed_paths(discovery: &Discovery, inventory: &HashMap<PathBuf, InventoryEntry>) -> Vec<PathBuf> {
    let seen: HashSet<&Path> = discovery.candidates.iter().map(|c| c.path.as_path()).collect();

    let mut removed: Vec<PathBuf> = inventory
        .iter()
        .filter(|(_, entry)| entry.status == MediaStatus::Active)
        .map(|(path, _)| path)
        .filter(|path| discovery.is_under_root(path))
        .filter(|path| !discovery.is_unvisited(path))
        .filter(|path| !seen.contains(path.as_path()))
        .cloned()
        .collect();
    removed.sort();
    removed
}
