//! Preview derivation for indexed media.
//!
//! Previews live next to their source in a `thumbs` directory, named after
//! the source stem plus a short digest of its absolute path. A run never
//! redoes work: stored links that still resolve are skipped, and derived
//! files found on disk are linked without invoking the transcoder.

pub mod images;
pub mod video;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, ThumbnailConfig, ToolsConfig};
use crate::db::{Database, MediaFile, MediaKind};
use crate::report::ErrorLog;
use crate::scanner::hashing::path_digest;

pub const THUMBS_DIR: &str = "thumbs";

const STEM_CHARS: usize = 40;
const DIGEST_CHARS: usize = 8;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThumbnailResult {
    pub considered: usize,
    pub skipped: usize,
    pub linked: usize,
    pub generated: usize,
    pub errors: ErrorLog,
}

/// Where the preview for `source` is expected to be.
pub fn thumbnail_path(source: &Path, kind: MediaKind) -> PathBuf {
    let dir = source
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(THUMBS_DIR);
    let stem: String = source
        .file_stem()
        .map(|s| s.to_string_lossy().chars().take(STEM_CHARS).collect())
        .unwrap_or_default();
    let extension = match kind {
        MediaKind::Video => "gif",
        MediaKind::Image => images::output_extension(
            &source
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default(),
        ),
    };

    dir.join(format!(
        "{}_{}.{}",
        stem,
        path_digest(source, DIGEST_CHARS),
        extension
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Skip,
    Link(PathBuf),
    Derive(PathBuf),
}

fn plan(file: &MediaFile) -> Plan {
    if file.thumbnail_path.as_deref().is_some_and(Path::exists) {
        return Plan::Skip;
    }
    let expected = thumbnail_path(&file.path, file.kind);
    if expected.exists() {
        Plan::Link(expected)
    } else {
        Plan::Derive(expected)
    }
}

pub struct ThumbnailPipeline {
    config: ThumbnailConfig,
    tools: ToolsConfig,
}

impl ThumbnailPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.thumbnails.clone(),
            tools: config.tools.clone(),
        }
    }

    /// Ensure every active media file has a linked preview.
    pub fn run(&self, db: &Database) -> Result<ThumbnailResult> {
        let media = db.get_active_media()?;
        let mut result = ThumbnailResult {
            considered: media.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for file in &media {
            match plan(file) {
                Plan::Skip => result.skipped += 1,
                Plan::Link(existing) => {
                    debug!(path = %file.path.display(), thumb = %existing.display(), "Linking existing preview");
                    db.set_thumbnail(&file.path, &existing)?;
                    result.linked += 1;
                }
                Plan::Derive(target) => pending.push((file, target)),
            }
        }

        if !pending.is_empty() {
            self.derive_all(db, &pending, &mut result)?;
        }

        info!(
            considered = result.considered,
            skipped = result.skipped,
            linked = result.linked,
            generated = result.generated,
            errors = result.errors.count,
            "Thumbnails complete"
        );
        Ok(result)
    }

    /// Derive on the worker pool; links are stored on this thread as each
    /// derivation finishes.
    fn derive_all(
        &self,
        db: &Database,
        pending: &[(&MediaFile, PathBuf)],
        result: &mut ThumbnailResult,
    ) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()?;
        let (tx, rx) = mpsc::channel();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    pending.par_iter().for_each_with(tx, |tx, (file, target)| {
                        let outcome = self.derive(file, target);
                        let _ = tx.send((*file, target, outcome));
                    })
                })
            });

            for (file, target, outcome) in rx {
                let stored = outcome.and_then(|()| {
                    db.set_thumbnail(&file.path, target)
                        .context("Failed to store preview link")
                });
                match stored {
                    Ok(()) => result.generated += 1,
                    Err(e) => {
                        warn!(path = %file.path.display(), error = %format!("{:#}", e), "Preview failed");
                        result
                            .errors
                            .push(format!("{}: {:#}", file.path.display(), e));
                    }
                }
            }
        });

        Ok(())
    }

    fn derive(&self, file: &MediaFile, target: &Path) -> Result<()> {
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }

        let rendered = match file.kind {
            MediaKind::Video => video::render_preview(
                &file.path,
                target,
                file.duration_seconds,
                &self.config,
                &self.tools,
            )
            .map_err(anyhow::Error::from),
            MediaKind::Image => {
                images::resize(&file.path, target, self.config.max_image_dimension)
            }
        };

        if rendered.is_err() {
            let _ = std::fs::remove_file(target);
        }
        rendered
    }
}
