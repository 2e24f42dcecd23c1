//! One indexing pass: scan, then correlate, then derive previews.

use anyhow::{bail, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::correlate::{CorrelationSettings, MatchCorrelator, OwnerStoreProvider};
use crate::db::{Database, ResetCounts};
use crate::report::PassSummary;
use crate::scanner::Scanner;
use crate::thumbnails::ThumbnailPipeline;

#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Roots to scan instead of the configured ones.
    pub roots: Vec<PathBuf>,
    /// Rehash every file regardless of mtime and size.
    pub force: bool,
}

impl PassOptions {
    fn roots_for(&self, config: &Config) -> Vec<PathBuf> {
        if self.roots.is_empty() {
            config.roots.clone()
        } else {
            self.roots.clone()
        }
    }
}

/// Run Scan → Correlate → Derive once and record the pass.
///
/// Per-file and per-owner problems end up in the summary's error log; only a
/// failing primary store aborts the pass.
pub fn run_pass<P: OwnerStoreProvider>(
    config: &Config,
    db: &Database,
    owners: &P,
    options: &PassOptions,
) -> Result<PassSummary> {
    let roots = options.roots_for(config);
    if roots.is_empty() {
        bail!("No media roots configured; pass --dir or set `roots` in the config file");
    }

    let started_at = Utc::now();
    info!(roots = roots.len(), force = options.force, "Starting pass");

    let scanner = Scanner::new(config.clone());
    let scan = scanner.scan_and_apply(db, &roots, options.force)?;

    let correlation =
        MatchCorrelator::new(db, owners, CorrelationSettings::from_config(config)).correlate()?;

    let thumbnails = ThumbnailPipeline::new(config).run(db)?;

    let mut summary = PassSummary {
        scanned: scan.scanned,
        new: scan.new,
        updated: scan.updated,
        deleted: scan.deleted,
        associated: correlation.associated,
        generated: thumbnails.generated,
        linked: thumbnails.linked,
        fallback_durations: correlation.fallback_durations,
        ..Default::default()
    };
    summary.errors.extend(scan.errors);
    summary.errors.extend(correlation.errors);
    summary.errors.extend(thumbnails.errors);

    db.record_pass(&started_at, &Utc::now(), &summary)?;
    info!(
        %summary,
        media_rows = db.count_media()?,
        associations = db.count_associations()?,
        "Pass complete"
    );

    Ok(summary)
}

/// Drop every inventory and association row. The next pass rebuilds them.
pub fn reset(db: &Database) -> Result<ResetCounts> {
    db.reset()
}
