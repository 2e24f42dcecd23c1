//! Triggers for the watch daemon: a poll timer plus filesystem notifications.
//!
//! Passes are idempotent, so a trigger only says "run again soon". The
//! debouncer holds events until a path has been quiet for [`SETTLE`], so a
//! recording still being written does not start a pass half way through.

use anyhow::Result;
use chrono::NaiveTime;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    new_debouncer_opt, DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::scanner::ExtensionMap;
use crate::thumbnails::THUMBS_DIR;

/// Quiet period a path needs before its events are delivered.
pub const SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The poll interval elapsed.
    Timer,
    /// New media files appeared.
    Files(usize),
    /// The notification backend stopped; only the timer remains.
    Disconnected,
}

pub struct MediaWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    rx: Receiver<DebounceEventResult>,
    extensions: ExtensionMap,
}

impl MediaWatcher {
    /// Watch every root recursively. Roots that cannot be watched are logged
    /// and left to the poll timer.
    pub fn start(roots: &[PathBuf], extensions: ExtensionMap) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut debouncer: Debouncer<RecommendedWatcher, FileIdMap> = new_debouncer_opt(
            SETTLE,
            None,
            move |result: DebounceEventResult| {
                let _ = tx.send(result);
            },
            FileIdMap::new(),
            notify::Config::default(),
        )?;

        for root in roots {
            match debouncer.watch(root, RecursiveMode::Recursive) {
                Ok(()) => info!(path = %root.display(), "Watching for new captures"),
                Err(e) => warn!(path = %root.display(), error = %e, "Cannot watch root"),
            }
        }

        Ok(Self {
            _debouncer: debouncer,
            rx,
            extensions,
        })
    }

    /// Block until new media shows up or `interval` elapses.
    pub fn wait(&self, interval: Duration) -> Trigger {
        let deadline = Instant::now() + interval;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(Ok(events)) => {
                    let mut created = self.count(&events);
                    // Batches already queued belong to the same trigger.
                    while let Ok(Ok(more)) = self.rx.try_recv() {
                        created += self.count(&more);
                    }
                    if created > 0 {
                        return Trigger::Files(created);
                    }
                }
                Ok(Err(errors)) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Trigger::Timer,
                Err(RecvTimeoutError::Disconnected) => return Trigger::Disconnected,
            }
        }
    }

    fn count(&self, events: &[DebouncedEvent]) -> usize {
        events
            .iter()
            .map(|e| {
                let found = new_media_count(&e.event, &self.extensions);
                if found > 0 {
                    debug!(paths = ?e.event.paths, "Media created");
                }
                found
            })
            .sum()
    }
}

/// Number of media files an event reports as created or moved into place.
/// Anything under a `thumbs` directory is our own output and ignored.
pub fn new_media_count(event: &Event, extensions: &ExtensionMap) -> usize {
    let paths = match event.kind {
        // Old and new path; only the destination is new media.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            &event.paths[event.paths.len().saturating_sub(1)..]
        }
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) => &event.paths[..],
        _ => return 0,
    };

    paths
        .iter()
        .filter(|p| !in_thumbs_dir(p) && extensions.classify(p).is_some())
        .count()
}

fn in_thumbs_dir(path: &Path) -> bool {
    path.parent()
        .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == THUMBS_DIR))
}

/// Whether `now` falls within the configured hours of operation.
/// Without both bounds passes may run at any time.
pub fn should_process_now(watch: &WatchConfig, now: NaiveTime) -> bool {
    let (start, end) = match (watch.hours_start, watch.hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return true,
    };

    let start_time = NaiveTime::from_hms_opt(start as u32, 0, 0).unwrap_or(NaiveTime::MIN);
    let end_time = NaiveTime::from_hms_opt(end as u32, 0, 0).unwrap_or(NaiveTime::MIN);

    if start <= end {
        now >= start_time && now < end_time
    } else {
        // Overnight range: 22:00 - 06:00
        now >= start_time || now < end_time
    }
}
