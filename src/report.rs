//! Pass reporting: error collection and summary counts.

use serde::Serialize;
use std::fmt;

/// Number of error messages kept verbatim; the rest are only counted.
pub const MAX_ERROR_SAMPLES: usize = 20;

/// Per-file and per-owner errors collected during a pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorLog {
    pub count: usize,
    pub samples: Vec<String>,
}

impl ErrorLog {
    pub fn push(&mut self, message: impl Into<String>) {
        self.count += 1;
        if self.samples.len() < MAX_ERROR_SAMPLES {
            self.samples.push(message.into());
        }
    }

    pub fn extend(&mut self, other: ErrorLog) {
        self.count += other.count;
        for sample in other.samples {
            if self.samples.len() >= MAX_ERROR_SAMPLES {
                break;
            }
            self.samples.push(sample);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Counts reported after every scan → correlate → derive pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub scanned: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub associated: usize,
    pub generated: usize,
    pub linked: usize,
    pub fallback_durations: usize,
    pub errors: ErrorLog,
}

impl PassSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} new={} updated={} deleted={} associated={} generated={} errors={}",
            self.scanned,
            self.new,
            self.updated,
            self.deleted,
            self.associated,
            self.generated,
            self.errors.count
        )
    }
}
