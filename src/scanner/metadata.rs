//! Capture-time extraction.
//!
//! The modification time is the one signal every file has, so it is the
//! fallback for everything: a video's capture window ends at its mtime and
//! starts `duration` earlier when the probe succeeds; an image is placed at
//! its EXIF original time when one can be read.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::config::ToolsConfig;
use crate::db::MediaKind;
use crate::tools;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
}

pub fn extract_capture_window(
    path: &Path,
    kind: MediaKind,
    modified_at: DateTime<Utc>,
    tools: &ToolsConfig,
) -> CaptureWindow {
    match kind {
        MediaKind::Video => {
            let duration = match tools::probe_duration(tools, path) {
                Ok(d) => Some(d),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Duration probe failed");
                    None
                }
            };
            video_capture_window(modified_at, duration)
        }
        MediaKind::Image => image_capture_window(modified_at, read_exif_capture_time(path)),
    }
}

/// Longest recording taken at face value. Longer probe results are treated
/// as missing.
const MAX_VIDEO_SECS: f64 = 24.0 * 60.0 * 60.0;

pub fn video_capture_window(modified_at: DateTime<Utc>, duration: Option<f64>) -> CaptureWindow {
    let window = duration
        .filter(|d| *d > 0.0 && *d <= MAX_VIDEO_SECS)
        .and_then(|seconds| {
            let length = chrono::Duration::milliseconds((seconds * 1000.0).round() as i64);
            let start = modified_at.checked_sub_signed(length)?;
            Some(CaptureWindow {
                start: Some(start),
                end: modified_at,
                duration_seconds: Some(seconds),
            })
        });

    window.unwrap_or(CaptureWindow {
        start: Some(modified_at),
        end: modified_at,
        duration_seconds: None,
    })
}

pub fn image_capture_window(
    modified_at: DateTime<Utc>,
    exif_time: Option<DateTime<Utc>>,
) -> CaptureWindow {
    let instant = exif_time.unwrap_or(modified_at);
    CaptureWindow {
        start: Some(instant),
        end: instant,
        duration_seconds: None,
    }
}

/// Read `DateTimeOriginal` (plus `OffsetTimeOriginal` when present).
pub fn read_exif_capture_time(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    let datetime = exif
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .and_then(|f| ascii_value(&f.value))?;
    let offset = exif
        .get_field(exif::Tag::OffsetTimeOriginal, exif::In::PRIMARY)
        .and_then(|f| ascii_value(&f.value));

    let parsed = parse_exif_datetime(&datetime, offset.as_deref());
    if parsed.is_none() {
        debug!(path = %path.display(), value = %datetime, "Unparsable EXIF timestamp");
    }
    parsed
}

fn ascii_value(value: &exif::Value) -> Option<String> {
    match value {
        exif::Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_matches(char::from(0)).trim().to_string()),
        _ => None,
    }
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value. Without an offset the camera's
/// local time is assumed to be this machine's local time.
pub fn parse_exif_datetime(value: &str, offset: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())?;

    if let Some(offset) = offset.and_then(parse_offset) {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc));
    }

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * seconds)
}
