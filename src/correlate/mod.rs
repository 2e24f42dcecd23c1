//! Temporal join between indexed media and every owner's match history.
//!
//! Each owner is correlated independently. Per pass, a media file is linked to
//! at most one match per owner: the one whose window contains the file's
//! capture end and whose start is nearest to it. Associations are never
//! removed, so a file whose capture end later moves (new content, a nearer
//! match appearing) may end up linked to several matches of the same owner.

pub mod owners;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Association, Database, MediaFile};
use crate::report::ErrorLog;

pub use owners::{
    discover_owner_stores, MatchRecord, OwnerMatches, OwnerStoreProvider, SqliteOwnerStores,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationSettings {
    pub tolerance: Duration,
    /// Match length assumed when a record carries none.
    pub default_duration: Duration,
}

impl CorrelationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tolerance: config.tolerance(),
            default_duration: config.default_match_duration(),
        }
    }
}

/// The match chosen for one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchChoice<'a> {
    pub record: &'a MatchRecord,
    pub distance: Duration,
    pub confidence: f64,
    pub used_default_duration: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrelationResult {
    pub media_considered: usize,
    pub owners_processed: usize,
    pub owners_skipped: usize,
    pub associated: usize,
    pub already_associated: usize,
    /// New associations whose match had no stored duration.
    pub fallback_durations: usize,
    pub errors: ErrorLog,
}

/// Pick the match for `reference` among `matches`.
///
/// A match qualifies when `start - tol <= reference <= start + duration + tol`.
/// The nearest start wins; equal distances fall back to the smaller match id.
/// Records whose window overflows the representable time range are ignored.
pub fn best_match<'a>(
    reference: DateTime<Utc>,
    matches: &'a [MatchRecord],
    settings: &CorrelationSettings,
) -> Option<MatchChoice<'a>> {
    matches
        .iter()
        .filter_map(|record| {
            let duration = record.duration.unwrap_or(settings.default_duration);
            // A window chrono cannot represent never qualifies.
            let earliest = record.start.checked_sub_signed(settings.tolerance)?;
            let latest = record
                .start
                .checked_add_signed(duration)?
                .checked_add_signed(settings.tolerance)?;
            if reference < earliest || reference > latest {
                return None;
            }

            let distance = (reference - record.start).abs();
            Some(MatchChoice {
                record,
                distance,
                confidence: confidence(distance, duration, settings.tolerance),
                used_default_duration: record.duration.is_none(),
            })
        })
        .min_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.record.match_id.cmp(&b.record.match_id))
        })
}

/// `1 - distance / (duration + 2 * tolerance)`, clamped to `[0, 1]`.
pub fn confidence(distance: Duration, duration: Duration, tolerance: Duration) -> f64 {
    let span = duration.num_milliseconds() as f64 + 2.0 * tolerance.num_milliseconds() as f64;
    if span <= 0.0 {
        return if distance.is_zero() { 1.0 } else { 0.0 };
    }
    (1.0 - distance.num_milliseconds() as f64 / span).clamp(0.0, 1.0)
}

pub struct MatchCorrelator<'a, P: OwnerStoreProvider> {
    db: &'a Database,
    provider: &'a P,
    settings: CorrelationSettings,
}

impl<'a, P: OwnerStoreProvider> MatchCorrelator<'a, P> {
    pub fn new(db: &'a Database, provider: &'a P, settings: CorrelationSettings) -> Self {
        Self {
            db,
            provider,
            settings,
        }
    }

    /// Correlate every active media file against every owner.
    pub fn correlate(&self) -> Result<CorrelationResult> {
        let media = self.db.get_active_media()?;
        let mut result = CorrelationResult {
            media_considered: media.len(),
            ..Default::default()
        };

        for owner in self.provider.owners() {
            let matches = match self.provider.load_matches(&owner) {
                Ok(m) => m,
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Skipping unavailable owner store");
                    result.owners_skipped += 1;
                    result.errors.push(format!("owner {}: {:#}", owner, e));
                    continue;
                }
            };
            result.owners_processed += 1;

            if matches.malformed > 0 {
                warn!(owner = %owner, malformed = matches.malformed, "Ignored malformed match rows");
            }

            self.correlate_owner(&owner, &media, &matches.records, &mut result);
        }

        info!(
            media = result.media_considered,
            owners = result.owners_processed,
            skipped = result.owners_skipped,
            associated = result.associated,
            fallback_durations = result.fallback_durations,
            "Correlation complete"
        );
        Ok(result)
    }

    fn correlate_owner(
        &self,
        owner: &str,
        media: &[MediaFile],
        matches: &[MatchRecord],
        result: &mut CorrelationResult,
    ) {
        if matches.is_empty() {
            debug!(owner = %owner, "Owner has no matches");
            return;
        }

        let settings = &self.settings;
        let choices: Vec<(&MediaFile, MatchChoice<'_>)> = media
            .par_iter()
            .filter_map(|file| best_match(file.capture_end, matches, settings).map(|c| (file, c)))
            .collect();

        for (file, choice) in choices {
            let association = Association {
                media_path: file.path.clone(),
                match_id: choice.record.match_id.clone(),
                owner_id: owner.to_string(),
                match_start: choice.record.start,
                map_name: choice.record.map_name.clone(),
                confidence: choice.confidence,
            };

            match self.db.insert_association(&association) {
                Ok(true) => {
                    result.associated += 1;
                    if choice.used_default_duration {
                        result.fallback_durations += 1;
                    }
                    debug!(
                        path = %file.path.display(),
                        owner = %owner,
                        match_id = %association.match_id,
                        confidence = association.confidence,
                        "Associated media with match"
                    );
                }
                Ok(false) => result.already_associated += 1,
                Err(e) => {
                    warn!(path = %file.path.display(), owner = %owner, error = %e, "Failed to store association");
                    result
                        .errors
                        .push(format!("{} ({}): {:#}", file.path.display(), owner, e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OwnerStoreConfig;
    use crate::db::media::tests::sample;
    use anyhow::bail;
    use super::owners::tests::write_store;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn settings() -> CorrelationSettings {
        CorrelationSettings {
            tolerance: Duration::minutes(5),
            default_duration: Duration::minutes(15),
        }
    }

    fn record(id: &str, start: DateTime<Utc>, duration: Option<i64>) -> MatchRecord {
        MatchRecord {
            match_id: id.to_string(),
            start,
            duration: duration.map(Duration::seconds),
            map_name: None,
        }
    }

    /// In-memory owners; `None` simulates a store that cannot be opened.
    struct FakeStores {
        order: Vec<String>,
        matches: HashMap<String, Option<Vec<MatchRecord>>>,
    }

    impl FakeStores {
        fn new(owners: Vec<(&str, Option<Vec<MatchRecord>>)>) -> Self {
            Self {
                order: owners.iter().map(|(id, _)| id.to_string()).collect(),
                matches: owners
                    .into_iter()
                    .map(|(id, m)| (id.to_string(), m))
                    .collect(),
            }
        }
    }

    impl OwnerStoreProvider for FakeStores {
        fn owners(&self) -> Vec<String> {
            self.order.clone()
        }

        fn load_matches(&self, owner_id: &str) -> Result<OwnerMatches> {
            match self.matches.get(owner_id) {
                Some(Some(records)) => Ok(OwnerMatches {
                    records: records.clone(),
                    malformed: 0,
                }),
                _ => bail!("store for {} is locked", owner_id),
            }
        }
    }

    #[test]
    fn test_candidate_window_bounds() {
        let start = at("2024-05-01T20:00:00Z");
        let matches = vec![record("m1", start, Some(600))];

        let inside_early = start - Duration::minutes(5);
        let inside_late = start + Duration::seconds(600) + Duration::minutes(5);
        assert!(best_match(inside_early, &matches, &settings()).is_some());
        assert!(best_match(inside_late, &matches, &settings()).is_some());
        assert!(best_match(inside_early - Duration::seconds(1), &matches, &settings()).is_none());
        assert!(best_match(inside_late + Duration::seconds(1), &matches, &settings()).is_none());
    }

    #[test]
    fn test_nearest_start_wins_then_match_id() {
        let reference = at("2024-05-01T20:00:00Z");
        let matches = vec![
            record("m-far", reference - Duration::minutes(10), None),
            record("m-b", reference - Duration::minutes(2), None),
            record("m-a", reference + Duration::minutes(2), None),
        ];

        let choice = best_match(reference, &matches, &settings()).unwrap();
        assert_eq!(choice.record.match_id, "m-a");
        assert_eq!(choice.distance, Duration::minutes(2));
    }

    #[test]
    fn test_unrepresentable_window_is_not_a_candidate() {
        let reference = at("2024-05-01T20:00:00Z");
        let matches = vec![
            record("m-huge", reference - Duration::minutes(1), Some(i64::MAX / 2000)),
            record("m-edge", DateTime::<Utc>::MAX_UTC - Duration::minutes(1), None),
            record("m-ok", reference - Duration::minutes(3), Some(600)),
        ];

        let choice = best_match(reference, &matches, &settings()).unwrap();
        assert_eq!(choice.record.match_id, "m-ok");
        assert!(best_match(DateTime::<Utc>::MAX_UTC, &matches[1..2], &settings()).is_none());
    }

    #[test]
    fn test_confidence() {
        let d = Duration::minutes(15);
        let tol = Duration::minutes(5);
        assert_eq!(confidence(Duration::zero(), d, tol), 1.0);
        assert!((confidence(Duration::minutes(5), d, tol) - 0.8).abs() < 1e-9);
        assert_eq!(confidence(Duration::hours(2), d, tol), 0.0);
    }

    #[test]
    fn test_capture_scenario() {
        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        let clip = sample("/captures/clip.mp4", "h1", saved);
        db.insert_media(&clip, &saved).unwrap();

        let stores = FakeStores::new(vec![
            (
                "me",
                Some(vec![record("m1", saved - Duration::seconds(580), None)]),
            ),
            (
                "friend",
                Some(vec![record("m9", saved - Duration::hours(3), Some(720))]),
            ),
        ]);

        let correlator = MatchCorrelator::new(&db, &stores, settings());
        let result = correlator.correlate().unwrap();

        assert_eq!(result.media_considered, 1);
        assert_eq!(result.owners_processed, 2);
        assert_eq!(result.associated, 1);
        assert_eq!(result.fallback_durations, 1);

        let rows = db.get_associations(&clip.path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner_id, "me");
        assert_eq!(rows[0].match_id, "m1");
        assert!(rows[0].confidence > 0.0 && rows[0].confidence <= 1.0);
    }

    #[test]
    fn test_second_run_inserts_nothing() {
        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        db.insert_media(&sample("/captures/clip.mp4", "h1", saved), &saved)
            .unwrap();
        let stores = FakeStores::new(vec![(
            "me",
            Some(vec![record("m1", saved - Duration::minutes(8), Some(600))]),
        )]);

        let correlator = MatchCorrelator::new(&db, &stores, settings());
        let first = correlator.correlate().unwrap();
        let before = db.get_all_associations().unwrap();
        let second = correlator.correlate().unwrap();

        assert_eq!(first.associated, 1);
        assert_eq!(second.associated, 0);
        assert_eq!(second.already_associated, 1);
        assert_eq!(db.get_all_associations().unwrap(), before);
    }

    #[test]
    fn test_one_association_per_owner() {
        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        let clip = sample("/captures/clip.mp4", "h1", saved);
        db.insert_media(&clip, &saved).unwrap();

        let shared = saved - Duration::minutes(6);
        let stores = FakeStores::new(vec![
            ("me", Some(vec![record("m1", shared, Some(480))])),
            (
                "friend",
                Some(vec![
                    record("m1", shared, Some(480)),
                    record("m2", saved - Duration::minutes(12), Some(900)),
                ]),
            ),
            ("squadmate", Some(vec![record("m7", shared, None)])),
        ]);

        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        assert_eq!(result.associated, 3);
        let rows = db.get_associations(&clip.path).unwrap();
        let owners: Vec<&str> = rows.iter().map(|r| r.owner_id.as_str()).collect();
        assert_eq!(owners, vec!["friend", "me", "squadmate"]);
        assert_eq!(rows[0].match_id, "m1");
    }

    #[test]
    fn test_removed_match_keeps_other_owners() {
        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        let clip = sample("/captures/clip.mp4", "h1", saved);
        db.insert_media(&clip, &saved).unwrap();

        let m = record("m1", saved - Duration::minutes(6), Some(480));
        let stores = FakeStores::new(vec![
            ("me", Some(vec![m.clone()])),
            ("friend", Some(vec![m])),
        ]);
        MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        let stores = FakeStores::new(vec![("me", Some(vec![])), ("friend", None)]);
        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        assert_eq!(result.associated, 0);
        assert_eq!(result.owners_skipped, 1);
        assert!(db.has_association_for_owner(&clip.path, "me").unwrap());
        assert!(db.has_association_for_owner(&clip.path, "friend").unwrap());
    }

    #[test]
    fn test_unavailable_store_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        db.insert_media(&sample("/captures/clip.mp4", "h1", saved), &saved)
            .unwrap();

        let stores = FakeStores::new(vec![
            ("locked", None),
            (
                "me",
                Some(vec![record("m1", saved - Duration::minutes(1), None)]),
            ),
        ]);
        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        assert_eq!(result.owners_skipped, 1);
        assert_eq!(result.owners_processed, 1);
        assert_eq!(result.associated, 1);
        assert_eq!(result.errors.count, 1);
    }

    #[test]
    fn test_sqlite_stores_end_to_end() {
        let dir = tempdir().unwrap();
        let me = dir.path().join("me/history.db");
        write_store(
            &me,
            &[("m1", "2024-05-01T19:52:00Z", Some(600.0), Some("Recharge"))],
        );

        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        let clip = sample("/captures/clip.mp4", "h1", saved);
        db.insert_media(&clip, &saved).unwrap();

        let stores = SqliteOwnerStores::new(
            "me",
            vec![
                OwnerStoreConfig { id: "me".into(), path: me },
                OwnerStoreConfig {
                    id: "ghost".into(),
                    path: dir.path().join("ghost/history.db"),
                },
            ],
        );
        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        assert_eq!(result.associated, 1);
        assert_eq!(result.owners_skipped, 1);
        let rows = db.get_associations(Path::new("/captures/clip.mp4")).unwrap();
        assert_eq!(rows[0].map_name.as_deref(), Some("Recharge"));
    }

    #[test]
    fn test_corrupt_store_rows_do_not_stop_other_owners() {
        let dir = tempdir().unwrap();
        let friend = dir.path().join("friend/history.db");
        write_store(
            &friend,
            &[
                ("bad", "2024-05-01T19:55:00Z", Some(1e15), None),
                ("f1", "2024-05-01T19:54:00Z", Some(600.0), None),
            ],
        );
        let me = dir.path().join("me/history.db");
        write_store(&me, &[("m1", "2024-05-01T19:52:00Z", Some(600.0), None)]);

        let db = Database::open_in_memory().unwrap();
        let saved = at("2024-05-01T20:00:00Z");
        let clip = sample("/captures/clip.mp4", "h1", saved);
        db.insert_media(&clip, &saved).unwrap();

        let stores = SqliteOwnerStores::new(
            "me",
            vec![
                OwnerStoreConfig { id: "friend".into(), path: friend },
                OwnerStoreConfig { id: "me".into(), path: me },
            ],
        );
        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();

        assert_eq!(result.owners_processed, 2);
        assert_eq!(result.associated, 2);
        let rows = db.get_associations(&clip.path).unwrap();
        let linked: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.owner_id.as_str(), r.match_id.as_str()))
            .collect();
        assert_eq!(linked, vec![("friend", "f1"), ("me", "m1")]);
    }

    #[test]
    fn test_no_media_no_work() {
        let db = Database::open_in_memory().unwrap();
        let stores = FakeStores::new(vec![("me", Some(vec![]))]);
        let result = MatchCorrelator::new(&db, &stores, settings())
            .correlate()
            .unwrap();
        assert_eq!(result.media_considered, 0);
        assert_eq!(result.associated, 0);
        assert!(result.errors.is_empty());
    }
}
