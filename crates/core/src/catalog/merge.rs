//! Folding harvested candidates into an existing catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{CandidateRecord, Catalog, Record};

/// Per-source merge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// New records dropped because the run's insertion budget was spent.
    pub capped: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.capped
    }
}

/// Result of a merge: the candidate catalog and what happened per source.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub catalog: Catalog,
    pub stats: BTreeMap<String, MergeStats>,
}

impl MergeOutcome {
    pub fn inserted(&self) -> usize {
        self.stats.values().map(|s| s.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.stats.values().map(|s| s.updated).sum()
    }

    pub fn capped(&self) -> usize {
        self.stats.values().map(|s| s.capped).sum()
    }
}

/// Merge engine with a per-run cap on new insertions.
///
/// The cap counts insertions only; updates to existing records are never
/// capped. Candidates are consumed in the order given, so the caller decides
/// priority by ordering the batch.
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    max_inserts: usize,
}

impl MergeEngine {
    pub fn new(max_inserts: usize) -> Self {
        Self { max_inserts }
    }

    pub fn max_inserts(&self) -> usize {
        self.max_inserts
    }

    /// Merge `candidates` into a copy of `existing`.
    ///
    /// Records absent from the batch are kept untouched.
    pub fn merge<I>(&self, existing: &Catalog, candidates: I, now: DateTime<Utc>) -> MergeOutcome
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        let mut catalog = existing.clone();
        let mut stats: BTreeMap<String, MergeStats> = BTreeMap::new();
        let mut inserted = 0usize;

        for candidate in candidates {
            let key = candidate.key();
            let entry = stats.entry(candidate.source.clone()).or_default();

            match catalog.get_mut(&key) {
                Some(record) => {
                    if apply_update(record, &candidate) {
                        debug!(key = %key, "Updated record");
                        entry.updated += 1;
                    } else {
                        entry.unchanged += 1;
                    }
                }
                None if inserted < self.max_inserts => {
                    catalog.insert(candidate.into_record(now));
                    inserted += 1;
                    entry.inserted += 1;
                }
                None => {
                    entry.capped += 1;
                }
            }
        }

        MergeOutcome { catalog, stats }
    }
}

/// Overwrite the mutable fields of `record` that differ from `candidate`.
///
/// `published_at` is only taken when the candidate carries one. Returns
/// whether anything changed.
fn apply_update(record: &mut Record, candidate: &CandidateRecord) -> bool {
    let mut changed = false;

    if record.url != candidate.url {
        record.url = candidate.url.clone();
        changed = true;
    }
    if record.title != candidate.title {
        record.title = candidate.title.clone();
        changed = true;
    }
    if record.thumbnail != candidate.thumbnail {
        record.thumbnail = candidate.thumbnail.clone();
        changed = true;
    }
    if record.file_count != candidate.file_count {
        record.file_count = candidate.file_count;
        changed = true;
    }
    if record.has_videos != candidate.has_videos {
        record.has_videos = candidate.has_videos;
        changed = true;
    }
    if candidate.published_at.is_some() && record.published_at != candidate.published_at {
        record.published_at = candidate.published_at;
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordKey;
    use chrono::{Duration, TimeZone};

    fn candidate(source: &str, id: &str, title: &str) -> CandidateRecord {
        CandidateRecord {
            id: id.to_string(),
            source: source.to_string(),
            url: format!("https://{source}.example/a/{id}"),
            title: title.to_string(),
            thumbnail: None,
            file_count: 10,
            has_videos: false,
            published_at: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_insert_into_empty() {
        let engine = MergeEngine::new(500);
        let outcome = engine.merge(
            &Catalog::new(),
            vec![candidate("gallery", "a", "One"), candidate("gallery", "b", "Two")],
            t0(),
        );

        assert_eq!(outcome.catalog.len(), 2);
        assert_eq!(outcome.stats["gallery"].inserted, 2);
        let rec = outcome.catalog.get(&RecordKey::new("gallery", "a")).unwrap();
        assert_eq!(rec.indexed_at, t0());
    }

    #[test]
    fn test_update_keeps_indexed_at() {
        let engine = MergeEngine::new(500);
        let first = engine.merge(&Catalog::new(), vec![candidate("gallery", "a", "Old")], t0());

        let later = t0() + Duration::days(3);
        let mut changed = candidate("gallery", "a", "New title");
        changed.file_count = 42;
        changed.has_videos = true;
        let second = engine.merge(&first.catalog, vec![changed], later);

        let rec = second.catalog.get(&RecordKey::new("gallery", "a")).unwrap();
        assert_eq!(rec.title, "New title");
        assert_eq!(rec.file_count, 42);
        assert!(rec.has_videos);
        assert_eq!(rec.indexed_at, t0());
        assert_eq!(second.stats["gallery"].updated, 1);
        assert_eq!(second.stats["gallery"].inserted, 0);
    }

    #[test]
    fn test_identical_candidate_is_unchanged() {
        let engine = MergeEngine::new(500);
        let first = engine.merge(&Catalog::new(), vec![candidate("gallery", "a", "Same")], t0());
        let second = engine.merge(
            &first.catalog,
            vec![candidate("gallery", "a", "Same")],
            t0() + Duration::hours(1),
        );
        assert_eq!(second.stats["gallery"].unchanged, 1);
        assert_eq!(second.catalog, first.catalog);
    }

    #[test]
    fn test_missing_published_at_does_not_erase() {
        let engine = MergeEngine::new(500);
        let mut dated = candidate("gallery", "a", "Title");
        dated.published_at = Some(t0() - Duration::days(30));
        let first = engine.merge(&Catalog::new(), vec![dated], t0());

        let second = engine.merge(&first.catalog, vec![candidate("gallery", "a", "Title")], t0());
        let rec = second.catalog.get(&RecordKey::new("gallery", "a")).unwrap();
        assert_eq!(rec.published_at, Some(t0() - Duration::days(30)));
        assert_eq!(second.stats["gallery"].unchanged, 1);
    }

    #[test]
    fn test_never_deletes_absent_records() {
        let engine = MergeEngine::new(500);
        let first = engine.merge(
            &Catalog::new(),
            vec![candidate("gallery", "a", "A"), candidate("board", "x", "X")],
            t0(),
        );
        let second = engine.merge(&first.catalog, vec![candidate("gallery", "b", "B")], t0());
        assert_eq!(second.catalog.len(), 3);
        assert!(second.catalog.contains(&RecordKey::new("board", "x")));
    }

    #[test]
    fn test_cap_applies_to_inserts_only() {
        let engine = MergeEngine::new(1);
        let first = engine.merge(&Catalog::new(), vec![candidate("gallery", "a", "A")], t0());

        let batch = vec![
            candidate("gallery", "b", "B"),
            candidate("gallery", "c", "C"),
            candidate("gallery", "a", "A renamed"),
        ];
        let second = engine.merge(&first.catalog, batch, t0());
        let stats = second.stats["gallery"];
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.capped, 1);
        assert_eq!(stats.updated, 1);
        assert!(second.catalog.contains(&RecordKey::new("gallery", "b")));
        assert!(!second.catalog.contains(&RecordKey::new("gallery", "c")));
    }

    #[test]
    fn test_duplicate_candidates_in_batch() {
        let engine = MergeEngine::new(500);
        let outcome = engine.merge(
            &Catalog::new(),
            vec![candidate("gallery", "a", "First"), candidate("gallery", "a", "First")],
            t0(),
        );
        assert_eq!(outcome.catalog.len(), 1);
        assert_eq!(outcome.stats["gallery"].inserted, 1);
        assert_eq!(outcome.stats["gallery"].unchanged, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let engine = MergeEngine::new(500);
        let (existing, _) = Catalog::from_records(vec![
            candidate("gallery", "a", "Kept").into_record(t0() - Duration::days(1)),
        ]);
        let batch = vec![
            candidate("gallery", "a", "Renamed"),
            candidate("gallery", "b", "B"),
            candidate("board", "a", "Board A"),
        ];

        let once = engine.merge(&existing, batch.clone(), t0());
        let twice = engine.merge(&once.catalog, batch, t0() + Duration::hours(6));
        assert_eq!(once.catalog, twice.catalog);
        assert_eq!(twice.inserted(), 0);
        assert_eq!(twice.updated(), 0);
    }
}
