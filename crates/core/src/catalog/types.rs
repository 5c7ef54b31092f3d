//! Types for the album catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::PlaceholderMatcher;

/// Primary key of a record: `(source, id)`, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub source: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// A catalogued album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Site-local identifier (unique within `source`).
    pub id: String,
    /// Source tag this record was harvested from.
    pub source: String,
    /// Canonical page URL.
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub has_videos: bool,
    /// Publication date reported by the site, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Set once at first insertion, never changed by later merges.
    pub indexed_at: DateTime<Utc>,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.source, &self.id)
    }
}

/// A record as emitted by a source adapter, before it has been indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub source: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub has_videos: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl CandidateRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.source, &self.id)
    }

    /// Promote to a catalog record first seen at `indexed_at`.
    pub fn into_record(self, indexed_at: DateTime<Utc>) -> Record {
        Record {
            id: self.id,
            source: self.source,
            url: self.url,
            title: self.title,
            thumbnail: self.thumbnail,
            file_count: self.file_count,
            has_videos: self.has_videos,
            published_at: self.published_at,
            indexed_at,
        }
    }
}

/// Catalog summary. Always derived from the record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub total: usize,
    pub placeholder_count: usize,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Deduplicated set of records keyed by `(source, id)`.
///
/// There is no stored meta: [`Catalog::meta`] recomputes it, so `total` can
/// never drift from the record count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    records: BTreeMap<RecordKey, Record>,
    last_run_at: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from records, keeping the first occurrence of each key.
    ///
    /// Returns the catalog and the number of duplicate records dropped.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> (Self, usize) {
        let mut catalog = Self::new();
        let mut duplicates = 0;
        for record in records {
            let key = record.key();
            if catalog.records.contains_key(&key) {
                duplicates += 1;
                continue;
            }
            catalog.records.insert(key, record);
        }
        (catalog, duplicates)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn set_last_run_at(&mut self, at: DateTime<Utc>) {
        self.last_run_at = Some(at);
    }

    pub(crate) fn get_mut(&mut self, key: &RecordKey) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    pub(crate) fn insert(&mut self, record: Record) {
        self.records.insert(record.key(), record);
    }

    /// Compute the catalog summary.
    pub fn meta(&self, placeholders: &PlaceholderMatcher) -> Meta {
        Meta {
            total: self.records.len(),
            placeholder_count: self
                .records
                .values()
                .filter(|r| placeholders.is_placeholder(&r.title))
                .count(),
            last_run_at: self.last_run_at,
        }
    }

    /// Render the on-disk document, newest records first.
    pub fn to_document(&self, placeholders: &PlaceholderMatcher) -> CatalogDocument {
        let mut records: Vec<Record> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            let a_date = a.published_at.unwrap_or(a.indexed_at);
            let b_date = b.published_at.unwrap_or(b.indexed_at);
            b_date.cmp(&a_date).then_with(|| a.key().cmp(&b.key()))
        });
        CatalogDocument {
            meta: self.meta(placeholders),
            records,
        }
    }
}

/// Persisted catalog file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub meta: Meta,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Errors from catalog persistence.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("catalog file {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("failed to serialize catalog: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(source: &str, id: &str, title: &str) -> Record {
        Record {
            id: id.to_string(),
            source: source.to_string(),
            url: format!("https://{source}.example/a/{id}"),
            title: title.to_string(),
            thumbnail: None,
            file_count: 3,
            has_videos: false,
            published_at: None,
            indexed_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_record_key_display() {
        let key = RecordKey::new("gallery", "abc123");
        assert_eq!(key.to_string(), "gallery:abc123");
    }

    #[test]
    fn test_same_id_different_source_are_distinct() {
        let (catalog, dups) = Catalog::from_records(vec![
            record("gallery", "abc", "One"),
            record("board", "abc", "Two"),
        ]);
        assert_eq!(dups, 0);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let (catalog, dups) = Catalog::from_records(vec![
            record("gallery", "abc", "First"),
            record("gallery", "abc", "Second"),
        ]);
        assert_eq!(dups, 1);
        assert_eq!(catalog.len(), 1);
        let kept = catalog.get(&RecordKey::new("gallery", "abc")).unwrap();
        assert_eq!(kept.title, "First");
    }

    #[test]
    fn test_meta_counts_placeholders() {
        let matcher = PlaceholderMatcher::default();
        let (catalog, _) = Catalog::from_records(vec![
            record("gallery", "a", "Summer Trip"),
            record("gallery", "b", "Just a moment..."),
            record("gallery", "c", "  WELCOME  "),
            record("gallery", "d", ""),
        ]);
        let meta = catalog.meta(&matcher);
        assert_eq!(meta.total, 4);
        assert_eq!(meta.placeholder_count, 3);
        assert!(meta.placeholder_count <= meta.total);
    }

    #[test]
    fn test_document_sorted_newest_first() {
        let matcher = PlaceholderMatcher::default();
        let mut old = record("gallery", "old", "Old");
        old.indexed_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut new = record("gallery", "new", "New");
        new.published_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        let (catalog, _) = Catalog::from_records(vec![old, new]);
        let doc = catalog.to_document(&matcher);
        assert_eq!(doc.records[0].id, "new");
        assert_eq!(doc.records[1].id, "old");
        assert_eq!(doc.meta.total, 2);
    }

    #[test]
    fn test_document_serialization_shape() {
        let matcher = PlaceholderMatcher::default();
        let (mut catalog, _) = Catalog::from_records(vec![record("gallery", "a", "Title")]);
        catalog.set_last_run_at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());

        let json = serde_json::to_value(catalog.to_document(&matcher)).unwrap();
        assert_eq!(json["meta"]["total"], 1);
        assert_eq!(json["meta"]["placeholder_count"], 0);
        assert!(json["meta"]["last_run_at"].is_string());
        assert_eq!(json["records"][0]["source"], "gallery");
        // absent publication date is omitted
        assert!(json["records"][0].get("published_at").is_none());
    }
}
