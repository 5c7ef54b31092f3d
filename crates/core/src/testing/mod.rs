//! Testing utilities and mock implementations.
//!
//! This module provides mocks for every seam of the indexer (fetch tiers,
//! source adapters, catalog persistence), so full runs can be tested without
//! network access. [`HttpStub`] serves the real HTTP tiers over loopback.
//!
//! # Example
//!
//! ```rust,ignore
//! use albumdex_core::testing::{fixtures, MemoryCatalogStore, MockAdapter, MockTier};
//!
//! let direct = MockTier::new(TierKind::Direct);
//! direct.set_fallback_ok(fixtures::listing_page(3)).await;
//!
//! let adapter = MockAdapter::with_fallback(fixtures::candidates("gallery", 0..3));
//! let store = MemoryCatalogStore::new();
//! ```

mod http_stub;
mod memory_store;
mod mock_adapter;
mod mock_tier;

pub use http_stub::{HttpStub, StubReply, StubRequest};
pub use memory_store::MemoryCatalogStore;
pub use mock_adapter::MockAdapter;
pub use mock_tier::{MockTier, RecordedRequest};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use std::ops::Range;

    use crate::catalog::{CandidateRecord, Record};

    /// Filler that lifts a page over the default minimum content length.
    fn padding() -> String {
        "<p>Lorem ipsum dolor sit amet, consectetur adipiscing elit.</p>\n".repeat(60)
    }

    /// A listing page with `albums` links in the default `/a/<id>` layout.
    pub fn listing_page(albums: usize) -> String {
        let links: String = (0..albums)
            .map(|i| format!("<a href=\"/a/album{i:04}\">Album {i}</a>\n"))
            .collect();
        format!(
            "<html><head><title>Latest albums</title></head><body>\n{links}{}</body></html>",
            padding()
        )
    }

    /// A long interstitial page carrying a challenge marker.
    pub fn challenge_page() -> String {
        format!(
            "<html><head><title>Just a moment...</title></head><body>\
             <h1>Checking your browser before accessing the site.</h1>{}</body></html>",
            padding()
        )
    }

    /// JSON listing with default field names under an `items` array.
    pub fn json_listing(ids: Range<usize>) -> String {
        let items: Vec<_> = ids
            .map(|i| {
                serde_json::json!({
                    "id": format!("album{i:04}"),
                    "title": format!("Album {i}"),
                    "file_count": 10 + i,
                    "has_videos": i % 2 == 0,
                })
            })
            .collect();
        serde_json::json!({ "items": items }).to_string()
    }

    /// Fixed timestamp used as "first seen" across fixtures.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Create a candidate with reasonable defaults.
    pub fn candidate(source: &str, id: &str, title: &str) -> CandidateRecord {
        CandidateRecord {
            id: id.to_string(),
            source: source.to_string(),
            url: format!("https://{source}.example/a/{id}"),
            title: title.to_string(),
            thumbnail: Some(format!("https://{source}.example/t/{id}.jpg")),
            file_count: 12,
            has_videos: false,
            published_at: None,
        }
    }

    /// Candidates `album0000`, `album0001`, … for the given index range.
    pub fn candidates(source: &str, ids: Range<usize>) -> Vec<CandidateRecord> {
        ids.map(|i| candidate(source, &format!("album{i:04}"), &format!("Album {i}")))
            .collect()
    }

    /// Create an indexed record.
    pub fn record(source: &str, id: &str, title: &str) -> Record {
        candidate(source, id, title).into_record(epoch())
    }
}
