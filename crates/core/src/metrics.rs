//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Fetching (attempts per tier, escalations, cache hits)
//! - Merging (per-source insert/update/unchanged/capped counts)
//! - Commit guard decisions

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Fetch attempts by tier and outcome.
pub static FETCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("albumdex_fetch_attempts_total", "Total fetch attempts"),
        &["tier", "outcome"], // outcome: "success", "challenge", "network_error", "not_found"
    )
    .unwrap()
});

/// Escalations by the tier escalated to.
pub static FETCH_ESCALATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "albumdex_fetch_escalations_total",
            "Total escalations to a more expensive tier",
        ),
        &["to_tier"],
    )
    .unwrap()
});

/// Fetches served from the run cache.
pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("albumdex_cache_hits_total", "Fetches served from the run cache").unwrap()
});

// =============================================================================
// Catalog Metrics
// =============================================================================

/// Merge results by source and kind.
pub static MERGE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("albumdex_merge_results_total", "Candidate records merged"),
        &["source", "kind"], // kind: "inserted", "updated", "unchanged", "capped"
    )
    .unwrap()
});

/// Parse failures by source.
pub static PARSE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("albumdex_parse_failures_total", "Pages the adapter could not parse"),
        &["source"],
    )
    .unwrap()
});

/// Commit guard decisions.
pub static COMMIT_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("albumdex_commit_decisions_total", "Commit guard decisions"),
        &["decision"], // "accept", "reject", "forced"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FETCH_ATTEMPTS.clone()),
        Box::new(FETCH_ESCALATIONS.clone()),
        Box::new(CACHE_HITS.clone()),
        Box::new(MERGE_RESULTS.clone()),
        Box::new(PARSE_FAILURES.clone()),
        Box::new(COMMIT_DECISIONS.clone()),
    ]
}

/// Render every core metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        FETCH_ATTEMPTS.with_label_values(&["direct", "success"]).inc();
        COMMIT_DECISIONS.with_label_values(&["accept"]).inc();

        let text = render().unwrap();
        assert!(text.contains("albumdex_fetch_attempts_total"));
        assert!(text.contains("tier=\"direct\""));
        assert!(text.contains("albumdex_commit_decisions_total"));
    }

    #[test]
    fn test_render_twice() {
        // each render uses a fresh registry, so repeated dumps do not collide
        assert!(render().is_ok());
        assert!(render().is_ok());
    }
}
