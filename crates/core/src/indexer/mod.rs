//! One indexing run: load, harvest, merge, guard, persist, report.
//!
//! The guard decision and the save that follows it are the only point at
//! which a run changes persisted state.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::adapter::build_adapter;
use crate::catalog::{
    Catalog, CatalogError, CatalogStore, CommitDecision, CommitGuard, JsonCatalogStore,
    MergeEngine, PlaceholderMatcher,
};
use crate::config::{Config, ConfigError};
use crate::diagnostics::{DiagnosticsWriter, RunOutcome, RunReport};
use crate::fetcher::FetchController;
use crate::harvest::{Harvester, RegisteredSource, SourcePlan};
use crate::metrics;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub struct Indexer {
    harvester: Harvester,
    store: Arc<dyn CatalogStore>,
    merge: MergeEngine,
    guard: CommitGuard,
    placeholders: PlaceholderMatcher,
    diagnostics: Arc<DiagnosticsWriter>,
    config_hash: String,
}

impl Indexer {
    pub fn new(
        harvester: Harvester,
        store: Arc<dyn CatalogStore>,
        merge: MergeEngine,
        guard: CommitGuard,
        placeholders: PlaceholderMatcher,
        diagnostics: Arc<DiagnosticsWriter>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            harvester,
            store,
            merge,
            guard,
            placeholders,
            diagnostics,
            config_hash: config_hash.into(),
        }
    }

    /// Wire up the standard components from configuration.
    ///
    /// Expects a config that already passed `validate_config`.
    pub fn from_config(config: &Config) -> Result<Self, IndexError> {
        let controller = Arc::new(
            FetchController::from_config(&config.fetch)
                .map_err(|e| IndexError::Setup(e.to_string()))?,
        );
        info!(tiers = ?controller.tier_kinds(), "Fetch controller initialized");

        let mut sources = Vec::new();
        for (name, source) in config.enabled_sources() {
            let adapter = build_adapter(name, source)?;
            info!(source = %name, adapter = adapter.name(), url = %source.url, "Registered source");
            sources.push(RegisteredSource::new(SourcePlan::from_config(name, source), adapter));
        }
        if sources.is_empty() {
            warn!("No sources enabled");
        }

        let diagnostics = Arc::new(DiagnosticsWriter::new(&config.diagnostics));
        let harvester = Harvester::new(
            controller,
            sources,
            diagnostics.clone(),
            config.run.max_parallel_sources,
            Duration::from_secs(config.run.timeout_secs),
        );

        let placeholders = PlaceholderMatcher::from_config(&config.catalog);
        let store = Arc::new(JsonCatalogStore::new(
            config.catalog.path.clone(),
            placeholders.clone(),
        ));

        Ok(Self::new(
            harvester,
            store,
            MergeEngine::new(config.run.max_albums),
            CommitGuard::from_config(&config.catalog, &config.run),
            placeholders,
            diagnostics,
            config_hash(config),
        ))
    }

    /// Execute one run.
    ///
    /// A guard rejection is a normal outcome (`Ok` with
    /// [`RunOutcome::Rejected`]). Errors are returned only when the previous
    /// catalog cannot be read or the accepted catalog cannot be written; a
    /// report is written in every case.
    pub async fn run(&self) -> Result<RunReport, IndexError> {
        let started_at = Utc::now();
        let mut report = RunReport::new(&self.config_hash, started_at);
        info!(
            run_id = %report.run_id,
            config_hash = &self.config_hash[..16.min(self.config_hash.len())],
            sources = ?self.harvester.source_names(),
            "Run started"
        );

        let existing = match self.store.load() {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "Cannot load catalog, aborting run");
                report.outcome = RunOutcome::Aborted {
                    reason: e.to_string(),
                };
                self.finish(&mut report, None);
                return Err(e.into());
            }
        };

        let harvests = self.harvester.run(&existing).await;
        for harvest in &harvests {
            report
                .sources
                .insert(harvest.name.clone(), harvest.report.clone());
        }

        // Registration order decides who gets the insertion budget.
        let candidates = harvests.into_iter().flat_map(|h| h.candidates);
        let now = Utc::now();
        let merged = self.merge.merge(&existing, candidates, now);

        for (source, stats) in &merged.stats {
            record_merge_metrics(source, stats);
            if let Some(source_report) = report.sources.get_mut(source) {
                source_report.apply_merge(stats);
            }
        }

        let mut candidate = merged.catalog;
        candidate.set_last_run_at(now);
        let meta = candidate.meta(&self.placeholders);
        report.meta = Some(meta.clone());

        info!(
            total = meta.total,
            placeholders = meta.placeholder_count,
            inserted = merged.stats.values().map(|s| s.inserted).sum::<usize>(),
            updated = merged.stats.values().map(|s| s.updated).sum::<usize>(),
            capped = merged.stats.values().map(|s| s.capped).sum::<usize>(),
            "Merge complete"
        );

        let decision = self.guard.evaluate(&candidate);
        metrics::COMMIT_DECISIONS
            .with_label_values(&[decision.label()])
            .inc();

        let saved = match decision {
            CommitDecision::Reject(violation) => {
                warn!(violation = %violation, "Commit rejected, keeping previous catalog");
                report.outcome = RunOutcome::Rejected {
                    reason: violation.to_string(),
                };
                None
            }
            accepted => {
                match self.store.save(&candidate) {
                    Ok(()) => {
                        report.outcome = match accepted {
                            CommitDecision::Forced(overridden) => RunOutcome::Forced {
                                overridden: overridden.map(|v| v.to_string()),
                            },
                            _ => RunOutcome::Committed,
                        };
                        Some(candidate)
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to save catalog");
                        report.outcome = RunOutcome::SaveFailed {
                            reason: e.to_string(),
                        };
                        self.finish(&mut report, Some(&existing));
                        return Err(e.into());
                    }
                }
            }
        };

        let authoritative = saved.as_ref().unwrap_or(&existing);
        self.finish(&mut report, Some(authoritative));
        Ok(report)
    }

    /// Write the recheck queue, metrics and summary.
    ///
    /// Diagnostics failures are logged; they never change the run outcome.
    fn finish(&self, report: &mut RunReport, catalog: Option<&Catalog>) {
        if let Some(catalog) = catalog {
            match self.diagnostics.write_recheck(catalog, &self.placeholders) {
                Ok(count) => report.recheck = count,
                Err(e) => warn!(error = %e, "Failed to write recheck queue"),
            }
        }
        if let Err(e) = self.diagnostics.write_metrics() {
            warn!(error = %e, "Failed to write metrics");
        }

        report.finished_at = Utc::now();
        if let Err(e) = self.diagnostics.write_summary(report) {
            warn!(error = %e, "Failed to write run summary");
        }

        info!(
            run_id = %report.run_id,
            outcome = ?report.outcome,
            inserted = report.inserted(),
            updated = report.updated(),
            failed_sources = ?report.failed_sources(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Run finished"
        );
    }
}

fn record_merge_metrics(source: &str, stats: &crate::catalog::MergeStats) {
    for (kind, count) in [
        ("inserted", stats.inserted),
        ("updated", stats.updated),
        ("unchanged", stats.unchanged),
        ("capped", stats.capped),
    ] {
        metrics::MERGE_RESULTS
            .with_label_values(&[source, kind])
            .inc_by(count as u64);
    }
}

/// sha256 of the configuration as JSON.
pub fn config_hash(config: &Config) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(config_json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagnosticsConfig;
    use crate::diagnostics::{SourceStatus, SUMMARY_FILE};
    use crate::fetcher::{
        AcceptancePolicy, ContentCache, FetchTier, HostRateLimiter, RetryPolicy, TierKind,
    };
    use crate::testing::{fixtures, MemoryCatalogStore, MockAdapter, MockTier};
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        tier: Arc<MockTier>,
        store: Arc<MemoryCatalogStore>,
    }

    impl Harness {
        async fn new() -> Self {
            let tier = Arc::new(MockTier::new(TierKind::Direct));
            tier.set_fallback_ok(fixtures::listing_page(1)).await;
            Self {
                dir: TempDir::new().unwrap(),
                tier,
                store: Arc::new(MemoryCatalogStore::new()),
            }
        }

        fn indexer(
            &self,
            adapters: Vec<(&str, Arc<MockAdapter>)>,
            max_albums: usize,
            force: bool,
        ) -> Indexer {
            let tiers: Vec<Arc<dyn FetchTier>> = vec![self.tier.clone()];
            let controller = Arc::new(FetchController::new(
                tiers,
                AcceptancePolicy::default(),
                RetryPolicy::immediate(1),
                Arc::new(HostRateLimiter::disabled()),
                ContentCache::new(true),
            ));
            let sources = adapters
                .into_iter()
                .map(|(name, adapter)| {
                    let plan = SourcePlan {
                        name: name.to_string(),
                        url: format!("https://{name}.example/latest"),
                        max_pages: 1,
                        start_tier: None,
                        stop_on_known_page: false,
                        min_content_length: None,
                    };
                    RegisteredSource::new(plan, adapter)
                })
                .collect();
            let diagnostics = Arc::new(DiagnosticsWriter::new(&DiagnosticsConfig {
                dir: self.dir.path().to_path_buf(),
                ..Default::default()
            }));
            let harvester = Harvester::new(
                controller,
                sources,
                diagnostics.clone(),
                2,
                Duration::from_secs(60),
            );
            Indexer::new(
                harvester,
                self.store.clone(),
                MergeEngine::new(max_albums),
                CommitGuard::new(PlaceholderMatcher::default(), 0.05, force),
                PlaceholderMatcher::default(),
                diagnostics,
                "test-config-hash",
            )
        }
    }

    #[tokio::test]
    async fn test_run_commits_new_records() {
        let h = Harness::new().await;
        let adapter = Arc::new(MockAdapter::with_fallback(fixtures::candidates("gallery", 0..10)));
        let indexer = h.indexer(vec![("gallery", adapter)], 500, false);

        let report = indexer.run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Committed);
        assert_eq!(report.inserted(), 10);
        assert_eq!(report.sources["gallery"].inserted, 10);
        assert_eq!(h.store.stored().len(), 10);
        assert!(h.store.stored().last_run_at().is_some());
        assert!(h.dir.path().join(SUMMARY_FILE).exists());
    }

    #[tokio::test]
    async fn test_empty_harvest_on_empty_catalog_rejected() {
        let h = Harness::new().await;
        let adapter = Arc::new(MockAdapter::new());
        let indexer = h.indexer(vec![("gallery", adapter)], 500, false);

        let report = indexer.run().await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Rejected { .. }));
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_placeholder_flood_rejected_previous_kept() {
        let h = Harness::new().await;
        let (previous, _) = Catalog::from_records(
            (0..20).map(|i| fixtures::record("gallery", &format!("old{i}"), &format!("Old {i}"))),
        );
        let h = Harness {
            store: Arc::new(MemoryCatalogStore::with_catalog(previous.clone())),
            ..h
        };

        let junk: Vec<_> = (0..5)
            .map(|i| fixtures::candidate("gallery", &format!("junk{i}"), "Access Denied"))
            .collect();
        let adapter = Arc::new(MockAdapter::with_fallback(junk));
        let indexer = h.indexer(vec![("gallery", adapter)], 500, false);

        let report = indexer.run().await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Rejected { .. }));
        assert_eq!(h.store.stored(), previous);
        assert_eq!(report.meta.unwrap().placeholder_count, 5);
    }

    #[tokio::test]
    async fn test_force_commit_overrides_guard() {
        let h = Harness::new().await;
        let adapter = Arc::new(MockAdapter::with_fallback(vec![fixtures::candidate(
            "gallery", "x1", "Welcome",
        )]));
        let indexer = h.indexer(vec![("gallery", adapter)], 500, true);

        let report = indexer.run().await.unwrap();
        assert!(matches!(
            report.outcome,
            RunOutcome::Forced { overridden: Some(_) }
        ));
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_aborts_with_report() {
        let h = Harness::new().await;
        h.store.set_corrupt(true);
        let adapter = Arc::new(MockAdapter::with_fallback(fixtures::candidates("gallery", 0..3)));
        let indexer = h.indexer(vec![("gallery", adapter.clone())], 500, false);

        let err = indexer.run().await.unwrap_err();
        assert!(matches!(err, IndexError::Catalog(CatalogError::Corrupt { .. })));
        assert_eq!(adapter.call_count(), 0);

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(h.dir.path().join(SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["outcome"]["status"], "aborted");
    }

    #[tokio::test]
    async fn test_save_failure_is_error_with_report() {
        let h = Harness::new().await;
        h.store.set_fail_saves(true);
        let adapter = Arc::new(MockAdapter::with_fallback(fixtures::candidates("gallery", 0..3)));
        let indexer = h.indexer(vec![("gallery", adapter)], 500, false);

        let err = indexer.run().await.unwrap_err();
        assert!(matches!(err, IndexError::Catalog(CatalogError::Io { .. })));
        let summary = std::fs::read_to_string(h.dir.path().join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("save_failed"));
    }

    #[tokio::test]
    async fn test_failed_source_reported_other_committed() {
        let h = Harness::new().await;
        let broken = Arc::new(MockAdapter::new());
        broken.push_panic("boom");
        let healthy = Arc::new(MockAdapter::with_fallback(fixtures::candidates("board", 0..4)));
        let indexer = h.indexer(vec![("gallery", broken), ("board", healthy)], 500, false);

        let report = indexer.run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Committed);
        assert_eq!(report.sources["gallery"].status, SourceStatus::Failed);
        assert_eq!(report.sources["board"].inserted, 4);
        assert_eq!(report.failed_sources(), vec!["gallery"]);
    }

    #[test]
    fn test_config_hash_changes_with_config() {
        let a = Config::default();
        let mut b = Config::default();
        b.run.max_albums = 10;
        assert_eq!(config_hash(&a).len(), 64);
        assert_eq!(config_hash(&a), config_hash(&Config::default()));
        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_from_config_registers_enabled_sources() {
        let config = crate::config::load_config_from_str(
            r#"
[sources.gallery]
enabled = true
adapter = "json"
url = "https://gallery.example/api?page={page}"

[sources.board]
enabled = false
adapter = "html"
url = "https://board.example/"
"#,
        )
        .unwrap();
        let indexer = Indexer::from_config(&config).unwrap();
        assert_eq!(indexer.harvester.source_names(), vec!["gallery"]);
    }
}
