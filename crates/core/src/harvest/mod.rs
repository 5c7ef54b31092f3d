//! Run orchestration: harvest every enabled source in isolation.
//!
//! Sources run with bounded parallelism, but results always come back in
//! registration order so the insertion cap favours the same sources on every
//! run no matter which one finishes first.

mod types;

pub use types::*;

use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapter::{parse_isolated, PageContext};
use crate::catalog::{CandidateRecord, Catalog};
use crate::diagnostics::{DiagnosticsWriter, FailureNote, SourceReport, SourceStatus};
use crate::fetcher::{FetchController, FetchHints};
use crate::metrics;

pub struct Harvester {
    controller: Arc<FetchController>,
    sources: Vec<RegisteredSource>,
    diagnostics: Arc<DiagnosticsWriter>,
    max_parallel: usize,
    timeout: Duration,
}

impl Harvester {
    pub fn new(
        controller: Arc<FetchController>,
        sources: Vec<RegisteredSource>,
        diagnostics: Arc<DiagnosticsWriter>,
        max_parallel: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            controller,
            sources,
            diagnostics,
            max_parallel: max_parallel.max(1),
            timeout,
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.plan.name.as_str()).collect()
    }

    /// Harvest all sources. `catalog` is the previous catalog, consulted only
    /// for `stop_on_known_page`.
    pub async fn run(&self, catalog: &Catalog) -> Vec<SourceHarvest> {
        let deadline = Instant::now() + self.timeout;
        info!(
            sources = self.sources.len(),
            max_parallel = self.max_parallel,
            timeout_secs = self.timeout.as_secs(),
            "Starting harvest"
        );

        stream::iter(self.sources.iter())
            .map(|source| self.run_source(source, catalog, deadline))
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    async fn run_source(
        &self,
        source: &RegisteredSource,
        catalog: &Catalog,
        deadline: Instant,
    ) -> SourceHarvest {
        let name = source.plan.name.clone();
        let started = Instant::now();
        // Survives the timeout, so attempts made before the deadline are kept.
        let report = Mutex::new(SourceReport::default());

        let result =
            tokio::time::timeout_at(deadline, self.harvest_pages(source, catalog, &report)).await;

        let mut report = with_report(&report, |r| std::mem::take(r));
        let candidates = match result {
            Ok(candidates) => candidates,
            Err(_) => {
                warn!(source = %name, "Run deadline reached, abandoning source");
                report.mark(SourceStatus::TimedOut);
                report.failures.push(FailureNote {
                    url: source.plan.url.clone(),
                    page: report.pages_fetched + 1,
                    kind: "timeout".to_string(),
                    message: "run deadline reached".to_string(),
                    tier: None,
                    artifact: None,
                });
                Vec::new()
            }
        };
        report.records_found = candidates.len();

        info!(
            source = %name,
            status = ?report.status,
            pages = report.pages_fetched,
            records = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Source harvested"
        );

        SourceHarvest {
            name,
            candidates,
            report,
        }
    }

    async fn harvest_pages(
        &self,
        source: &RegisteredSource,
        catalog: &Catalog,
        report: &Mutex<SourceReport>,
    ) -> Vec<CandidateRecord> {
        let plan = &source.plan;
        let hints = FetchHints::for_source(&plan.name)
            .starting_at(plan.start_tier)
            .with_min_content_length(plan.min_content_length);
        let mut candidates = Vec::new();

        for page in 1..=plan.page_limit() {
            let url = plan.page_url(page);
            let outcome = self
                .harvest_page(source, &url, page, &hints, catalog, report)
                .await;

            let stop = match outcome {
                PageOutcome::Records { records, all_known } => {
                    debug!(source = %plan.name, page, records = records.len(), "Page harvested");
                    candidates.extend(records);
                    if all_known && plan.stop_on_known_page {
                        info!(source = %plan.name, page, "Page holds only known records, stopping");
                        true
                    } else {
                        false
                    }
                }
                PageOutcome::Empty => {
                    if page == 1 {
                        warn!(source = %plan.name, url = %url, "First page listed no records");
                    }
                    true
                }
                PageOutcome::NotFound => {
                    if page == 1 {
                        with_report(report, |r| r.mark(SourceStatus::Failed));
                    }
                    true
                }
                PageOutcome::FetchFailed(failure) => {
                    debug!(
                        source = %plan.name,
                        page,
                        error = %failure,
                        attempts = failure.attempts.len(),
                        "Stopping pagination after fetch failure"
                    );
                    let status = if page == 1 {
                        SourceStatus::Failed
                    } else {
                        SourceStatus::Partial
                    };
                    with_report(report, |r| r.mark(status));
                    true
                }
                PageOutcome::ParseFailed(err) => {
                    // A source that cannot be parsed contributes nothing.
                    warn!(
                        source = %plan.name,
                        page,
                        error = %err,
                        dropped = candidates.len(),
                        "Parse failure, dropping source candidates"
                    );
                    candidates.clear();
                    with_report(report, |r| r.mark(SourceStatus::Failed));
                    true
                }
            };

            if stop {
                break;
            }
        }

        candidates
    }

    /// Fetch and parse one page. Failures are noted in `report` here.
    async fn harvest_page(
        &self,
        source: &RegisteredSource,
        url: &str,
        page: u32,
        hints: &FetchHints,
        catalog: &Catalog,
        report: &Mutex<SourceReport>,
    ) -> PageOutcome {
        let name = source.plan.name.as_str();

        let fetched = match self.controller.fetch(url, hints).await {
            Ok(fetched) => fetched,
            Err(failure) => {
                // A missing page past the first is the normal end of a listing.
                let noteworthy = !failure.is_not_found() || page == 1;
                let artifact = failure
                    .last_body
                    .as_deref()
                    .filter(|_| noteworthy)
                    .and_then(|body| self.save_artifact(name, url, body));
                with_report(report, |r| {
                    r.record_attempts(&failure.attempts);
                    r.escalations += failure.escalations;
                    if noteworthy {
                        r.failures.push(FailureNote {
                            url: url.to_string(),
                            page,
                            kind: "fetch".to_string(),
                            message: failure.kind.to_string(),
                            tier: failure.last_tier,
                            artifact,
                        });
                    }
                });
                if failure.is_not_found() {
                    return PageOutcome::NotFound;
                }
                warn!(source = name, url, page, error = %failure, "Fetch failed");
                return PageOutcome::FetchFailed(failure);
            }
        };

        with_report(report, |r| {
            r.pages_fetched += 1;
            r.record_attempts(&fetched.attempts);
            r.escalations += fetched.escalations;
            if fetched.from_cache {
                r.cache_hits += 1;
            }
        });

        let ctx = PageContext::new(name, url, page);
        let records = match parse_isolated(source.adapter.as_ref(), &fetched.body, &ctx) {
            Ok(records) => records,
            Err(err) => {
                debug!(source = name, url, page, error = %err, "Adapter failed");
                metrics::PARSE_FAILURES.with_label_values(&[name]).inc();
                let artifact = self.save_artifact(name, url, &fetched.body);
                with_report(report, |r| {
                    r.failures.push(FailureNote {
                        url: url.to_string(),
                        page,
                        kind: "parse".to_string(),
                        message: err.to_string(),
                        tier: Some(fetched.tier),
                        artifact,
                    })
                });
                return PageOutcome::ParseFailed(err);
            }
        };

        let records = claim_records(name, records);
        if records.is_empty() {
            return PageOutcome::Empty;
        }
        let all_known = records.iter().all(|r| catalog.contains(&r.key()));
        PageOutcome::Records { records, all_known }
    }

    fn save_artifact(&self, source: &str, url: &str, body: &str) -> Option<std::path::PathBuf> {
        match self.diagnostics.save_artifact(source, url, body) {
            Ok(path) => path,
            Err(e) => {
                warn!(source, url, error = %e, "Failed to save fetch artifact");
                None
            }
        }
    }
}

/// Stamp records with the source that produced them and drop those without
/// an id. Adapters do not get to choose their source tag.
fn claim_records(source: &str, records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let before = records.len();
    let claimed: Vec<_> = records
        .into_iter()
        .filter_map(|mut r| {
            r.id = r.id.trim().to_string();
            if r.id.is_empty() {
                return None;
            }
            r.source = source.to_string();
            Some(r)
        })
        .collect();
    if claimed.len() < before {
        warn!(source, dropped = before - claimed.len(), "Dropped records without id");
    }
    claimed
}

fn with_report<R>(report: &Mutex<SourceReport>, f: impl FnOnce(&mut SourceReport) -> R) -> R {
    let mut guard = report.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}
