//! Per-run report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{MergeStats, Meta};
use crate::fetcher::{FetchAttempt, TierKind};

/// How a source's harvest ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Ok,
    /// Some pages were harvested before a later page failed.
    Partial,
    Failed,
    /// Abandoned at the run deadline; its candidates were dropped.
    TimedOut,
}

/// A page that yielded no records because of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNote {
    pub url: String,
    pub page: u32,
    /// "fetch", "parse" or "timeout".
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<TierKind>,
    /// Saved body of the last response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// What happened to one source during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceReport {
    pub status: SourceStatus,
    pub pages_fetched: u32,
    pub records_found: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub capped: usize,
    /// tier → outcome → count
    pub attempts: BTreeMap<String, BTreeMap<String, u64>>,
    pub escalations: u32,
    pub cache_hits: u32,
    pub failures: Vec<FailureNote>,
}

impl SourceReport {
    pub fn record_attempts(&mut self, attempts: &[FetchAttempt]) {
        for attempt in attempts {
            *self
                .attempts
                .entry(attempt.tier.to_string())
                .or_default()
                .entry(attempt.outcome.label().to_string())
                .or_default() += 1;
        }
    }

    pub fn apply_merge(&mut self, stats: &MergeStats) {
        self.inserted = stats.inserted;
        self.updated = stats.updated;
        self.unchanged = stats.unchanged;
        self.capped = stats.capped;
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempts.values().flat_map(|o| o.values()).sum()
    }

    /// Downgrade the status; never upgrades (e.g. `Failed` stays `Failed`).
    pub fn mark(&mut self, status: SourceStatus) {
        let rank = |s: SourceStatus| match s {
            SourceStatus::Ok => 0,
            SourceStatus::Partial => 1,
            SourceStatus::Failed => 2,
            SourceStatus::TimedOut => 3,
        };
        if rank(status) > rank(self.status) {
            self.status = status;
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Committed,
    /// Committed although the guard objected.
    Forced {
        #[serde(skip_serializing_if = "Option::is_none")]
        overridden: Option<String>,
    },
    /// Guard refused; the previous catalog stays authoritative.
    Rejected { reason: String },
    /// Stopped before merging (e.g. unreadable catalog).
    Aborted { reason: String },
    SaveFailed { reason: String },
}

impl RunOutcome {
    pub fn committed(&self) -> bool {
        matches!(self, RunOutcome::Committed | RunOutcome::Forced { .. })
    }
}

/// Everything written to `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// sha256 of the effective configuration.
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    /// Summary of the merged (candidate) catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub sources: BTreeMap<String, SourceReport>,
    pub recheck: usize,
}

impl RunReport {
    pub fn new(config_hash: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config_hash: config_hash.into(),
            started_at,
            finished_at: started_at,
            outcome: RunOutcome::Aborted {
                reason: "run did not finish".to_string(),
            },
            meta: None,
            sources: BTreeMap::new(),
            recheck: 0,
        }
    }

    pub fn inserted(&self) -> usize {
        self.sources.values().map(|s| s.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.sources.values().map(|s| s.updated).sum()
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, s)| matches!(s.status, SourceStatus::Failed | SourceStatus::TimedOut))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("diagnostics I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to serialize diagnostics: {0}")]
    Serialize(String),
}
