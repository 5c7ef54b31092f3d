//! Validation of a merged catalog before it may replace the persisted one.

use thiserror::Error;
use tracing::warn;

use super::{Catalog, PlaceholderMatcher};
use crate::config::{CatalogConfig, RunConfig};

/// Why a catalog was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardViolation {
    #[error("catalog is empty")]
    Empty,

    #[error("{placeholders} of {total} titles are placeholders (ratio {ratio:.3}, limit {limit:.3})")]
    PlaceholderRatio {
        placeholders: usize,
        total: usize,
        ratio: f64,
        limit: f64,
    },
}

/// Guard verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitDecision {
    Accept,
    Reject(GuardViolation),
    /// Committed by operator override; carries the violation that was ignored.
    Forced(Option<GuardViolation>),
}

impl CommitDecision {
    pub fn allows_commit(&self) -> bool {
        !matches!(self, CommitDecision::Reject(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommitDecision::Accept => "accept",
            CommitDecision::Reject(_) => "reject",
            CommitDecision::Forced(_) => "forced",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitGuard {
    placeholders: PlaceholderMatcher,
    max_ratio: f64,
    force: bool,
}

impl CommitGuard {
    pub fn new(placeholders: PlaceholderMatcher, max_ratio: f64, force: bool) -> Self {
        Self {
            placeholders,
            max_ratio,
            force,
        }
    }

    pub fn from_config(catalog: &CatalogConfig, run: &RunConfig) -> Self {
        Self::new(
            PlaceholderMatcher::from_config(catalog),
            catalog.max_placeholder_ratio,
            run.force_commit,
        )
    }

    /// Check the catalog without considering the override.
    pub fn check(&self, catalog: &Catalog) -> Result<(), GuardViolation> {
        let meta = catalog.meta(&self.placeholders);
        if meta.total == 0 {
            return Err(GuardViolation::Empty);
        }
        let ratio = meta.placeholder_count as f64 / meta.total as f64;
        if ratio >= self.max_ratio {
            return Err(GuardViolation::PlaceholderRatio {
                placeholders: meta.placeholder_count,
                total: meta.total,
                ratio,
                limit: self.max_ratio,
            });
        }
        Ok(())
    }

    pub fn evaluate(&self, catalog: &Catalog) -> CommitDecision {
        match (self.check(catalog), self.force) {
            (Ok(()), false) => CommitDecision::Accept,
            (Err(violation), false) => CommitDecision::Reject(violation),
            (Ok(()), true) => CommitDecision::Forced(None),
            (Err(violation), true) => {
                warn!(violation = %violation, "Commit guard overridden by force_commit");
                CommitDecision::Forced(Some(violation))
            }
        }
    }

    pub fn should_commit(&self, catalog: &Catalog) -> bool {
        self.evaluate(catalog).allows_commit()
    }
}
