use std::sync::Arc;

use crate::adapter::{ParseError, SourceAdapter};
use crate::catalog::CandidateRecord;
use crate::config::SourceConfig;
use crate::diagnostics::SourceReport;
use crate::fetcher::{FetchFailure, TierKind};

/// What to fetch for a source.
#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub name: String,
    /// Listing URL; `{page}` is replaced by the page number.
    pub url: String,
    pub max_pages: u32,
    pub start_tier: Option<TierKind>,
    pub stop_on_known_page: bool,
    /// Acceptance length floor override for this source's pages.
    pub min_content_length: Option<usize>,
}

impl SourcePlan {
    pub fn from_config(name: &str, config: &SourceConfig) -> Self {
        Self {
            name: name.to_string(),
            url: config.url.clone(),
            max_pages: config.max_pages,
            start_tier: config.start_tier,
            stop_on_known_page: config.stop_on_known_page,
            min_content_length: config.min_content_length(),
        }
    }

    /// Pages to visit; a URL without `{page}` is a single page.
    pub fn page_limit(&self) -> u32 {
        if self.url.contains("{page}") {
            self.max_pages.max(1)
        } else {
            1
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        self.url.replace("{page}", &page.to_string())
    }
}

/// A source with its adapter, in registration order.
#[derive(Clone)]
pub struct RegisteredSource {
    pub plan: SourcePlan,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl RegisteredSource {
    pub fn new(plan: SourcePlan, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self { plan, adapter }
    }
}

/// Result of harvesting one page.
#[derive(Debug)]
pub enum PageOutcome {
    Records {
        records: Vec<CandidateRecord>,
        /// Every record on the page is already in the catalog.
        all_known: bool,
    },
    /// Page parsed but listed nothing: end of the listing.
    Empty,
    /// Page does not exist: end of the listing.
    NotFound,
    FetchFailed(FetchFailure),
    ParseFailed(ParseError),
}

/// Result of harvesting one source.
#[derive(Debug, Clone)]
pub struct SourceHarvest {
    pub name: String,
    /// Candidates in discovery order.
    pub candidates: Vec<CandidateRecord>,
    pub report: SourceReport,
}
