//! Source adapters: raw page content in, candidate records out.
//!
//! Adapters never perform I/O. They are treated as untrusted; the harvester
//! calls them through [`parse_isolated`] so a panicking adapter fails only
//! its own source.

mod html;
mod json;

pub use html::HtmlAdapter;
pub use json::JsonAdapter;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::catalog::CandidateRecord;
use crate::config::{AdapterKind, ConfigError, SourceConfig};

/// Where a page came from.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub source: String,
    pub url: String,
    /// 1-based page number.
    pub page: u32,
}

impl PageContext {
    pub fn new(source: impl Into<String>, url: impl Into<String>, page: u32) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            page,
        }
    }

    pub(crate) fn base_url(&self) -> Result<Url, ParseError> {
        Url::parse(&self.url)
            .map_err(|e| ParseError::InvalidFormat(format!("page url {}: {e}", self.url)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid content: {0}")]
    InvalidFormat(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("adapter panicked: {0}")]
    Panicked(String),
}

/// Turns one fetched page into candidate records.
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, content: &str, ctx: &PageContext) -> Result<Vec<CandidateRecord>, ParseError>;
}

/// Run an adapter, turning a panic into [`ParseError::Panicked`].
pub fn parse_isolated(
    adapter: &dyn SourceAdapter,
    content: &str,
    ctx: &PageContext,
) -> Result<Vec<CandidateRecord>, ParseError> {
    match catch_unwind(AssertUnwindSafe(|| adapter.parse(content, ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ParseError::Panicked(message))
        }
    }
}

/// Build the adapter configured for a source.
pub fn build_adapter(
    name: &str,
    source: &SourceConfig,
) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    match source.adapter {
        Some(AdapterKind::Json) => Ok(Arc::new(JsonAdapter::new(source.json.clone()))),
        Some(AdapterKind::Html) => HtmlAdapter::new(&source.html)
            .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
            .map_err(|e| {
                ConfigError::ValidationError(format!("sources.{name}.html.pattern: {e}"))
            }),
        None => Err(ConfigError::ValidationError(format!(
            "sources.{name}.adapter is required"
        ))),
    }
}

/// Expand `{origin}` and `{id}` in a record URL template.
pub(crate) fn expand_url_template(template: &str, id: &str, base: &Url) -> String {
    template
        .replace("{origin}", &base.origin().ascii_serialization())
        .replace("{id}", &urlencoding::encode(id))
}

/// Resolve a possibly relative link against the page URL.
pub(crate) fn resolve_link(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    base.join(raw).ok().map(|u| u.to_string())
}

/// First run of ASCII digits in `text`, e.g. `"12 files"` → 12.
pub(crate) fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}
