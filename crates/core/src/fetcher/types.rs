//! Types for tiered page retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Retrieval strategy, in increasing cost order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Plain HTTP request with browser-like headers.
    Direct,
    /// HTTP client with a persistent cookie jar and origin warm-up.
    Session,
    /// Remote headless browser rendering the page.
    Browser,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [TierKind::Direct, TierKind::Session, TierKind::Browser];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Direct => "direct",
            TierKind::Session => "session",
            TierKind::Browser => "browser",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw response produced by a tier.
#[derive(Debug, Clone)]
pub struct TierResponse {
    pub status: u16,
    pub body: String,
}

impl TierResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Errors raised by a tier before any response was received.
#[derive(Debug, Clone, Error)]
pub enum TierError {
    /// Connection, DNS, TLS or timeout failure. Retried within the tier.
    #[error("network error: {0}")]
    Network(String),

    /// The tier itself cannot serve requests (e.g., browser service down).
    #[error("tier unavailable: {0}")]
    Unavailable(String),
}

/// Why an otherwise successful response was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    TooShort { length: usize, min: usize },
    Marker { marker: String },
    Status { status: u16 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { length, min } => {
                write!(f, "body too short ({length} < {min} bytes)")
            }
            Rejection::Marker { marker } => write!(f, "challenge marker {marker:?}"),
            Rejection::Status { status } => write!(f, "blocked with HTTP {status}"),
        }
    }
}

/// Outcome of a single attempt against a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ChallengeDetected { reason: Rejection },
    NetworkError { message: String },
    NotFound,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::ChallengeDetected { .. } => "challenge",
            AttemptOutcome::NetworkError { .. } => "network_error",
            AttemptOutcome::NotFound => "not_found",
        }
    }
}

/// Record of one retrieval attempt, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub url: String,
    pub tier: TierKind,
    /// 1-based attempt number within the tier.
    pub attempt: u32,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Body length in bytes, when a response was received.
    pub length: Option<usize>,
    pub elapsed_ms: u64,
}

/// Per-call hints from the caller.
#[derive(Debug, Clone, Default)]
pub struct FetchHints {
    /// Source tag, used only for log context.
    pub source: Option<String>,
    /// Skip every tier cheaper than this one.
    pub start_tier: Option<TierKind>,
    /// Replaces the policy's minimum content length for this call.
    pub min_content_length: Option<usize>,
}

impl FetchHints {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn starting_at(mut self, tier: Option<TierKind>) -> Self {
        self.start_tier = tier;
        self
    }

    pub fn with_min_content_length(mut self, min: Option<usize>) -> Self {
        self.min_content_length = min;
        self
    }
}

/// Accepted content.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub body: String,
    /// Tier that produced `body` (for cache hits, the tier that originally did).
    pub tier: TierKind,
    pub from_cache: bool,
    pub attempts: Vec<FetchAttempt>,
    /// Number of moves to a more expensive tier during this call.
    pub escalations: u32,
}

/// Terminal reason a fetch produced no content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("every tier failed")]
    Exhausted,

    #[error("page not found")]
    NotFound,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no tier available")]
    NoTiers,
}

/// A fetch that yielded no acceptable content.
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed: {kind}")]
pub struct FetchFailure {
    pub url: String,
    #[source]
    pub kind: FetchError,
    /// Last body received from any tier, if one was received.
    pub last_body: Option<String>,
    pub last_tier: Option<TierKind>,
    pub attempts: Vec<FetchAttempt>,
    pub escalations: u32,
}

impl FetchFailure {
    pub fn is_not_found(&self) -> bool {
        self.kind == FetchError::NotFound
    }
}
