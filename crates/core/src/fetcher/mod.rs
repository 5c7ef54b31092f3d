//! Resilient page retrieval.
//!
//! A [`FetchController`] walks an ordered chain of [`FetchTier`]s, from a
//! plain request up to a remote headless browser, until one produces content
//! that passes the [`AcceptancePolicy`].

mod acceptance;
mod browser;
mod cache;
mod controller;
mod direct;
mod rate_limiter;
mod retry;
mod session;
mod types;

pub use acceptance::{AcceptancePolicy, Verdict};
pub use browser::BrowserTier;
pub use cache::{CacheEntry, ContentCache};
pub use controller::FetchController;
pub use direct::DirectTier;
pub use rate_limiter::{HostPacingStatus, HostRateLimiter};
pub use retry::RetryPolicy;
pub use session::SessionTier;
pub use types::*;

use async_trait::async_trait;
use url::Url;

/// One retrieval strategy.
///
/// Tiers only move bytes; pacing, acceptance and retries are applied by the
/// controller around every call.
#[async_trait]
pub trait FetchTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// Relative cost; cheaper tiers are tried first.
    fn cost(&self) -> u32 {
        self.kind() as u32
    }

    async fn get(&self, url: &Url) -> Result<TierResponse, TierError>;
}
