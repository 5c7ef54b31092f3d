//! Mock fetch tier for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use url::Url;

use crate::fetcher::{FetchTier, TierError, TierKind, TierResponse};

/// A request the mock tier received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
enum Scripted {
    Response(TierResponse),
    Error(TierError),
}

/// Mock implementation of the FetchTier trait.
///
/// Replays scripted responses in order, then the fallback (if set), then a
/// network error. Every request is recorded.
///
/// # Example
///
/// ```rust,ignore
/// use albumdex_core::testing::{MockTier, fixtures};
///
/// let direct = MockTier::new(TierKind::Direct);
/// direct.push_ok("<html>tiny</html>").await;           // rejected: too short
/// direct.set_fallback_ok(fixtures::listing_page(3)).await;
///
/// assert_eq!(direct.call_count().await, 0);
/// ```
pub struct MockTier {
    kind: TierKind,
    script: Arc<RwLock<VecDeque<Scripted>>>,
    fallback: Arc<RwLock<Option<Scripted>>>,
    /// Simulated latency per request.
    delay: Arc<RwLock<Option<Duration>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl std::fmt::Debug for MockTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTier")
            .field("kind", &self.kind)
            .field("script", &"<script>")
            .finish()
    }
}

impl MockTier {
    pub fn new(kind: TierKind) -> Self {
        Self {
            kind,
            script: Arc::new(RwLock::new(VecDeque::new())),
            fallback: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a 200 response.
    pub async fn push_ok(&self, body: impl Into<String>) {
        self.push(Scripted::Response(TierResponse::ok(body))).await;
    }

    /// Queue a response with an arbitrary status.
    pub async fn push_status(&self, status: u16, body: impl Into<String>) {
        self.push(Scripted::Response(TierResponse::with_status(status, body)))
            .await;
    }

    /// Queue a transient network error.
    pub async fn push_network_error(&self, message: &str) {
        self.push(Scripted::Error(TierError::Network(message.to_string())))
            .await;
    }

    /// Queue a tier-unavailable error.
    pub async fn push_unavailable(&self, message: &str) {
        self.push(Scripted::Error(TierError::Unavailable(message.to_string())))
            .await;
    }

    /// Response returned once the script is exhausted.
    pub async fn set_fallback_ok(&self, body: impl Into<String>) {
        *self.fallback.write().await = Some(Scripted::Response(TierResponse::ok(body)));
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn requested_urls(&self) -> Vec<String> {
        self.requests
            .read()
            .await
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub async fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    async fn push(&self, step: Scripted) {
        self.script.write().await.push_back(step);
    }
}

#[async_trait]
impl FetchTier for MockTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    async fn get(&self, url: &Url) -> Result<TierResponse, TierError> {
        self.requests.write().await.push(RecordedRequest {
            url: url.to_string(),
            at: Instant::now(),
        });

        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }

        let step = match self.script.write().await.pop_front() {
            Some(step) => Some(step),
            None => self.fallback.read().await.clone(),
        };
        match step {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(err)) => Err(err),
            None => Err(TierError::Network("no scripted response".to_string())),
        }
    }
}
