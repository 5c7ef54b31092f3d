//! Cookie-session tier.
//!
//! Keeps one cookie jar for the run. Before the first request to a host the
//! site origin is visited once, so clearance cookies handed out on the front
//! page are present when the real page is requested.

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use url::Url;

use super::direct::{browser_headers, network_error, read_response};
use super::{FetchTier, HostRateLimiter, TierError, TierKind, TierResponse};
use crate::config::FetchConfig;

pub struct SessionTier {
    client: Client,
    limiter: Arc<HostRateLimiter>,
    warmup: bool,
    /// One warm-up per host; concurrent first requests to a host share it.
    warmed: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl SessionTier {
    /// Warm-up requests are paced through `limiter` like any other request.
    pub fn new(config: &FetchConfig, limiter: Arc<HostRateLimiter>) -> Result<Self, TierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(&config.user_agent)
            .default_headers(browser_headers())
            .cookie_store(true)
            .build()
            .map_err(|e| TierError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiter,
            warmup: config.session.warmup,
            warmed: Mutex::new(HashMap::new()),
        })
    }

    /// Visit the origin of `url` once per host. Returns whether this call
    /// made the visit.
    async fn warm_up(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let origin = url.origin().ascii_serialization();
        if origin == url.as_str().trim_end_matches('/') {
            return false;
        }

        let cell = self
            .warmed
            .lock()
            .await
            .entry(host.to_string())
            .or_default()
            .clone();

        let mut visited = false;
        let made_visit = &mut visited;
        cell.get_or_init(|| async move {
            *made_visit = true;
            self.limiter.wait(host).await;
            match self.client.get(&origin).send().await {
                Ok(response) => {
                    debug!(host, status = response.status().as_u16(), "Session warm-up done");
                }
                Err(e) => {
                    // The real request still goes ahead; it reports its own error.
                    debug!(host, error = %e, "Session warm-up failed");
                }
            }
        })
        .await;
        visited
    }
}

#[async_trait]
impl FetchTier for SessionTier {
    fn kind(&self) -> TierKind {
        TierKind::Session
    }

    async fn get(&self, url: &Url) -> Result<TierResponse, TierError> {
        if self.warmup && self.warm_up(url).await {
            // The warm-up used this request's pacing slot.
            if let Some(host) = url.host_str() {
                self.limiter.wait(host).await;
            }
        }

        let response = self
            .client
            .get(url.as_str())
            .header(REFERER, url.origin().ascii_serialization() + "/")
            .send()
            .await
            .map_err(network_error)?;
        read_response(response).await
    }
}
