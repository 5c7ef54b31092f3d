//! Plain HTTP tier.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{FetchTier, TierError, TierKind, TierResponse};
use crate::config::FetchConfig;

/// Single GET with browser-like headers and no state between requests.
pub struct DirectTier {
    client: Client,
}

impl DirectTier {
    pub fn new(config: &FetchConfig) -> Result<Self, TierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(&config.user_agent)
            .default_headers(browser_headers())
            .build()
            .map_err(|e| TierError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchTier for DirectTier {
    fn kind(&self) -> TierKind {
        TierKind::Direct
    }

    async fn get(&self, url: &Url) -> Result<TierResponse, TierError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(network_error)?;
        read_response(response).await
    }
}

/// Headers a desktop browser sends on a top-level navigation.
pub(super) fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

pub(super) fn network_error(err: reqwest::Error) -> TierError {
    if err.is_timeout() {
        TierError::Network(format!("timeout: {err}"))
    } else if err.is_connect() {
        TierError::Network(format!("connection failed: {err}"))
    } else {
        TierError::Network(err.to_string())
    }
}

/// Status and body of a response. Non-2xx statuses are not errors here; the
/// acceptance policy classifies them.
pub(super) async fn read_response(response: reqwest::Response) -> Result<TierResponse, TierError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network_error)?;
    Ok(TierResponse { status, body })
}
