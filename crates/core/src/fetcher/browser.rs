//! Remote headless browser tier (Browserless-compatible `/content` API).

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::direct::network_error;
use super::{FetchTier, TierError, TierKind, TierResponse};
use crate::config::BrowserConfig;

/// Renders pages in a remote browser.
///
/// One browser session is live at a time. The permit is held for the whole
/// request and released on every exit path when it drops.
pub struct BrowserTier {
    client: Client,
    endpoint: String,
    wait_ms: u64,
    session: Semaphore,
}

impl BrowserTier {
    pub fn new(config: &BrowserConfig) -> Result<Self, TierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TierError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        let mut endpoint = format!("{}/content", config.url.trim_end_matches('/'));
        if let Some(token) = &config.token {
            endpoint.push_str(&format!("?token={}", urlencoding::encode(token)));
        }

        info!(url = %config.url, "Browser tier initialized");
        Ok(Self {
            client,
            endpoint,
            wait_ms: config.wait_ms,
            session: Semaphore::new(1),
        })
    }

    fn request_body(&self, url: &Url) -> serde_json::Value {
        let mut body = serde_json::json!({
            "url": url.as_str(),
            "gotoOptions": { "waitUntil": "networkidle2" },
        });
        if self.wait_ms > 0 {
            body["waitForTimeout"] = serde_json::json!(self.wait_ms);
        }
        body
    }
}

#[async_trait]
impl FetchTier for BrowserTier {
    fn kind(&self) -> TierKind {
        TierKind::Browser
    }

    async fn get(&self, url: &Url) -> Result<TierResponse, TierError> {
        let _permit = self
            .session
            .acquire()
            .await
            .map_err(|_| TierError::Unavailable("browser session closed".to_string()))?;

        debug!(url = %url, "Rendering page in browser");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(url))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = response.text().await.map_err(network_error)?;

        // The service reports its own failures with 4xx/5xx; a page that
        // rendered with an error status still comes back as 200 content.
        if status.is_server_error() {
            return Err(TierError::Network(format!(
                "browser service returned {}",
                status.as_u16()
            )));
        }
        if status.is_client_error() {
            return Err(TierError::Unavailable(format!(
                "browser service rejected request ({}): {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        Ok(TierResponse::ok(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HttpStub, StubReply};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(token: Option<&str>) -> BrowserConfig {
        BrowserConfig {
            url: "http://browser.local:3000/".to_string(),
            token: token.map(String::from),
            wait_ms: 1500,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_endpoint_with_token() {
        let tier = BrowserTier::new(&config(Some("s3cr3t&x"))).unwrap();
        assert_eq!(
            tier.endpoint,
            "http://browser.local:3000/content?token=s3cr3t%26x"
        );
        assert_eq!(tier.cost(), 2);
    }

    #[test]
    fn test_endpoint_without_token() {
        let tier = BrowserTier::new(&config(None)).unwrap();
        assert_eq!(tier.endpoint, "http://browser.local:3000/content");
    }

    #[test]
    fn test_request_body() {
        let tier = BrowserTier::new(&config(None)).unwrap();
        let url = Url::parse("https://gallery.example/a/xyz").unwrap();
        let body = tier.request_body(&url);
        assert_eq!(body["url"], "https://gallery.example/a/xyz");
        assert_eq!(body["waitForTimeout"], 1500);
    }

    fn stub_tier(stub: &HttpStub) -> Arc<BrowserTier> {
        let config = BrowserConfig {
            url: stub.url(""),
            token: None,
            wait_ms: 0,
            timeout_secs: 10,
        };
        Arc::new(BrowserTier::new(&config).unwrap())
    }

    #[tokio::test]
    async fn test_one_session_at_a_time() {
        let stub = HttpStub::start(|_| {
            StubReply::ok("<html>rendered</html>").delayed(Duration::from_millis(200))
        })
        .await
        .unwrap();
        let tier = stub_tier(&stub);

        let first = Url::parse("https://gallery.example/a/one").unwrap();
        let second = Url::parse("https://gallery.example/a/two").unwrap();
        let (a, b) = tokio::join!(tier.get(&first), tier.get(&second));
        assert_eq!(a.unwrap().body, "<html>rendered</html>");
        assert_eq!(b.unwrap().body, "<html>rendered</html>");

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == "POST" && r.path == "/content"));
        assert!(requests[0].body.contains("gallery.example/a/"));
        assert_eq!(stub.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_failed_render_releases_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stub = {
            let calls = calls.clone();
            HttpStub::start(move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    StubReply::status(500, "renderer crashed").delayed(Duration::from_millis(100))
                } else {
                    StubReply::ok("<html>rendered</html>")
                }
            })
            .await
            .unwrap()
        };
        let tier = stub_tier(&stub);

        let first = Url::parse("https://gallery.example/a/one").unwrap();
        let second = Url::parse("https://gallery.example/a/two").unwrap();
        let (a, b) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(tier.get(&first), tier.get(&second)) },
        )
        .await
        .expect("queued render never got the session");

        assert!(matches!(a, Err(TierError::Network(_))));
        assert_eq!(b.unwrap().body, "<html>rendered</html>");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stub.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_unavailable() {
        let stub = HttpStub::start(|_| StubReply::status(401, "bad token")).await.unwrap();
        let tier = stub_tier(&stub);

        let err = tier
            .get(&Url::parse("https://gallery.example/a/one").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::Unavailable(msg) if msg.contains("bad token")));
    }
}
