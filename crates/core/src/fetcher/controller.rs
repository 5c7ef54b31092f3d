//! Tier escalation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::acceptance::{AcceptancePolicy, Verdict};
use super::{
    AttemptOutcome, BrowserTier, ContentCache, DirectTier, FetchAttempt, FetchError, FetchFailure,
    FetchHints, FetchTier, Fetched, HostRateLimiter, RetryPolicy, SessionTier, TierError,
    TierKind, TierResponse,
};
use crate::config::FetchConfig;
use crate::metrics;

/// Result of running one tier (with its retries) for a URL.
enum TierResult {
    Accepted(String),
    NotFound(String),
    /// A response arrived but was not acceptable.
    Rejected(String),
    /// No usable response at all.
    Failed,
}

/// Tries tiers cheapest-first until one returns acceptable content.
///
/// Owns the run-scoped state: pacing, content cache and the per-host sticky
/// tier. Construct one per run and share it between sources.
pub struct FetchController {
    tiers: Vec<Arc<dyn FetchTier>>,
    policy: AcceptancePolicy,
    retry: RetryPolicy,
    limiter: Arc<HostRateLimiter>,
    cache: ContentCache,
    sticky: RwLock<HashMap<String, TierKind>>,
}

impl FetchController {
    /// Tiers are ordered by cost; if two share a kind the first one given wins.
    pub fn new(
        tiers: Vec<Arc<dyn FetchTier>>,
        policy: AcceptancePolicy,
        retry: RetryPolicy,
        limiter: Arc<HostRateLimiter>,
        cache: ContentCache,
    ) -> Self {
        let mut tiers = tiers;
        tiers.sort_by_key(|t| t.cost());
        let mut seen = Vec::new();
        tiers.retain(|t| {
            let kind = t.kind();
            if seen.contains(&kind) {
                false
            } else {
                seen.push(kind);
                true
            }
        });

        Self {
            tiers,
            policy,
            retry,
            limiter,
            cache,
            sticky: RwLock::new(HashMap::new()),
        }
    }

    /// Build the standard tier chain. The browser tier is only added when a
    /// browser service is configured.
    pub fn from_config(config: &FetchConfig) -> Result<Self, TierError> {
        let limiter = Arc::new(HostRateLimiter::from_config(config));

        let mut tiers: Vec<Arc<dyn FetchTier>> = vec![
            Arc::new(DirectTier::new(config)?),
            Arc::new(SessionTier::new(config, limiter.clone())?),
        ];
        if let Some(browser) = &config.browser {
            tiers.push(Arc::new(BrowserTier::new(browser)?));
        }

        Ok(Self::new(
            tiers,
            AcceptancePolicy::from_config(&config.acceptance),
            RetryPolicy::from_config(&config.retry),
            limiter,
            ContentCache::new(!config.no_cache),
        ))
    }

    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|t| t.kind()).collect()
    }

    pub fn limiter(&self) -> &Arc<HostRateLimiter> {
        &self.limiter
    }

    /// Tier that last succeeded for `host` in this run.
    pub async fn sticky_tier(&self, host: &str) -> Option<TierKind> {
        self.sticky.read().await.get(host).copied()
    }

    /// Fetch `url`, escalating through tiers as needed.
    pub async fn fetch(&self, url: &str, hints: &FetchHints) -> Result<Fetched, FetchFailure> {
        let source = hints.source.as_deref().unwrap_or("-");

        let parsed = match Url::parse(url) {
            Ok(parsed) if parsed.host_str().is_some() => parsed,
            Ok(_) => return Err(failure(url, FetchError::InvalidUrl("no host".to_string()))),
            Err(e) => return Err(failure(url, FetchError::InvalidUrl(e.to_string()))),
        };
        let host = parsed.host_str().unwrap_or_default().to_string();

        if let Some(entry) = self.cache.get(url).await {
            debug!(source, url, tier = %entry.tier, "Cache hit");
            metrics::CACHE_HITS.inc();
            return Ok(Fetched {
                url: url.to_string(),
                body: entry.content,
                tier: entry.tier,
                from_cache: true,
                attempts: Vec::new(),
                escalations: 0,
            });
        }

        if self.tiers.is_empty() {
            return Err(failure(url, FetchError::NoTiers));
        }

        let start_kind = match self.sticky_tier(&host).await {
            Some(kind) => Some(kind),
            None => hints.start_tier,
        };
        let start = start_kind
            .and_then(|kind| self.tiers.iter().position(|t| t.kind() >= kind))
            .unwrap_or(if start_kind.is_some() { self.tiers.len() - 1 } else { 0 });

        let mut attempts = Vec::new();
        let mut escalations = 0u32;
        let mut last_body = None;
        let mut last_tier = None;

        for (index, tier) in self.tiers.iter().enumerate().skip(start) {
            if index > start {
                escalations += 1;
                metrics::FETCH_ESCALATIONS
                    .with_label_values(&[tier.kind().as_str()])
                    .inc();
                info!(source, url, tier = %tier.kind(), "Escalating to next tier");
            }
            last_tier = Some(tier.kind());

            let outcome = self
                .run_tier(tier.as_ref(), &parsed, &host, hints, &mut attempts)
                .await;
            match outcome {
                TierResult::Accepted(body) => {
                    self.cache.put(url, &body, tier.kind()).await;
                    self.sticky.write().await.insert(host.clone(), tier.kind());
                    info!(
                        source,
                        url,
                        tier = %tier.kind(),
                        bytes = body.len(),
                        escalations,
                        "Fetched"
                    );
                    return Ok(Fetched {
                        url: url.to_string(),
                        body,
                        tier: tier.kind(),
                        from_cache: false,
                        attempts,
                        escalations,
                    });
                }
                TierResult::NotFound(body) => {
                    info!(source, url, tier = %tier.kind(), "Page not found");
                    return Err(FetchFailure {
                        url: url.to_string(),
                        kind: FetchError::NotFound,
                        last_body: Some(body),
                        last_tier,
                        attempts,
                        escalations,
                    });
                }
                TierResult::Rejected(body) => last_body = Some(body),
                TierResult::Failed => {}
            }
        }

        warn!(source, url, attempts = attempts.len(), escalations, "Every tier failed");
        Err(FetchFailure {
            url: url.to_string(),
            kind: FetchError::Exhausted,
            last_body,
            last_tier,
            attempts,
            escalations,
        })
    }

    /// One tier with bounded retries on transient failures.
    async fn run_tier(
        &self,
        tier: &dyn FetchTier,
        url: &Url,
        host: &str,
        hints: &FetchHints,
        attempts: &mut Vec<FetchAttempt>,
    ) -> TierResult {
        let kind = tier.kind();
        let source = hints.source.as_deref().unwrap_or("-");
        let mut last_body = None;

        for attempt in 1..=self.retry.max_attempts() {
            self.limiter.wait(host).await;
            let started = Instant::now();
            let result = tier.get(url).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let (outcome, response, retryable) = match result {
                Ok(response) => match self
                    .policy
                    .evaluate_with(&response, hints.min_content_length)
                {
                    Verdict::Accept => (AttemptOutcome::Success, Some(response), false),
                    Verdict::NotFound => (AttemptOutcome::NotFound, Some(response), false),
                    Verdict::Transient => (
                        AttemptOutcome::NetworkError {
                            message: format!("HTTP {}", response.status),
                        },
                        Some(response),
                        true,
                    ),
                    Verdict::Challenge(reason) => {
                        (AttemptOutcome::ChallengeDetected { reason }, Some(response), false)
                    }
                },
                Err(TierError::Network(message)) => {
                    (AttemptOutcome::NetworkError { message }, None, true)
                }
                Err(TierError::Unavailable(message)) => {
                    (AttemptOutcome::NetworkError { message }, None, false)
                }
            };

            metrics::FETCH_ATTEMPTS
                .with_label_values(&[kind.as_str(), outcome.label()])
                .inc();
            attempts.push(FetchAttempt {
                url: url.to_string(),
                tier: kind,
                attempt,
                outcome: outcome.clone(),
                status: response.as_ref().map(|r| r.status),
                length: response.as_ref().map(|r| r.body.len()),
                elapsed_ms,
            });

            match outcome {
                AttemptOutcome::Success => {
                    return TierResult::Accepted(into_body(response));
                }
                AttemptOutcome::NotFound => {
                    return TierResult::NotFound(into_body(response));
                }
                AttemptOutcome::ChallengeDetected { reason } => {
                    info!(source, url = %url, tier = %kind, attempt, %reason, "Challenge detected");
                    return TierResult::Rejected(into_body(response));
                }
                AttemptOutcome::NetworkError { message } => {
                    if let Some(response) = response {
                        last_body = Some(response.body);
                    }
                    if !retryable {
                        warn!(source, url = %url, tier = %kind, error = %message, "Tier unavailable");
                        break;
                    }
                    if !self.retry.should_retry(attempt) {
                        warn!(source, url = %url, tier = %kind, attempt, error = %message, "Retries exhausted");
                        break;
                    }
                    let delay = self.retry.delay(attempt);
                    debug!(
                        source,
                        url = %url,
                        tier = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        match last_body {
            Some(body) => TierResult::Rejected(body),
            None => TierResult::Failed,
        }
    }
}

fn into_body(response: Option<TierResponse>) -> String {
    response.map(|r| r.body).unwrap_or_default()
}

fn failure(url: &str, kind: FetchError) -> FetchFailure {
    FetchFailure {
        url: url.to_string(),
        kind,
        last_body: None,
        last_tier: None,
        attempts: Vec::new(),
        escalations: 0,
    }
}
