//! Per-host request pacing.
//!
//! Every tier calls [`HostRateLimiter::wait`] before touching the network.
//! Requests to one host are serialized with a random gap drawn from
//! `[min, max]`; requests to different hosts never wait on each other.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};
use tracing::trace;

use crate::config::FetchConfig;

/// Pacing state for one host.
#[derive(Debug, Default)]
struct HostSlot {
    last_request: Option<Instant>,
    requests: u64,
}

/// Pacing status for a host.
#[derive(Debug, Clone)]
pub struct HostPacingStatus {
    pub host: String,
    pub requests: u64,
    pub last_request_ago_ms: Option<u64>,
}

/// Pool of per-host pacers.
///
/// Thread-safe and async-compatible.
pub struct HostRateLimiter {
    min: Duration,
    max: Duration,
    hosts: RwLock<HashMap<String, Arc<Mutex<HostSlot>>>>,
}

impl HostRateLimiter {
    /// Create a limiter that spaces requests to a host by `[min, max]`.
    ///
    /// The bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            hosts: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.delay_min_secs.max(0.0)),
            Duration::from_secs_f64(config.delay_max_secs.max(0.0)),
        )
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Wait until a request to `host` is permitted, then claim the slot.
    ///
    /// The first request to a host goes through immediately.
    pub async fn wait(&self, host: &str) {
        let slot = self.slot(host).await;
        // Held across the sleep so concurrent callers for this host queue up.
        let mut slot = slot.lock().await;

        if let Some(last) = slot.last_request {
            let gap = self.draw();
            let ready_at = last + gap;
            let now = Instant::now();
            if ready_at > now {
                trace!(host, wait_ms = (ready_at - now).as_millis() as u64, "Pacing request");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        slot.last_request = Some(Instant::now());
        slot.requests += 1;
    }

    /// Get pacing status for all hosts seen so far.
    pub async fn status(&self) -> Vec<HostPacingStatus> {
        let hosts = self.hosts.read().await;
        let mut result = Vec::with_capacity(hosts.len());
        for (host, slot) in hosts.iter() {
            let slot = slot.lock().await;
            result.push(HostPacingStatus {
                host: host.clone(),
                requests: slot.requests,
                last_request_ago_ms: slot
                    .last_request
                    .map(|at| at.elapsed().as_millis() as u64),
            });
        }
        result.sort_by(|a, b| a.host.cmp(&b.host));
        result
    }

    async fn slot(&self, host: &str) -> Arc<Mutex<HostSlot>> {
        if let Some(slot) = self.hosts.read().await.get(host) {
            return slot.clone();
        }
        let mut hosts = self.hosts.write().await;
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HostSlot::default())))
            .clone()
    }

    fn draw(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
