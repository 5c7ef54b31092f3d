//! Shared acceptance predicate for tier responses.

use super::{Rejection, TierResponse};
use crate::config::AcceptanceConfig;

/// Classification of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Missing page; more expensive tiers will not make it appear.
    NotFound,
    /// Rate limited or server-side failure without a challenge marker.
    Transient,
    /// Block page or challenge interstitial.
    Challenge(Rejection),
}

/// Decides whether response content is real or an access barrier.
///
/// A 200 response can still be rejected: short bodies and bodies carrying a
/// challenge marker are block pages.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    min_length: usize,
    markers: Vec<String>,
}

impl AcceptancePolicy {
    pub fn new<I, S>(min_length: usize, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            min_length,
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AcceptanceConfig) -> Self {
        Self::new(config.min_content_length, &config.challenge_markers)
    }

    /// First configured marker found in `body`, case-insensitively.
    pub fn find_marker(&self, body: &str) -> Option<&str> {
        let lowered = body.to_lowercase();
        self.markers
            .iter()
            .find(|m| lowered.contains(m.as_str()))
            .map(String::as_str)
    }

    pub fn evaluate(&self, response: &TierResponse) -> Verdict {
        self.evaluate_with(response, None)
    }

    /// Like [`evaluate`](Self::evaluate), with `min_length` replacing the
    /// configured floor when given. Markers and status rules are unchanged.
    pub fn evaluate_with(&self, response: &TierResponse, min_length: Option<usize>) -> Verdict {
        let min_length = min_length.unwrap_or(self.min_length);
        let marker = self.find_marker(&response.body);

        match response.status {
            404 | 410 => return Verdict::NotFound,
            401 | 403 => {
                return Verdict::Challenge(Rejection::Status {
                    status: response.status,
                })
            }
            200..=299 => {}
            status => {
                return match marker {
                    Some(marker) => Verdict::Challenge(Rejection::Marker {
                        marker: marker.to_string(),
                    }),
                    None if status == 429 || status >= 500 => Verdict::Transient,
                    None => Verdict::Challenge(Rejection::Status { status }),
                };
            }
        }

        if let Some(marker) = marker {
            return Verdict::Challenge(Rejection::Marker {
                marker: marker.to_string(),
            });
        }
        let length = response.body.len();
        if length < min_length {
            return Verdict::Challenge(Rejection::TooShort {
                length,
                min: min_length,
            });
        }
        Verdict::Accept
    }
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self::from_config(&AcceptanceConfig::default())
    }
}
