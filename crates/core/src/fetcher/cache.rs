//! Run-scoped cache of accepted content.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::TierKind;

/// Content accepted earlier in the run.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: String,
    pub tier: TierKind,
    pub fetched_at: DateTime<Utc>,
}

/// URL → accepted content, for the lifetime of one run.
pub struct ContentCache {
    enabled: bool,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ContentCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        self.entries.read().await.get(url).cloned()
    }

    pub async fn put(&self, url: &str, content: &str, tier: TierKind) {
        if !self.enabled {
            return;
        }
        self.entries.write().await.insert(
            url.to_string(),
            CacheEntry {
                content: content.to_string(),
                tier,
                fetched_at: Utc::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = ContentCache::new(true);
        cache.put("https://gallery.example/", "<html/>", TierKind::Session).await;

        let entry = cache.get("https://gallery.example/").await.unwrap();
        assert_eq!(entry.content, "<html/>");
        assert_eq!(entry.tier, TierKind::Session);
        assert!(cache.get("https://gallery.example/other").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let cache = ContentCache::new(false);
        cache.put("https://gallery.example/", "<html/>", TierKind::Direct).await;
        assert!(cache.get("https://gallery.example/").await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
