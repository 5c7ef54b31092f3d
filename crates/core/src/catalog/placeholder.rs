//! Detection of low-information titles.
//!
//! A placeholder title usually means the adapter parsed a block page or a
//! generic template instead of real album metadata.

use std::collections::HashSet;

use crate::config::CatalogConfig;

/// Decides whether a title is a known low-information placeholder.
#[derive(Debug, Clone)]
pub struct PlaceholderMatcher {
    titles: HashSet<String>,
    min_length: usize,
}

impl PlaceholderMatcher {
    pub fn new<I, S>(titles: I, min_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            titles: titles
                .into_iter()
                .map(|t| normalize(t.as_ref()))
                .collect(),
            min_length,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(&config.placeholder_titles, config.min_title_length)
    }

    pub fn is_placeholder(&self, title: &str) -> bool {
        let normalized = normalize(title);
        normalized.chars().count() < self.min_length || self.titles.contains(&normalized)
    }
}

impl Default for PlaceholderMatcher {
    fn default() -> Self {
        Self::from_config(&CatalogConfig::default())
    }
}

fn normalize(title: &str) -> String {
    title.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denylist() {
        let matcher = PlaceholderMatcher::default();
        assert!(matcher.is_placeholder("Welcome!"));
        assert!(matcher.is_placeholder("ACCESS DENIED"));
        assert!(matcher.is_placeholder("  403  "));
        assert!(matcher.is_placeholder("Untitled"));
        assert!(!matcher.is_placeholder("Beach weekend"));
        assert!(!matcher.is_placeholder("Welcome home"));
    }

    #[test]
    fn test_short_titles_are_placeholders() {
        let matcher = PlaceholderMatcher::default();
        assert!(matcher.is_placeholder(""));
        assert!(matcher.is_placeholder("   "));
        assert!(matcher.is_placeholder("x"));
        assert!(!matcher.is_placeholder("xy"));
    }

    #[test]
    fn test_custom_titles() {
        let matcher = PlaceholderMatcher::new(["Default Album"], 0);
        assert!(matcher.is_placeholder("default album"));
        assert!(!matcher.is_placeholder(""));
        assert!(!matcher.is_placeholder("welcome"));
    }
}
