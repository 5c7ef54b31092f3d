//! HTML link-listing adapter.

use regex_lite::Regex;
use std::collections::HashSet;

use super::{
    expand_url_template, leading_number, resolve_link, PageContext, ParseError, SourceAdapter,
};
use crate::catalog::CandidateRecord;
use crate::config::HtmlAdapterConfig;

/// Scans a listing page with a link pattern.
///
/// The pattern must have an `id` group; `title`, `thumb` and `count` groups
/// are optional. Each id is emitted once, in page order.
pub struct HtmlAdapter {
    pattern: Regex,
    url_template: String,
}

impl HtmlAdapter {
    pub fn new(config: &HtmlAdapterConfig) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            pattern: Regex::new(&config.pattern)?,
            url_template: config.url_template.clone(),
        })
    }
}

impl SourceAdapter for HtmlAdapter {
    fn name(&self) -> &'static str {
        "html"
    }

    fn parse(&self, content: &str, ctx: &PageContext) -> Result<Vec<CandidateRecord>, ParseError> {
        let base = ctx.base_url()?;
        if self.pattern.capture_names().flatten().all(|n| n != "id") {
            return Err(ParseError::MissingField("id group in link pattern".to_string()));
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for caps in self.pattern.captures_iter(content) {
            let Some(id) = caps.name("id").map(|m| m.as_str().trim()) else {
                continue;
            };
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }

            let title = caps
                .name("title")
                .map(|m| unescape(m.as_str()))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| id.to_string());

            records.push(CandidateRecord {
                id: id.to_string(),
                source: ctx.source.clone(),
                url: expand_url_template(&self.url_template, id, &base),
                title,
                thumbnail: caps
                    .name("thumb")
                    .and_then(|m| resolve_link(&base, &unescape(m.as_str()))),
                file_count: caps
                    .name("count")
                    .and_then(|m| leading_number(m.as_str()))
                    .unwrap_or(0),
                has_videos: false,
                published_at: None,
            });
        }

        Ok(records)
    }
}

/// Decode the handful of entities that show up in titles and attributes,
/// then collapse whitespace.
fn unescape(raw: &str) -> String {
    // `&amp;` last, so `&amp;lt;` stays the literal text `&lt;`.
    let decoded = raw
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
