//! JSON listing adapter.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use super::{
    expand_url_template, leading_number, resolve_link, PageContext, ParseError, SourceAdapter,
};
use crate::catalog::CandidateRecord;
use crate::config::JsonAdapterConfig;

/// Reads an items array out of a JSON document and maps each item through
/// ordered field fallbacks.
pub struct JsonAdapter {
    config: JsonAdapterConfig,
}

impl JsonAdapter {
    pub fn new(config: JsonAdapterConfig) -> Self {
        Self { config }
    }

    fn items<'a>(&self, doc: &'a Value) -> Result<&'a Vec<Value>, ParseError> {
        let mut node = doc;
        for segment in self.config.items_path.split('.').filter(|s| !s.is_empty()) {
            node = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| ParseError::MissingField(self.config.items_path.clone()))?;
        }
        node.as_array().ok_or_else(|| {
            ParseError::InvalidFormat(format!(
                "expected an array at {:?}",
                self.config.items_path
            ))
        })
    }

    fn record(&self, item: &Value, ctx: &PageContext, base: &url::Url) -> Option<CandidateRecord> {
        let cfg = &self.config;
        let id = first(item, &cfg.id_fields).and_then(as_id)?;

        let title = first(item, &cfg.title_fields)
            .and_then(Value::as_str)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| id.clone());

        let url = item
            .get(&cfg.url_field)
            .and_then(Value::as_str)
            .and_then(|u| resolve_link(base, u))
            .unwrap_or_else(|| expand_url_template(&cfg.url_template, &id, base));

        let thumbnail = first(item, &cfg.thumbnail_fields)
            .and_then(Value::as_str)
            .and_then(|t| resolve_link(base, t));

        Some(CandidateRecord {
            id,
            source: ctx.source.clone(),
            url,
            title,
            thumbnail,
            file_count: first(item, &cfg.count_fields).and_then(as_count).unwrap_or(0),
            has_videos: first(item, &cfg.video_fields).map(as_flag).unwrap_or(false),
            published_at: first(item, &cfg.date_fields).and_then(as_date),
        })
    }
}

impl SourceAdapter for JsonAdapter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, content: &str, ctx: &PageContext) -> Result<Vec<CandidateRecord>, ParseError> {
        let doc: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))
            .map_err(|e| ParseError::InvalidFormat(format!("not JSON: {e}")))?;
        let base = ctx.base_url()?;

        let items = self.items(&doc)?;
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match self.record(item, ctx, &base) {
                Some(record) => records.push(record),
                None => debug!(source = %ctx.source, page = ctx.page, "Skipping item without id"),
            }
        }
        Ok(records)
    }
}

/// First present, non-null value among `fields`.
fn first<'a>(item: &'a Value, fields: &[String]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|f| item.get(f))
        .find(|v| !v.is_null())
}

fn as_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => leading_number(s),
        Value::Array(items) => Some(items.len() as u64),
        _ => None,
    }
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true")
                || s.eq_ignore_ascii_case("yes")
                || leading_number(s).is_some_and(|n| n > 0)
        }
        _ => false,
    }
}

fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d")
                        .ok()?
                        .and_hms_opt(0, 0, 0)
                        .map(|d| Utc.from_utc_datetime(&d))
                })
        }
        Value::Number(n) => {
            let ts = n.as_i64()?;
            // values this large are milliseconds
            if ts > 100_000_000_000 {
                Utc.timestamp_millis_opt(ts).single()
            } else {
                Utc.timestamp_opt(ts, 0).single()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> PageContext {
        PageContext::new("gallery", "https://gallery.example/api/albums?page=1", 1)
    }

    fn adapter(items_path: &str) -> JsonAdapter {
        JsonAdapter::new(JsonAdapterConfig {
            items_path: items_path.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_root_array() {
        let content = json!([
            {"id": "abc", "title": "Beach", "file_count": 12, "has_videos": true,
             "thumbnail": "/t/abc.jpg", "url": "/a/abc"},
            {"slug": "def", "name": "  Mountains  ", "files": ["a", "b"], "videos": 0}
        ])
        .to_string();

        let records = adapter("").parse(&content, &ctx()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].id, "abc");
        assert_eq!(records[0].source, "gallery");
        assert_eq!(records[0].url, "https://gallery.example/a/abc");
        assert_eq!(records[0].thumbnail.as_deref(), Some("https://gallery.example/t/abc.jpg"));
        assert_eq!(records[0].file_count, 12);
        assert!(records[0].has_videos);

        assert_eq!(records[1].id, "def");
        assert_eq!(records[1].title, "Mountains");
        assert_eq!(records[1].file_count, 2);
        assert!(!records[1].has_videos);
        // no url field: template applies
        assert_eq!(records[1].url, "https://gallery.example/a/def");
    }

    #[test]
    fn test_parse_nested_items_path() {
        let content = json!({"data": {"posts": [{"identifier": 42, "title": "Numbered"}]}}).to_string();
        let records = adapter("data.posts").parse(&content, &ctx()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "42");
    }

    #[test]
    fn test_identifier_preferred_over_id() {
        let content = json!([{"identifier": "real", "id": 7, "title": "X"}]).to_string();
        let records = adapter("").parse(&content, &ctx()).unwrap();
        assert_eq!(records[0].id, "real");
    }

    #[test]
    fn test_items_without_id_skipped() {
        let content = json!([{"title": "No id"}, {"id": "", "title": "Empty"}, {"id": "ok"}]).to_string();
        let records = adapter("").parse(&content, &ctx()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "ok");
    }

    #[test]
    fn test_count_from_string() {
        let content = json!([{"id": "a", "count": "37 files"}]).to_string();
        let records = adapter("").parse(&content, &ctx()).unwrap();
        assert_eq!(records[0].file_count, 37);
    }

    #[test]
    fn test_dates() {
        let content = json!([
            {"id": "a", "date": "2024-03-05T10:00:00Z"},
            {"id": "b", "published": "2024-03-05"},
            {"id": "c", "created_at": 1_709_632_800},
            {"id": "d", "added": "yesterday"}
        ])
        .to_string();
        let records = adapter("").parse(&content, &ctx()).unwrap();
        assert_eq!(
            records[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(
            records[1].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            records[2].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(records[3].published_at, None);
    }

    #[test]
    fn test_not_json() {
        let err = adapter("").parse("<html>blocked</html>", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_items_path() {
        let err = adapter("data.items").parse("{\"data\": {}}", &ctx()).unwrap_err();
        assert_eq!(err, ParseError::MissingField("data.items".to_string()));
    }

    #[test]
    fn test_items_not_array() {
        let err = adapter("").parse("{\"items\": []}", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat(_)));
    }

    #[test]
    fn test_empty_array() {
        let records = adapter("items").parse("{\"items\": []}", &ctx()).unwrap();
        assert!(records.is_empty());
    }
}
