use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::fetcher::TierKind;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// Harvest sources keyed by their tag (lowercase).
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Config {
    /// Enabled sources in registration order: ascending `priority`, then name.
    pub fn enabled_sources(&self) -> Vec<(&String, &SourceConfig)> {
        let mut sources: Vec<_> = self.sources.iter().filter(|(_, s)| s.enabled).collect();
        sources.sort_by(|(a_name, a), (b_name, b)| {
            a.priority.cmp(&b.priority).then_with(|| a_name.cmp(b_name))
        });
        sources
    }
}

/// Run-wide limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Cap on newly inserted records per run across all sources (`MAX_ALBUMS`).
    #[serde(default = "default_max_albums")]
    pub max_albums: usize,
    /// How many sources may harvest at the same time.
    #[serde(default = "default_max_parallel_sources")]
    pub max_parallel_sources: usize,
    /// Wall-clock bound for the whole harvest phase.
    #[serde(default = "default_run_timeout")]
    pub timeout_secs: u64,
    /// Bypass the commit guard (`FORCE_COMMIT`).
    #[serde(default)]
    pub force_commit: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_albums: default_max_albums(),
            max_parallel_sources: default_max_parallel_sources(),
            timeout_secs: default_run_timeout(),
            force_commit: false,
        }
    }
}

fn default_max_albums() -> usize {
    500
}

fn default_max_parallel_sources() -> usize {
    2
}

fn default_run_timeout() -> u64 {
    45 * 60
}

/// Retrieval configuration shared by every tier
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Lower bound of the per-host pacing window (`DELAY_MIN`).
    #[serde(default = "default_delay_min")]
    pub delay_min_secs: f64,
    /// Upper bound of the per-host pacing window (`DELAY_MAX`).
    #[serde(default = "default_delay_max")]
    pub delay_max_secs: f64,
    /// Disable the per-run content cache (`DEBUG_NO_CACHE`).
    #[serde(default)]
    pub no_cache: bool,
    /// Per-request timeout for the HTTP tiers.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub acceptance: AcceptanceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Remote headless browser; the browser tier is only built when set.
    #[serde(default)]
    pub browser: Option<BrowserConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            delay_min_secs: default_delay_min(),
            delay_max_secs: default_delay_max(),
            no_cache: false,
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            acceptance: AcceptanceConfig::default(),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            browser: None,
        }
    }
}

fn default_delay_min() -> f64 {
    2.0
}

fn default_delay_max() -> f64 {
    4.5
}

fn default_request_timeout() -> u64 {
    25
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
        .to_string()
}

/// Thresholds deciding whether a response is real content or a block page
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcceptanceConfig {
    /// Bodies shorter than this (bytes) are treated as block pages.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    /// Case-insensitive substrings that identify an interstitial/challenge page.
    #[serde(default = "default_challenge_markers")]
    pub challenge_markers: Vec<String>,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
            challenge_markers: default_challenge_markers(),
        }
    }
}

fn default_min_content_length() -> usize {
    3000
}

fn default_challenge_markers() -> Vec<String> {
    [
        "checking your browser",
        "just a moment",
        "enable javascript and cookies",
        "cf-browser-verification",
        "cloudflare ray id",
        "cf_chl_opt",
        "ddos-guard",
        "attention required",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Bounded retry with exponential backoff, applied within a single tier
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts per tier, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1000
}

/// Cookie-session tier settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Visit the site origin once per host before the first real request so
    /// clearance cookies land in the jar.
    #[serde(default = "default_true")]
    pub warmup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { warmup: true }
    }
}

fn default_true() -> bool {
    true
}

/// Remote headless browser (Browserless-compatible `/content` endpoint)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// Service URL (e.g., "http://localhost:3000")
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Extra time given to the page after DOM load so JS challenges can settle.
    #[serde(default = "default_browser_wait")]
    pub wait_ms: u64,
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
}

fn default_browser_wait() -> u64 {
    3000
}

fn default_browser_timeout() -> u64 {
    60
}

/// Persisted catalog settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// Titles (case-insensitive, trimmed) that mark a record as a placeholder.
    #[serde(default = "default_placeholder_titles")]
    pub placeholder_titles: Vec<String>,
    /// Titles shorter than this (chars, trimmed) are placeholders too.
    #[serde(default = "default_min_title_length")]
    pub min_title_length: usize,
    /// Commit is refused when placeholder_count / total reaches this ratio.
    #[serde(default = "default_max_placeholder_ratio")]
    pub max_placeholder_ratio: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            placeholder_titles: default_placeholder_titles(),
            min_title_length: default_min_title_length(),
            max_placeholder_ratio: default_max_placeholder_ratio(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("albums.json")
}

fn default_placeholder_titles() -> Vec<String> {
    [
        "welcome",
        "welcome!",
        "access denied",
        "just a moment",
        "just a moment...",
        "403",
        "403 forbidden",
        "forbidden",
        "503",
        "error",
        "attention required",
        "checking your browser",
        "ray id",
        "untitled",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_min_title_length() -> usize {
    2
}

fn default_max_placeholder_ratio() -> f64 {
    0.05
}

/// Where run reports and failed-fetch bodies go
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_diagnostics_dir")]
    pub dir: PathBuf,
    /// Save the last body of every failed fetch under `<dir>/<source>/`.
    #[serde(default = "default_true")]
    pub save_artifacts: bool,
    /// Artifacts are truncated to this many bytes.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: default_diagnostics_dir(),
            save_artifacts: true,
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_max_artifact_bytes() -> usize {
    2 * 1024 * 1024
}

/// Built-in adapter implementations
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// JSON listing API
    Json,
    /// HTML listing page scanned with a link pattern
    Html,
}

/// One harvest source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Whether this source runs (`ENABLE_<SOURCE>`).
    #[serde(default)]
    pub enabled: bool,
    /// Adapter used to turn fetched pages into records.
    #[serde(default)]
    pub adapter: Option<AdapterKind>,
    /// Listing URL; `{page}` is replaced by the 1-based page number.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Registration order; lower runs first and keeps insertion priority
    /// when the run cap is reached.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Skip cheaper tiers known to fail for this site.
    #[serde(default)]
    pub start_tier: Option<TierKind>,
    /// Stop paginating once a page contains only already-indexed records.
    #[serde(default)]
    pub stop_on_known_page: bool,
    #[serde(default)]
    pub acceptance: SourceAcceptanceConfig,
    #[serde(default)]
    pub json: JsonAdapterConfig,
    #[serde(default)]
    pub html: HtmlAdapterConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            adapter: None,
            url: String::new(),
            max_pages: default_max_pages(),
            priority: default_priority(),
            start_tier: None,
            stop_on_known_page: false,
            acceptance: SourceAcceptanceConfig::default(),
            json: JsonAdapterConfig::default(),
            html: HtmlAdapterConfig::default(),
        }
    }
}

impl SourceConfig {
    /// Length floor applied to this source's pages; `None` keeps
    /// `fetch.acceptance.min_content_length`.
    ///
    /// JSON APIs answer with short bodies, so `json` sources are checked for
    /// challenge markers only unless a floor is configured.
    pub fn min_content_length(&self) -> Option<usize> {
        self.acceptance
            .min_content_length
            .or(match self.adapter {
                Some(AdapterKind::Json) => Some(0),
                _ => None,
            })
    }
}

/// Per-source acceptance overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceAcceptanceConfig {
    #[serde(default)]
    pub min_content_length: Option<usize>,
}

fn default_max_pages() -> u32 {
    1
}

fn default_priority() -> u32 {
    100
}

/// Field mapping for the JSON listing adapter.
///
/// Each `*_fields` list is tried in order; the first present, non-null value
/// wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonAdapterConfig {
    /// Dotted path to the items array ("" = the document root).
    #[serde(default)]
    pub items_path: String,
    #[serde(default = "default_id_fields")]
    pub id_fields: Vec<String>,
    #[serde(default = "default_title_fields")]
    pub title_fields: Vec<String>,
    #[serde(default = "default_thumbnail_fields")]
    pub thumbnail_fields: Vec<String>,
    #[serde(default = "default_count_fields")]
    pub count_fields: Vec<String>,
    #[serde(default = "default_video_fields")]
    pub video_fields: Vec<String>,
    #[serde(default = "default_date_fields")]
    pub date_fields: Vec<String>,
    #[serde(default = "default_url_field")]
    pub url_field: String,
    /// Record URL when the item has none; `{id}` and `{origin}` are expanded.
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

impl Default for JsonAdapterConfig {
    fn default() -> Self {
        Self {
            items_path: String::new(),
            id_fields: default_id_fields(),
            title_fields: default_title_fields(),
            thumbnail_fields: default_thumbnail_fields(),
            count_fields: default_count_fields(),
            video_fields: default_video_fields(),
            date_fields: default_date_fields(),
            url_field: default_url_field(),
            url_template: default_url_template(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_id_fields() -> Vec<String> {
    strings(&["identifier", "id", "slug"])
}

fn default_title_fields() -> Vec<String> {
    strings(&["title", "name"])
}

fn default_thumbnail_fields() -> Vec<String> {
    strings(&["thumbnail", "cover", "preview", "image"])
}

fn default_count_fields() -> Vec<String> {
    strings(&["file_count", "count", "files"])
}

fn default_video_fields() -> Vec<String> {
    strings(&["has_videos", "video_count", "videos"])
}

fn default_date_fields() -> Vec<String> {
    strings(&["date", "published", "created_at", "added"])
}

fn default_url_field() -> String {
    "url".to_string()
}

fn default_url_template() -> String {
    "{origin}/a/{id}".to_string()
}

/// Link pattern for the HTML listing adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HtmlAdapterConfig {
    /// Regex with a required `id` group and optional `title`, `thumb`, `count`.
    #[serde(default = "default_link_pattern")]
    pub pattern: String,
    /// Record URL; `{id}` and `{origin}` are expanded.
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

impl Default for HtmlAdapterConfig {
    fn default() -> Self {
        Self {
            pattern: default_link_pattern(),
            url_template: default_url_template(),
        }
    }
}

fn default_link_pattern() -> String {
    r#"href=["'](?:https?://[^"'/]+)?/a/(?P<id>[A-Za-z0-9_-]{4,30})["']"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.max_albums, 500);
        assert_eq!(config.fetch.delay_min_secs, 2.0);
        assert_eq!(config.fetch.delay_max_secs, 4.5);
        assert!(!config.fetch.no_cache);
        assert!(!config.run.force_commit);
        assert_eq!(config.catalog.max_placeholder_ratio, 0.05);
        assert_eq!(config.catalog.path.to_str().unwrap(), "albums.json");
        assert!(config.fetch.browser.is_none());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_deserialize_source() {
        let toml = r#"
[sources.gallery]
enabled = true
adapter = "json"
url = "https://gallery.example/api/albums?page={page}"
max_pages = 5
start_tier = "session"

[sources.gallery.json]
items_path = "data.albums"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let source = &config.sources["gallery"];
        assert!(source.enabled);
        assert_eq!(source.adapter, Some(AdapterKind::Json));
        assert_eq!(source.max_pages, 5);
        assert_eq!(source.start_tier, Some(TierKind::Session));
        assert_eq!(source.json.items_path, "data.albums");
        // untouched mapping keeps its defaults
        assert_eq!(source.json.id_fields, vec!["identifier", "id", "slug"]);
        assert!(!source.stop_on_known_page);
    }

    #[test]
    fn test_source_length_floor() {
        let toml = r#"
[sources.api]
adapter = "json"

[sources.page]
adapter = "html"

[sources.strict]
adapter = "json"
acceptance = { min_content_length = 512 }
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sources["api"].min_content_length(), Some(0));
        assert_eq!(config.sources["page"].min_content_length(), None);
        assert_eq!(config.sources["strict"].min_content_length(), Some(512));
    }

    #[test]
    fn test_enabled_sources_skips_disabled() {
        let toml = r#"
[sources.a]
enabled = true
[sources.b]
enabled = false
[sources.c]
enabled = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let names: Vec<_> = config
            .enabled_sources()
            .into_iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_enabled_sources_ordered_by_priority() {
        let toml = r#"
[sources.alpha]
enabled = true
[sources.beta]
enabled = true
priority = 1
[sources.gamma]
enabled = true
priority = 1
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let names: Vec<_> = config
            .enabled_sources()
            .into_iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["beta", "gamma", "alpha"]);
    }

    #[test]
    fn test_deserialize_browser_config() {
        let toml = r#"
[fetch.browser]
url = "http://localhost:3000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let browser = config.fetch.browser.unwrap();
        assert_eq!(browser.url, "http://localhost:3000");
        assert!(browser.token.is_none());
        assert_eq!(browser.wait_ms, 3000);
    }

    #[test]
    fn test_unknown_tier_fails() {
        let toml = r#"
[sources.a]
start_tier = "telepathy"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
