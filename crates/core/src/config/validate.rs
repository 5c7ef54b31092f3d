use url::Url;

use super::{
    types::{AdapterKind, Config, SourceConfig},
    ConfigError,
};
use crate::fetcher::TierKind;

/// Validate configuration
///
/// Runs before any network I/O; every error here is fatal at startup.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fetch = &config.fetch;

    if !(fetch.delay_min_secs.is_finite() && fetch.delay_max_secs.is_finite()) {
        return Err(invalid("fetch delays must be finite numbers"));
    }
    if fetch.delay_min_secs < 0.0 || fetch.delay_max_secs < 0.0 {
        return Err(invalid("fetch delays cannot be negative"));
    }
    if fetch.delay_min_secs > fetch.delay_max_secs {
        return Err(invalid(format!(
            "fetch.delay_min_secs ({}) is greater than fetch.delay_max_secs ({})",
            fetch.delay_min_secs, fetch.delay_max_secs
        )));
    }
    if fetch.retry.max_attempts == 0 {
        return Err(invalid("fetch.retry.max_attempts must be at least 1"));
    }
    if fetch.request_timeout_secs == 0 {
        return Err(invalid("fetch.request_timeout_secs cannot be 0"));
    }
    if let Some(browser) = &fetch.browser {
        Url::parse(&browser.url)
            .map_err(|e| invalid(format!("fetch.browser.url is not a valid URL: {e}")))?;
    }

    if config.run.max_parallel_sources == 0 {
        return Err(invalid("run.max_parallel_sources cannot be 0"));
    }
    if config.run.timeout_secs == 0 {
        return Err(invalid("run.timeout_secs cannot be 0"));
    }

    let ratio = config.catalog.max_placeholder_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(invalid(format!(
            "catalog.max_placeholder_ratio must be in (0, 1], got {ratio}"
        )));
    }

    for (name, source) in &config.sources {
        validate_source_name(name)?;
        if source.enabled {
            validate_source(name, source, fetch.browser.is_some())?;
        }
    }

    Ok(())
}

fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(invalid(format!(
            "source name {name:?} must be lowercase letters, digits, '_' or '-'"
        )))
    }
}

fn validate_source(
    name: &str,
    source: &SourceConfig,
    browser_configured: bool,
) -> Result<(), ConfigError> {
    let adapter = source
        .adapter
        .ok_or_else(|| invalid(format!("sources.{name}.adapter is required")))?;

    if source.url.is_empty() {
        return Err(invalid(format!("sources.{name}.url is required")));
    }
    let first_page = source.url.replace("{page}", "1");
    let parsed = Url::parse(&first_page)
        .map_err(|e| invalid(format!("sources.{name}.url is not a valid URL: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid(format!(
            "sources.{name}.url must be http or https, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(invalid(format!("sources.{name}.url has no host")));
    }

    if source.max_pages == 0 {
        return Err(invalid(format!("sources.{name}.max_pages cannot be 0")));
    }

    if source.start_tier == Some(TierKind::Browser) && !browser_configured {
        return Err(invalid(format!(
            "sources.{name}.start_tier is \"browser\" but [fetch.browser] is not configured"
        )));
    }

    if adapter == AdapterKind::Html {
        let re = regex_lite::Regex::new(&source.html.pattern)
            .map_err(|e| invalid(format!("sources.{name}.html.pattern is invalid: {e}")))?;
        if !re.capture_names().flatten().any(|n| n == "id") {
            return Err(invalid(format!(
                "sources.{name}.html.pattern needs a named group `id`"
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
