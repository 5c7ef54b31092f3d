use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "albumdex.toml";

/// Load configuration from an optional TOML file with environment overrides.
///
/// An explicit `path` must exist. Without one, `albumdex.toml` in the working
/// directory is used if present, otherwise every value comes from defaults and
/// the environment.
///
/// Environment layering (later wins):
/// - `ALBUMDEX_<SECTION>__<KEY>` for any nested key
/// - the flat operator keys `MAX_ALBUMS`, `DELAY_MIN`, `DELAY_MAX`,
///   `DEBUG_NO_CACHE`, `FORCE_COMMIT` and `ENABLE_<SOURCE>`
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            }
            Some(path.to_path_buf())
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };

    let mut figment = Figment::new();
    if let Some(file) = &file {
        figment = figment.merge(Toml::file(file));
    }

    let sources = declared_sources(&figment);

    let config: Config = figment
        .merge(Env::prefixed("ALBUMDEX_").split("__"))
        .merge(operator_env(sources))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Source tags declared in the file layer.
///
/// `ENABLE_<SOURCE>` only toggles sources that exist here, so unrelated
/// `ENABLE_*` variables in the environment are left alone.
fn declared_sources(figment: &Figment) -> Vec<String> {
    figment
        .find_value("sources")
        .ok()
        .and_then(|value| value.into_dict())
        .map(|dict| dict.into_keys().collect())
        .unwrap_or_default()
}

fn operator_env(sources: Vec<String>) -> Env {
    Env::raw().filter_map(move |key| {
        let key = key.as_str().to_ascii_lowercase();
        let mapped = match key.as_str() {
            "max_albums" => "run.max_albums".to_string(),
            "force_commit" => "run.force_commit".to_string(),
            "delay_min" => "fetch.delay_min_secs".to_string(),
            "delay_max" => "fetch.delay_max_secs".to_string(),
            "debug_no_cache" => "fetch.no_cache".to_string(),
            other => {
                let name = other.strip_prefix("enable_")?;
                let source = sources.iter().find(|s| s.eq_ignore_ascii_case(name))?;
                format!("sources.{source}.enabled")
            }
        };
        Some(mapped.into())
    })
}
