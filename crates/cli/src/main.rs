use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use albumdex_core::{
    indexer::config_hash, load_config, validate_config, ConfigError, IndexError, Indexer,
    RunOutcome,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn init_tracing() {
    let json = std::env::var("ALBUMDEX_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();
}

async fn run() -> Result<()> {
    info!(version = VERSION, "albumdex starting");

    // Determine config path
    let config_path = std::env::var("ALBUMDEX_CONFIG").ok().map(PathBuf::from);
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No ALBUMDEX_CONFIG set, using defaults and environment"),
    }

    let config = load_config(config_path.as_deref()).context("Failed to load config")?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        config_hash = &config_hash(&config)[..16],
        catalog = ?config.catalog.path,
        diagnostics = ?config.diagnostics.dir,
        max_albums = config.run.max_albums,
        "Configuration loaded successfully"
    );

    let indexer = Indexer::from_config(&config).context("Failed to set up indexer")?;
    let report = indexer.run().await.context("Indexing run failed")?;

    match &report.outcome {
        RunOutcome::Rejected { reason } => {
            warn!(reason = %reason, "Catalog left unchanged");
        }
        outcome => {
            info!(
                outcome = ?outcome,
                total = report.meta.as_ref().map(|m| m.total),
                "Catalog updated"
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Configuration problems exit with 2, everything else with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    let config_error = err.downcast_ref::<ConfigError>().is_some()
        || matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Config(_)));
    if config_error {
        2
    } else {
        1
    }
}
