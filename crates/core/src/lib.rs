pub mod adapter;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod fetcher;
pub mod harvest;
pub mod indexer;
pub mod metrics;
pub mod testing;

pub use adapter::{build_adapter, PageContext, ParseError, SourceAdapter};
pub use catalog::{
    Catalog, CatalogError, CatalogStore, CommitDecision, CommitGuard, JsonCatalogStore,
    MergeEngine, PlaceholderMatcher, Record, RecordKey,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DEFAULT_CONFIG_FILE,
};
pub use diagnostics::{DiagnosticsWriter, RunOutcome, RunReport, SourceReport, SourceStatus};
pub use fetcher::{FetchController, FetchError, FetchHints, FetchTier, Fetched, TierKind};
pub use harvest::{Harvester, RegisteredSource, SourcePlan};
pub use indexer::{IndexError, Indexer};
