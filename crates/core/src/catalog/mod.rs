//! Album catalog - the only state that survives between runs.
//!
//! Harvested candidates are merged into the previous catalog, the result is
//! checked by the [`CommitGuard`], and only an accepted catalog replaces the
//! one on disk.

mod guard;
mod merge;
mod placeholder;
mod store;
mod types;

pub use guard::{CommitDecision, CommitGuard, GuardViolation};
pub use merge::{MergeEngine, MergeOutcome, MergeStats};
pub use placeholder::PlaceholderMatcher;
pub use store::JsonCatalogStore;
pub use types::*;

/// Trait for catalog persistence.
pub trait CatalogStore: Send + Sync {
    /// Load the persisted catalog.
    ///
    /// A store that has never been written loads as an empty catalog. An
    /// unreadable or malformed store is an error; it is never treated as empty.
    fn load(&self) -> Result<Catalog, CatalogError>;

    /// Replace the persisted catalog atomically.
    fn save(&self, catalog: &Catalog) -> Result<(), CatalogError>;
}
