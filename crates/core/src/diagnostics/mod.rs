//! Run diagnostics: `summary.json`, failed-fetch artifacts, the recheck
//! queue and a metrics dump.

mod types;
mod writer;

pub use types::*;
pub use writer::{DiagnosticsWriter, RecheckEntry, METRICS_FILE, RECHECK_FILE, SUMMARY_FILE};
