use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use super::{DiagnosticsError, RunReport};
use crate::catalog::{Catalog, PlaceholderMatcher};
use crate::config::DiagnosticsConfig;
use crate::metrics;

pub const SUMMARY_FILE: &str = "summary.json";
pub const RECHECK_FILE: &str = "recheck.json";
pub const METRICS_FILE: &str = "metrics.prom";

/// Entry in the recheck queue.
#[derive(Debug, Clone, Serialize)]
pub struct RecheckEntry {
    pub source: String,
    pub id: String,
    pub url: String,
    pub title: String,
    /// "placeholder_title" or "no_files"
    pub reason: &'static str,
}

/// Writes run diagnostics under one directory.
pub struct DiagnosticsWriter {
    dir: PathBuf,
    save_artifacts: bool,
    max_artifact_bytes: usize,
    seq: AtomicU32,
}

impl DiagnosticsWriter {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            save_artifacts: config.save_artifacts,
            max_artifact_bytes: config.max_artifact_bytes,
            seq: AtomicU32::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the body of a failed fetch as `<dir>/<source>/<seq>-<slug>.html`.
    ///
    /// Returns `None` when artifacts are disabled.
    pub fn save_artifact(
        &self,
        source: &str,
        url: &str,
        body: &str,
    ) -> Result<Option<PathBuf>, DiagnosticsError> {
        if !self.save_artifacts {
            return Ok(None);
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let dir = self.dir.join(source);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let path = dir.join(format!("{seq:04}-{}.html", slug(url)));
        let body = truncate(body, self.max_artifact_bytes);
        fs::write(&path, body).map_err(|e| io_error(&path, e))?;
        debug!(source, url, path = %path.display(), "Saved fetch artifact");
        Ok(Some(path))
    }

    pub fn write_summary(&self, report: &RunReport) -> Result<PathBuf, DiagnosticsError> {
        self.write_json(SUMMARY_FILE, report)
    }

    /// Queue records worth a second look: placeholder titles and albums with
    /// no files. Returns how many were queued.
    pub fn write_recheck(
        &self,
        catalog: &Catalog,
        placeholders: &PlaceholderMatcher,
    ) -> Result<usize, DiagnosticsError> {
        let entries: Vec<RecheckEntry> = catalog
            .records()
            .filter_map(|r| {
                let reason = if placeholders.is_placeholder(&r.title) {
                    "placeholder_title"
                } else if r.file_count == 0 {
                    "no_files"
                } else {
                    return None;
                };
                Some(RecheckEntry {
                    source: r.source.clone(),
                    id: r.id.clone(),
                    url: r.url.clone(),
                    title: r.title.clone(),
                    reason,
                })
            })
            .collect();
        self.write_json(RECHECK_FILE, &entries)?;
        Ok(entries.len())
    }

    /// Dump the core metrics in the Prometheus text format.
    pub fn write_metrics(&self) -> Result<PathBuf, DiagnosticsError> {
        let text = metrics::render().map_err(|e| DiagnosticsError::Serialize(e.to_string()))?;
        self.write_file(METRICS_FILE, text.as_bytes())
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, DiagnosticsError> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| DiagnosticsError::Serialize(e.to_string()))?;
        self.write_file(name, &json)
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf, DiagnosticsError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> DiagnosticsError {
    DiagnosticsError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Filesystem-safe name derived from the URL path and query.
fn slug(url: &str) -> String {
    let tail = url::Url::parse(url)
        .map(|u| {
            let mut tail = u.path().to_string();
            if let Some(q) = u.query() {
                tail.push('-');
                tail.push_str(q);
            }
            tail
        })
        .unwrap_or_else(|_| url.to_string());

    let mut slug = String::with_capacity(tail.len());
    for c in tail.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(80).collect();
    if slug.is_empty() {
        "index".to_string()
    } else {
        slug
    }
}

fn truncate(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
