//! JSON file persistence for the catalog.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{Catalog, CatalogDocument, CatalogError, CatalogStore, PlaceholderMatcher};

/// Catalog stored as a single JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written catalog.
pub struct JsonCatalogStore {
    path: PathBuf,
    placeholders: PlaceholderMatcher,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>, placeholders: PlaceholderMatcher) -> Self {
        Self {
            path: path.into(),
            placeholders,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "catalog.json".into());
        name.push(format!(".tmp-{}", std::process::id()));
        self.path.with_file_name(name)
    }

    fn io_error(&self, err: std::io::Error) -> CatalogError {
        CatalogError::Io {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl CatalogStore for JsonCatalogStore {
    fn load(&self) -> Result<Catalog, CatalogError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No catalog file yet, starting empty");
                return Ok(Catalog::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let doc: CatalogDocument =
            serde_json::from_str(&raw).map_err(|e| CatalogError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        let stored_total = doc.meta.total;
        let (mut catalog, duplicates) = Catalog::from_records(doc.records);
        if let Some(at) = doc.meta.last_run_at {
            catalog.set_last_run_at(at);
        }
        if duplicates > 0 {
            warn!(
                path = %self.path.display(),
                duplicates,
                "Catalog file contained duplicate keys, kept first occurrence"
            );
        }
        if stored_total != catalog.len() {
            warn!(
                stored_total,
                actual = catalog.len(),
                "Stored meta.total disagrees with record count, recomputing"
            );
        }

        info!(path = %self.path.display(), records = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    fn save(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let doc = catalog.to_document(&self.placeholders);
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| CatalogError::Serialize(e.to_string()))?;

        let tmp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(e));
        }

        info!(
            path = %self.path.display(),
            total = doc.meta.total,
            placeholders = doc.meta.placeholder_count,
            "Catalog saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CandidateRecord, MergeEngine, RecordKey};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_catalog() -> Catalog {
        let candidates = ["a", "b", "c"].map(|id| CandidateRecord {
            id: id.to_string(),
            source: "gallery".to_string(),
            url: format!("https://gallery.example/a/{id}"),
            title: format!("Album {id}"),
            thumbnail: Some(format!("https://gallery.example/t/{id}.jpg")),
            file_count: 5,
            has_videos: id == "b",
            published_at: None,
        });
        let mut catalog = MergeEngine::new(10)
            .merge(&Catalog::new(), candidates, Utc::now())
            .catalog;
        catalog.set_last_run_at(Utc::now());
        catalog
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("albums.json"), PlaceholderMatcher::default());
        let catalog = store.load().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("albums.json");
        let store = JsonCatalogStore::new(&path, PlaceholderMatcher::default());

        let catalog = sample_catalog();
        store.save(&catalog).unwrap();
        assert!(path.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.get(&RecordKey::new("gallery", "b")).unwrap().has_videos);
        assert!(loaded.last_run_at().is_some());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("albums.json"), PlaceholderMatcher::default());
        store.save(&sample_catalog()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["albums.json".to_string()]);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("albums.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonCatalogStore::new(&path, PlaceholderMatcher::default());
        let err = store.load().unwrap_err();
        assert!(matches!(err, CatalogError::Corrupt { .. }));
        // the corrupt file is left for inspection
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_load_recomputes_drifted_meta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("albums.json");
        let store = JsonCatalogStore::new(&path, PlaceholderMatcher::default());
        store.save(&sample_catalog()).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        doc["meta"]["total"] = serde_json::json!(999);
        fs::write(&path, doc.to_string()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.meta(&PlaceholderMatcher::default()).total, 3);
    }
}
