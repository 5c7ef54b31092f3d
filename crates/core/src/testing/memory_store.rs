//! In-memory catalog store for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::catalog::{Catalog, CatalogError, CatalogStore};

/// Catalog store backed by memory, with switchable failures.
#[derive(Default)]
pub struct MemoryCatalogStore {
    catalog: Mutex<Catalog>,
    saves: AtomicUsize,
    corrupt: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        let store = Self::new();
        *store.catalog.lock().unwrap_or_else(|e| e.into_inner()) = catalog;
        store
    }

    /// Current stored catalog.
    pub fn stored(&self) -> Catalog {
        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every load fail with [`CatalogError::Corrupt`].
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    /// Make every save fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn load(&self) -> Result<Catalog, CatalogError> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(CatalogError::Corrupt {
                path: "memory".to_string(),
                message: "simulated corruption".to_string(),
            });
        }
        Ok(self.stored())
    }

    fn save(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CatalogError::Io {
                path: "memory".to_string(),
                message: "simulated write failure".to_string(),
            });
        }
        *self.catalog.lock().unwrap_or_else(|e| e.into_inner()) = catalog.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
