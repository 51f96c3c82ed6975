//! Key-value access to work-item records, keyed by slug.

use crate::error::{PackopsError, Result};
use crate::record::WorkItem;
use fs2::FileExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Read-modify-write access to the catalog.
///
/// `update` hands the mutator the freshly stored record and writes back
/// whatever it returns; implementations serialize concurrent updates so no
/// writer observes a stale record.
pub trait RecordStore: Send + Sync {
    fn get(&self, slug: &str) -> Result<WorkItem>;

    fn update(
        &self,
        slug: &str,
        mutator: &mut dyn FnMut(WorkItem) -> Result<WorkItem>,
    ) -> Result<WorkItem>;

    fn slugs(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// JsonCatalog
// ---------------------------------------------------------------------------

/// A catalog stored as one JSON array of records.
///
/// Writers take an exclusive advisory lock on `<catalog>.lock` (covering
/// other processes) and an in-process mutex (covering threads sharing this
/// handle), re-read the file under the lock, and replace it atomically.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn load_all(&self) -> Result<Vec<WorkItem>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PackopsError::CatalogMissing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_str(&data)
            .map_err(|e| PackopsError::MalformedCatalog(format!("{}: {e}", self.path.display())))?;
        let Value::Array(items) = value else {
            return Err(PackopsError::MalformedCatalog(format!(
                "{}: top level must be an array",
                self.path.display()
            )));
        };
        items.into_iter().map(WorkItem::from_value).collect()
    }

    fn save_all(&self, items: &[WorkItem]) -> Result<()> {
        crate::io::write_json_pretty(&self.path, items)
    }
}

fn position(items: &[WorkItem], slug: &str) -> Option<usize> {
    items.iter().position(|w| w.slug() == Some(slug))
}

impl RecordStore for JsonCatalog {
    fn get(&self, slug: &str) -> Result<WorkItem> {
        let items = self.load_all()?;
        position(&items, slug)
            .map(|i| items[i].clone())
            .ok_or_else(|| PackopsError::WorkItemNotFound(slug.to_string()))
    }

    fn update(
        &self,
        slug: &str,
        mutator: &mut dyn FnMut(WorkItem) -> Result<WorkItem>,
    ) -> Result<WorkItem> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());

        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let result = (|| -> Result<WorkItem> {
            let mut items = self.load_all()?;
            let idx = position(&items, slug)
                .ok_or_else(|| PackopsError::WorkItemNotFound(slug.to_string()))?;
            let updated = mutator(items[idx].clone())?;
            items[idx] = updated.clone();
            self.save_all(&items)?;
            debug!(slug, catalog = %self.path.display(), "record updated");
            Ok(updated)
        })();

        lock_file.unlock()?;
        result
    }

    fn slugs(&self) -> Result<Vec<String>> {
        Ok(self
            .load_all()?
            .iter()
            .filter_map(|w| w.slug().map(str::to_string))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

/// In-memory store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: Mutex<Vec<WorkItem>>,
}

impl MemoryCatalog {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RecordStore for MemoryCatalog {
    fn get(&self, slug: &str) -> Result<WorkItem> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        position(&items, slug)
            .map(|i| items[i].clone())
            .ok_or_else(|| PackopsError::WorkItemNotFound(slug.to_string()))
    }

    fn update(
        &self,
        slug: &str,
        mutator: &mut dyn FnMut(WorkItem) -> Result<WorkItem>,
    ) -> Result<WorkItem> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let idx = position(&items, slug)
            .ok_or_else(|| PackopsError::WorkItemNotFound(slug.to_string()))?;
        let updated = mutator(items[idx].clone())?;
        items[idx] = updated.clone();
        Ok(updated)
    }

    fn slugs(&self) -> Result<Vec<String>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items
            .iter()
            .filter_map(|w| w.slug().map(str::to_string))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
