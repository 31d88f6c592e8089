//! The shared set of files known to be present on the server.
//!
//! The server recomputes the catalog from the share directory after
//! every catalog-changing operation and broadcasts the full set.
//! Clients replace their cached copy wholesale; there is no diffing
//! because the catalog drives a listing, not connection lifecycle.

use crate::error::CoreError;
use crate::path::resolve_under_root;
use parking_lot::Mutex;
use peerlink_protocol::FileEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Filesystem-backed catalog owned by the server.
#[derive(Debug)]
pub struct CatalogStore {
    root: PathBuf,
    files: Mutex<HashSet<FileEntry>>,
}

impl CatalogStore {
    /// Creates a store over `root`, scanning it once.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let store = Self {
            root: root.into(),
            files: Mutex::new(HashSet::new()),
        };
        store.rescan()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recomputes the catalog from the share directory and returns the
    /// fresh snapshot. Entries are derived, never cached across a
    /// directory mutation.
    pub fn rescan(&self) -> Result<Vec<FileEntry>, CoreError> {
        let mut entries = HashSet::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let metadata = dir_entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = match dir_entry.file_name().into_string() {
                Ok(name) => name,
                // Non-UTF-8 names cannot travel in a JSON catalog.
                Err(_) => continue,
            };
            entries.insert(FileEntry::new(name, metadata.len()));
        }

        let snapshot: Vec<FileEntry> = entries.iter().cloned().collect();
        *self.files.lock() = entries;
        Ok(snapshot)
    }

    /// Returns a consistent copy of the current catalog.
    pub fn snapshot(&self) -> Vec<FileEntry> {
        self.files.lock().iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().iter().any(|entry| entry.name == name)
    }

    /// Resolves a catalog file name to its on-disk path.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, CoreError> {
        resolve_under_root(&self.root, name)
    }

    /// Deletes a file and recomputes the catalog. The filesystem is
    /// untouched when the name fails containment.
    pub fn delete(&self, name: &str) -> Result<Vec<FileEntry>, CoreError> {
        let path = self.resolve(name)?;
        std::fs::remove_file(path)?;
        self.rescan()
    }
}

/// Client-side catalog cache, replaced wholesale on every broadcast.
#[derive(Debug, Default)]
pub struct CatalogCache {
    files: Mutex<HashSet<FileEntry>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts a received snapshot. Callers that fail to decode a
    /// payload skip this call, keeping the previous cache instead of a
    /// partial result.
    pub fn replace(&self, entries: Vec<FileEntry>) {
        *self.files.lock() = entries.into_iter().collect();
    }

    pub fn snapshot(&self) -> Vec<FileEntry> {
        self.files.lock().iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().iter().any(|entry| entry.name == name)
    }
}
