//! Persistent name -> blob mapping.
//!
//! The index document is shared with other tooling, so its layout is fixed:
//! `{"files": {"<name>": {"blob_id", "size", "mod_time", "expiry_epoch"}}}`.

use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Index file name under the home directory.
pub const DEFAULT_INDEX_FILE: &str = ".walrus-migrate-index.json";

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub blob_id: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    /// Last epoch the blob is paid for, 0 when unknown.
    #[serde(default)]
    pub expiry_epoch: i64,
}

/// Serialized form of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default)]
    pub files: BTreeMap<String, IndexEntry>,
}

/// Thread-safe index backed by a JSON document.
#[derive(Debug)]
pub struct LocalIndex {
    path: PathBuf,
    document: RwLock<IndexDocument>,
    // serializes writers of the backing file
    persist_lock: Mutex<()>,
}

impl LocalIndex {
    /// Empty index that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(IndexDocument::default()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Index at `path`, loaded from disk if the document exists.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let index = Self::new(path);
        index.reload();
        index
    }

    /// `~/.walrus-migrate-index.json`, or the working directory when there is no home.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_INDEX_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexDocument> {
        self.document.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexDocument> {
        self.document.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<IndexEntry> {
        self.read().files.get(name).cloned()
    }

    /// Insert or overwrite the entry for `name`.
    pub fn put(&self, name: impl Into<String>, entry: IndexEntry) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(MigrateError::Validation("index name is required".into()));
        }
        if entry.blob_id.is_empty() {
            return Err(MigrateError::Validation(format!(
                "index entry for {} has no blob id",
                name
            )));
        }
        self.write().files.insert(name, entry);
        Ok(())
    }

    /// Copy of every entry.
    pub fn list_all(&self) -> BTreeMap<String, IndexEntry> {
        self.read().files.clone()
    }

    /// First entry (by name) pointing at `blob_id`.
    pub fn find_by_blob_id(&self, blob_id: &str) -> Option<(String, IndexEntry)> {
        self.read()
            .files
            .iter()
            .find(|(_, e)| e.blob_id == blob_id)
            .map(|(name, e)| (name.clone(), e.clone()))
    }

    pub fn len(&self) -> usize {
        self.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().files.is_empty()
    }

    /// Write the index to its backing document.
    ///
    /// The document is serialized from a snapshot taken under the read lock,
    /// then written to a temp file and renamed into place.
    pub fn persist(&self) -> Result<()> {
        // snapshot and write under one guard so files land in snapshot order
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let content = {
            let document = self.read();
            serde_json::to_string_pretty(&*document).map_err(|e| {
                MigrateError::IndexPersistFailed(format!("cannot serialize index: {}", e))
            })?
        };

        write_atomic(&self.path, content.as_bytes()).map_err(|e| {
            MigrateError::IndexPersistFailed(format!("{}: {}", self.path.display(), e))
        })?;

        debug!("Persisted index to {}", self.path.display());
        Ok(())
    }

    /// Replace the in-memory index with the backing document.
    ///
    /// A missing or unreadable document leaves an empty index and never
    /// touches the file on disk.
    pub fn reload(&self) {
        let document = match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<IndexDocument>(&content) {
                Ok(mut doc) => {
                    doc.files.retain(|name, entry| {
                        let keep = !entry.blob_id.is_empty();
                        if !keep {
                            warn!("Dropping index entry {} with empty blob id", name);
                        }
                        keep
                    });
                    doc
                }
                Err(e) => {
                    warn!(
                        "Index {} is corrupt, starting empty: {}",
                        self.path.display(),
                        e
                    );
                    IndexDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexDocument::default(),
            Err(e) => {
                warn!(
                    "Cannot read index {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                IndexDocument::default()
            }
        };

        *self.write() = document;
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)
}
