//! Persistence for the usage document.
//!
//! The store only knows how to read and write the whole document. It does no
//! locking; callers serialize Load→mutate→Save sequences (see
//! [`crate::ledger::UsageLedger`]).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::models::UsageDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    /// File exists but does not hold a valid usage document
    #[error("usage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on usage file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize usage document: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Blocking store task panicked or was cancelled
    #[error("usage store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Whole-document load/save contract
pub trait UsageStore: Send + Sync {
    /// Read the current document, or the store's default when nothing has been
    /// persisted yet.
    fn load(&self) -> Result<UsageDocument, StoreError>;

    /// Replace the persisted document in full.
    fn save(&self, doc: &UsageDocument) -> Result<(), StoreError>;

    /// Whether a document has been persisted
    fn exists(&self) -> bool;
}

/// JSON file on disk, pretty-printed with two-space indentation
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    defaults: UsageDocument,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, defaults: UsageDocument) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the default document if the file does not exist yet.
    ///
    /// Returns true when a new file was created.
    pub fn bootstrap(&self) -> Result<bool, StoreError> {
        if self.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.save(&self.defaults)?;
        Ok(true)
    }
}

impl UsageStore for FileStore {
    fn load(&self) -> Result<UsageDocument, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "usage file absent, using defaults");
                return Ok(self.defaults.clone());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, doc: &UsageDocument) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(doc)?;
        std::fs::write(&self.path, body).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    defaults: UsageDocument,
    doc: Mutex<Option<UsageDocument>>,
}

impl MemoryStore {
    pub fn new(defaults: UsageDocument) -> Self {
        Self {
            defaults,
            doc: Mutex::new(None),
        }
    }

    /// Store pre-seeded with a persisted document
    pub fn with_document(doc: UsageDocument) -> Self {
        Self {
            defaults: UsageDocument::default(),
            doc: Mutex::new(Some(doc)),
        }
    }
}

impl UsageStore for MemoryStore {
    fn load(&self) -> Result<UsageDocument, StoreError> {
        let guard = self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.clone().unwrap_or_else(|| self.defaults.clone()))
    }

    fn save(&self, doc: &UsageDocument) -> Result<(), StoreError> {
        let mut guard = self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(doc.clone());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.doc
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
