//! Document-store collaborator: records keyed by id that survive restarts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Store(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document store is not connected")]
    Disconnected,
}

#[async_trait]
pub trait DocumentStore<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Inserts or replaces the record stored under `id`.
    async fn upsert(&self, id: &str, record: &T) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Returns `true` when a record was removed.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;

    fn is_connected(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct SledStoreConfig {
    pub path: Option<PathBuf>,
    pub tree_name: Option<String>,
    pub temporary: bool,
}

/// One sled tree per record kind, JSON-encoded values keyed by id.
#[derive(Clone)]
pub struct SledDocumentStore {
    tree: sled::Tree,
}

impl SledDocumentStore {
    pub fn open(config: SledStoreConfig) -> Result<Self, StoreError> {
        let mut builder = sled::Config::new();
        if let Some(path) = config.path.as_ref() {
            builder = builder.path(path);
        }
        if config.temporary {
            builder = builder.temporary(true);
        }
        let db = builder.open()?;
        let tree = match config.tree_name {
            Some(name) => db.open_tree(name)?,
            None => db.open_tree("greenlit")?,
        };
        Ok(Self { tree })
    }

    pub fn from_tree(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[async_trait]
impl<T> DocumentStore<T> for SledDocumentStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn upsert(&self, id: &str, record: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(id.as_bytes(), bytes)?;
        self.tree.flush()?;
        debug!(id, "upserted document");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.tree.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.tree.remove(id.as_bytes())?.is_some();
        if removed {
            self.tree.flush()?;
        }
        Ok(removed)
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug)]
pub struct MemoryDocumentStore<T> {
    records: RwLock<HashMap<String, T>>,
    connected: AtomicBool,
}

impl<T> MemoryDocumentStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

impl<T> Default for MemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> DocumentStore<T> for MemoryDocumentStore<T>
where
    T: Clone + Send + Sync,
{
    async fn upsert(&self, id: &str, record: &T) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut guard = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.ensure_connected()?;
        let guard = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.get(id).cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        let mut guard = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.remove(id).is_some())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
