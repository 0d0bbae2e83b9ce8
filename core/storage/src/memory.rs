//! In-memory storage provider for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use coffer_common::{Error, Result};
use crate::provider::StorageProvider;

/// In-memory storage entry.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Source the object was uploaded from.
    pub source: String,
    /// Time of the upload.
    pub uploaded_at: DateTime<Utc>,
}

/// In-memory storage provider.
///
/// Useful for testing and development. Objects are kept in memory and
/// lost on drop. Lifecycle calls are counted so tests can observe them.
pub struct MemoryProvider {
    storage: Arc<RwLock<HashMap<String, StoredObject>>>,
    inits: AtomicUsize,
    exits: AtomicUsize,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            inits: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
        }
    }

    /// Look up a stored object.
    pub fn object(&self, filename: &str) -> Option<StoredObject> {
        self.storage
            .read()
            .ok()
            .and_then(|storage| storage.get(filename).cloned())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times `init` ran.
    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Number of times `exit` ran.
    pub fn exit_count(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    fn poisoned() -> Error {
        Error::Storage("memory storage lock poisoned".to_string())
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn init(&self) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exit(&self) -> Result<()> {
        self.exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload(&self, file: &str, filename: &str) -> Result<()> {
        if filename.is_empty() {
            return Err(Error::Storage("Filename cannot be empty".to_string()));
        }

        let object = StoredObject {
            source: file.to_string(),
            uploaded_at: Utc::now(),
        };

        self.storage
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(filename.to_string(), object);

        Ok(())
    }

    async fn remove(&self, filename: &str) -> Result<()> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        match storage.remove(filename) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("File not found: {}", filename))),
        }
    }

    async fn exists(&self, filename: &str) -> Result<bool> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        Ok(storage.contains_key(filename))
    }
}
