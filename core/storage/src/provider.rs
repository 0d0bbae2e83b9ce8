//! Storage provider trait definition.

use async_trait::async_trait;

use coffer_common::{Error, Result};

/// Storage provider trait for different backends.
///
/// Every backend plugged into a [`Storage`](crate::Storage) instance
/// implements this trait. The business operations have default bodies that
/// fail with [`Error::AbstractOperation`], so a provider that forgets one
/// fails loudly the first time it is called rather than silently succeeding.
///
/// Implementations must handle their own authentication, retries and
/// connection management.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory").
    fn name(&self) -> &str;

    /// Establish connections or other resources.
    ///
    /// Called once before the provider is handed to a caller. Stateless
    /// providers keep the default no-op.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources acquired by [`init`](Self::init).
    async fn exit(&self) -> Result<()> {
        Ok(())
    }

    /// Persist `file` under `filename`.
    ///
    /// # Errors
    /// - Backend-specific failures
    async fn upload(&self, file: &str, filename: &str) -> Result<()> {
        let _ = (file, filename);
        Err(Error::AbstractOperation("upload"))
    }

    /// Delete the object stored at `filename`.
    ///
    /// Whether a missing object is an error is left to the provider.
    async fn remove(&self, filename: &str) -> Result<()> {
        let _ = filename;
        Err(Error::AbstractOperation("remove"))
    }

    /// Check if `filename` is present.
    async fn exists(&self, filename: &str) -> Result<bool> {
        let _ = filename;
        Err(Error::AbstractOperation("exists"))
    }
}
