//! Provider registry for resolving provider selectors to implementations.

use std::collections::HashMap;
use std::sync::Arc;
use serde_json::Value;

use coffer_common::{Error, Result};
use crate::provider::StorageProvider;

/// Factory function type for creating providers.
///
/// Receives the instance configuration with the `provider` key removed.
pub type ProviderFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Registry for storage provider factories.
///
/// Maps the `provider` selector found in instance configuration to the
/// factory that builds the backend.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ProviderFactory,
    ) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build a provider from its selector and options.
    ///
    /// # Errors
    /// - Provider not registered
    /// - Options rejected by the factory
    pub fn create(&self, name: &str, options: Value) -> Result<Arc<dyn StorageProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        factory(options)
    }

    /// Get list of registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in providers.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    // In-memory provider (for testing and demos)
    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_options| Ok(Arc::new(crate::memory::MemoryProvider::new()))),
    );

    registry
}
