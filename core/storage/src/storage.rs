//! Storage facade: named instances, lazy provider construction and hooks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use coffer_common::{Error, Result};
use crate::client::StorageClient;
use crate::hooks::{Hook, Operation, Phase};
use crate::registry::{create_default_registry, ProviderRegistry};

/// Setting naming the instance used when callers omit a name.
pub const DEFAULT_INSTANCE: &str = "default instance";

/// Setting bounding every intercepted call, in milliseconds.
pub const OPERATION_TIMEOUT: &str = "operation timeout";

/// Key of the provider selector inside an instance configuration record.
pub const PROVIDER_KEY: &str = "provider";

/// Declarative configuration for a [`Storage`] facade.
///
/// ```json
/// {
///   "instances": { "custom": { "provider": "memory", "database": "test" } },
///   "settings": { "default instance": "custom" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Instance name to configuration record.
    #[serde(default)]
    pub instances: BTreeMap<String, Value>,
    /// Process-wide settings.
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl StorageConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance record.
    pub fn with_instance(mut self, name: impl Into<String>, config: Value) -> Self {
        self.instances.insert(name.into(), config);
        self
    }

    /// Add a setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Coordination point for storage instances.
///
/// Holds the configuration table, the settings table and the instance
/// cache. Each configured instance is constructed on first use and then
/// cached until [`exit`](Self::exit); the cache lock is held across
/// construction so concurrent first access builds one client only.
///
/// Configuration mistakes (unknown instance, missing provider, no default
/// instance) are returned synchronously. Provider and hook failures are
/// returned from the async part of a call.
pub struct Storage {
    providers: ProviderRegistry,
    config: RwLock<BTreeMap<String, Value>>,
    settings: RwLock<BTreeMap<String, Value>>,
    cache: Mutex<BTreeMap<String, Arc<StorageClient>>>,
}

impl Storage {
    /// Create a facade with no instances configured.
    pub fn new(providers: ProviderRegistry) -> Self {
        Self::with_config(providers, StorageConfig::default())
    }

    /// Create a facade with initial configuration.
    pub fn with_config(providers: ProviderRegistry, config: StorageConfig) -> Self {
        Self {
            providers,
            config: RwLock::new(config.instances),
            settings: RwLock::new(config.settings),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// The provider factories available to instance configuration.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Replace the whole configuration table.
    ///
    /// Instances already cached keep their client.
    pub fn init<K>(&self, instances: impl IntoIterator<Item = (K, Value)>) -> &Self
    where
        K: Into<String>,
    {
        let table: BTreeMap<String, Value> = instances
            .into_iter()
            .map(|(name, config)| (name.into(), config))
            .collect();
        debug!(instances = table.len(), "Configuration replaced");
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = table;
        self
    }

    /// Insert or overwrite the configuration of one instance.
    pub fn add(&self, name: impl Into<String>, config: Value) -> &Self {
        let name = name.into();
        debug!(instance = %name, "Instance configured");
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, config);
        self
    }

    /// Set one setting.
    pub fn settings(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        self
    }

    /// Read one setting.
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Names of configured instances, sorted.
    pub fn instances(&self) -> Vec<String> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Names of instances with a live client, sorted.
    pub fn cached(&self) -> Vec<String> {
        self.lock_cache().keys().cloned().collect()
    }

    /// Resolve an instance and initialize its provider.
    ///
    /// With `None` the `default instance` setting is used. Configuration
    /// errors are returned immediately and nothing is awaited; the
    /// returned future fails only if the provider's `init` does.
    ///
    /// # Errors
    /// - `NoDefaultInstance` if no name is given and no default is set
    /// - `MissingConfiguration` / `MissingProvider` / `UnknownProvider`
    pub fn get(
        &self,
        instance: Option<&str>,
    ) -> Result<BoxFuture<'static, Result<Arc<StorageClient>>>> {
        let name = self.instance_name(instance)?;
        let client = self.resolve(&name)?;

        Ok(async move {
            client.ensure_init().await?;
            Ok(client)
        }
        .boxed())
    }

    /// Resolve and initialize an instance in one step.
    pub async fn client(&self, instance: Option<&str>) -> Result<Arc<StorageClient>> {
        self.get(instance)?.await
    }

    /// Register a hook that runs before `operation`.
    ///
    /// With `None` the hook is attached to every instance configured at
    /// the time of the call. Instances added later do not receive it.
    pub fn pre(&self, instance: Option<&str>, operation: Operation, hook: Hook) -> Result<&Self> {
        self.register(Phase::Pre, instance, operation, hook)
    }

    /// Register a hook that runs after `operation` succeeds.
    ///
    /// See [`pre`](Self::pre) for how `None` is handled.
    pub fn post(&self, instance: Option<&str>, operation: Operation, hook: Hook) -> Result<&Self> {
        self.register(Phase::Post, instance, operation, hook)
    }

    fn register(
        &self,
        phase: Phase,
        instance: Option<&str>,
        operation: Operation,
        hook: Hook,
    ) -> Result<&Self> {
        let targets = match instance {
            Some(name) => vec![self.resolve(name)?],
            None => {
                let names = self.instances();
                info!(?phase, %operation, instances = names.len(), "Registering generic hook");
                names
                    .iter()
                    .map(|name| self.resolve(name))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        for client in targets {
            client.add_hook(phase, operation, hook.clone());
        }

        Ok(self)
    }

    /// Tear down every cached instance.
    ///
    /// All providers' `exit` run concurrently and every one is awaited,
    /// even after a failure. The cache is emptied; the first failure in
    /// instance-name order is returned.
    pub async fn exit(&self) -> Result<()> {
        let clients: Vec<Arc<StorageClient>> =
            std::mem::take(&mut *self.lock_cache()).into_values().collect();

        info!(instances = clients.len(), "Tearing down storage instances");

        let results = join_all(clients.iter().map(|client| client.shutdown())).await;

        let mut first_error = None;
        for (client, result) in clients.iter().zip(results) {
            if let Err(err) = result {
                warn!(instance = client.instance(), error = %err, "Teardown failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn instance_name(&self, instance: Option<&str>) -> Result<String> {
        if let Some(name) = instance {
            return Ok(name.to_string());
        }

        match self.setting(DEFAULT_INSTANCE) {
            None | Some(Value::Null) => Err(Error::NoDefaultInstance),
            Some(Value::String(name)) if !name.is_empty() => Ok(name),
            Some(Value::String(_)) => Err(Error::NoDefaultInstance),
            Some(other) => Err(Error::InvalidConfiguration(format!(
                "'{}' must be a string, got {}",
                DEFAULT_INSTANCE, other
            ))),
        }
    }

    fn operation_timeout(&self) -> Result<Option<Duration>> {
        match self.setting(OPERATION_TIMEOUT) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(|ms| Some(Duration::from_millis(ms))).ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "'{}' must be a number of milliseconds, got {}",
                    OPERATION_TIMEOUT, value
                ))
            }),
        }
    }

    /// Return the cached client for `name`, constructing it on first use.
    fn resolve(&self, name: &str) -> Result<Arc<StorageClient>> {
        let mut cache = self.lock_cache();

        if let Some(client) = cache.get(name) {
            return Ok(client.clone());
        }

        let record = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingConfiguration(name.to_string()))?;

        // Every setup check runs before the factory so a rejected record builds nothing.
        let (selector, options) = split_provider(name, record)?;
        let timeout = self.operation_timeout()?;
        let provider = self.providers.create(&selector, options)?;
        let client = Arc::new(StorageClient::new(name, provider).with_timeout(timeout));

        cache.insert(name.to_string(), client.clone());
        info!(instance = name, provider = %selector, "Storage instance created");

        Ok(client)
    }

    fn lock_cache(&self) -> MutexGuard<'_, BTreeMap<String, Arc<StorageClient>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(create_default_registry())
    }
}

/// Split a configuration record into its provider selector and the options
/// handed to the provider.
fn split_provider(name: &str, record: Value) -> Result<(String, Value)> {
    let mut options: Map<String, Value> = match record {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidConfiguration(format!(
                "Configuration for {} must be an object, got {}",
                name, other
            )))
        }
    };

    match options.remove(PROVIDER_KEY) {
        None | Some(Value::Null) => Err(Error::MissingProvider(name.to_string())),
        Some(Value::String(selector)) => Ok((selector, Value::Object(options))),
        Some(other) => Err(Error::InvalidConfiguration(format!(
            "Provider for {} must be a string, got {}",
            name, other
        ))),
    }
}
