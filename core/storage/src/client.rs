//! Storage client: a provider wrapped in its hook pipeline.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use coffer_common::{Error, Result};
use crate::hooks::{Hook, HookContext, HookRegistry, Operation, Phase};
use crate::provider::StorageProvider;

/// A live provider for one named instance.
///
/// Every business operation goes through the same pipeline: the `Pre`
/// hooks for the operation in registration order, the provider call, then
/// the `Post` hooks. The first error anywhere ends the chain and is
/// returned to the caller.
pub struct StorageClient {
    instance: String,
    provider: Arc<dyn StorageProvider>,
    hooks: RwLock<HookRegistry>,
    initialized: OnceCell<()>,
    timeout: Option<Duration>,
}

impl StorageClient {
    /// Wrap a provider for the named instance.
    pub fn new(instance: impl Into<String>, provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            instance: instance.into(),
            provider,
            hooks: RwLock::new(HookRegistry::new()),
            initialized: OnceCell::new(),
            timeout: None,
        }
    }

    /// Bound every intercepted call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the instance this client serves.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Whether the provider's `init` has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Register a hook that runs before `operation`.
    pub fn pre(&self, operation: Operation, hook: Hook) {
        self.add_hook(Phase::Pre, operation, hook);
    }

    /// Register a hook that runs after a successful `operation`.
    pub fn post(&self, operation: Operation, hook: Hook) {
        self.add_hook(Phase::Post, operation, hook);
    }

    pub(crate) fn add_hook(&self, phase: Phase, operation: Operation, hook: Hook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(phase, operation, hook);
        debug!(instance = %self.instance, ?phase, %operation, "Hook registered");
    }

    /// Number of hooks registered for `(phase, operation)`.
    pub fn hook_count(&self, phase: Phase, operation: Operation) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count(phase, operation)
    }

    /// Run the provider's `init` once.
    ///
    /// A failed init leaves the client uninitialized; the next call tries again.
    pub(crate) async fn ensure_init(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                debug!(instance = %self.instance, provider = self.provider.name(), "Initializing provider");
                self.provider.init().await
            })
            .await
            .map(|_| ())
    }

    /// Run the provider's `exit`.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        debug!(instance = %self.instance, "Shutting down provider");
        self.provider.exit().await
    }

    /// Upload `file` as `filename`.
    pub async fn upload(&self, file: &str, filename: &str) -> Result<()> {
        let ctx = self.context(Operation::Upload, Some(file), filename);
        self.intercept(ctx, self.provider.upload(file, filename)).await
    }

    /// Remove `filename`.
    pub async fn remove(&self, filename: &str) -> Result<()> {
        let ctx = self.context(Operation::Remove, None, filename);
        self.intercept(ctx, self.provider.remove(filename)).await
    }

    /// Check whether `filename` exists.
    pub async fn exists(&self, filename: &str) -> Result<bool> {
        let ctx = self.context(Operation::Exists, None, filename);
        self.intercept(ctx, self.provider.exists(filename)).await
    }

    fn context(&self, operation: Operation, file: Option<&str>, filename: &str) -> HookContext {
        HookContext {
            instance: self.instance.clone(),
            operation,
            file: file.map(String::from),
            filename: filename.to_string(),
        }
    }

    async fn intercept<T, Fut>(&self, ctx: HookContext, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let chain = self.run_chain(ctx.clone(), call);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, chain).await.map_err(|_| {
                warn!(instance = %ctx.instance, operation = %ctx.operation, "Operation timed out");
                Error::Timeout {
                    instance: ctx.instance,
                    operation: ctx.operation.to_string(),
                    elapsed: limit,
                }
            })?,
            None => chain.await,
        }
    }

    async fn run_chain<T, Fut>(&self, ctx: HookContext, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let operation = ctx.operation;
        let (pre, post) = {
            let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
            (
                hooks.hooks(Phase::Pre, operation),
                hooks.hooks(Phase::Post, operation),
            )
        };

        for hook in pre {
            if let Err(err) = hook(ctx.clone()).await {
                debug!(instance = %ctx.instance, %operation, error = %err, "Pre hook aborted call");
                return Err(err);
            }
        }

        // Not polled until every pre hook has passed.
        let output = call.await?;

        for hook in post {
            if let Err(err) = hook(ctx.clone()).await {
                debug!(instance = %ctx.instance, %operation, error = %err, "Post hook aborted chain");
                return Err(err);
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::hook;
    use crate::testing::{event_log, events, EventLog, RecordingProvider};
    use std::sync::atomic::Ordering;

    fn recording_hook(log: &EventLog, label: &'static str) -> Hook {
        let log = log.clone();
        hook(move |_ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label.to_string());
                Ok(())
            }
        })
    }

    fn client(log: &EventLog) -> StorageClient {
        StorageClient::new("custom", Arc::new(RecordingProvider::new(log.clone())))
    }

    #[tokio::test]
    async fn test_pre_and_post_wrap_the_call() {
        let log = event_log();
        let client = client(&log);

        client.pre(Operation::Upload, recording_hook(&log, "pre 1"));
        client.pre(Operation::Upload, recording_hook(&log, "pre 2"));
        client.post(Operation::Upload, recording_hook(&log, "post 1"));
        client.post(Operation::Upload, recording_hook(&log, "post 2"));

        client.upload("a.txt", "b.txt").await.unwrap();

        assert_eq!(
            events(&log),
            vec!["pre 1", "pre 2", "upload a.txt b.txt", "post 1", "post 2"]
        );
    }

    #[tokio::test]
    async fn test_failing_pre_hook_short_circuits() {
        let log = event_log();
        let client = client(&log);

        client.pre(
            Operation::Remove,
            hook(|_| async { Err(Error::Hook("not allowed".to_string())) }),
        );
        client.pre(Operation::Remove, recording_hook(&log, "pre 2"));
        client.post(Operation::Remove, recording_hook(&log, "post"));

        let err = client.remove("b.txt").await.unwrap_err();

        assert!(matches!(err, Error::Hook(msg) if msg == "not allowed"));
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn test_failing_post_hook_reports_after_call() {
        let log = event_log();
        let client = client(&log);

        client.post(
            Operation::Exists,
            hook(|_| async { Err(Error::Hook("audit failed".to_string())) }),
        );
        client.post(Operation::Exists, recording_hook(&log, "post 2"));

        let err = client.exists("present.txt").await.unwrap_err();

        assert!(matches!(err, Error::Hook(_)));
        assert_eq!(events(&log), vec!["exists present.txt"]);
    }

    #[tokio::test]
    async fn test_hooks_are_scoped_to_operation() {
        let log = event_log();
        let client = client(&log);

        client.pre(Operation::Upload, recording_hook(&log, "pre upload"));

        assert!(client.exists("present.txt").await.unwrap());
        assert!(!client.exists("absent.txt").await.unwrap());
        assert_eq!(events(&log), vec!["exists present.txt", "exists absent.txt"]);
    }

    #[tokio::test]
    async fn test_hook_sees_call_arguments() {
        let log = event_log();
        let client = client(&log);
        let seen = log.clone();

        client.pre(
            Operation::Upload,
            hook(move |ctx| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(format!(
                        "{} {} {:?} {}",
                        ctx.instance, ctx.operation, ctx.file, ctx.filename
                    ));
                    Ok(())
                }
            }),
        );

        client.upload("a.txt", "b.txt").await.unwrap();

        assert_eq!(events(&log)[0], "custom upload Some(\"a.txt\") b.txt");
    }

    #[tokio::test]
    async fn test_timeout_bounds_a_hung_hook() {
        let log = event_log();
        let client = client(&log).with_timeout(Some(Duration::from_millis(20)));

        client.pre(
            Operation::Upload,
            hook(|_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
        );

        let err = client.upload("a.txt", "b.txt").await.unwrap_err();

        assert!(matches!(err, Error::Timeout { ref operation, .. } if operation == "upload"));
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn test_init_runs_once() {
        let log = event_log();
        let client = client(&log);

        client.ensure_init().await.unwrap();
        client.ensure_init().await.unwrap();

        assert!(client.is_initialized());
        assert_eq!(events(&log), vec!["init"]);
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let log = event_log();
        let provider = Arc::new(RecordingProvider::new(log.clone()));
        provider.fail_init.store(true, Ordering::SeqCst);
        let client = StorageClient::new("custom", provider.clone());

        assert!(client.ensure_init().await.is_err());
        assert!(!client.is_initialized());

        provider.fail_init.store(false, Ordering::SeqCst);
        client.ensure_init().await.unwrap();

        assert_eq!(events(&log), vec!["init", "init"]);
    }
}
