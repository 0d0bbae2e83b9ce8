//! Pre/post hooks interposed around storage operations.
//!
//! Hooks are async callbacks registered per `(phase, operation)` on a
//! [`StorageClient`](crate::StorageClient). A hook that returns an error
//! aborts the rest of the chain, including the provider call itself when
//! the hook runs in the `Pre` phase.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use coffer_common::{Error, Result};

/// Business operations that can be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Upload,
    Remove,
    Exists,
}

impl Operation {
    /// Method name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Remove => "remove",
            Operation::Exists => "exists",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(Operation::Upload),
            "remove" => Ok(Operation::Remove),
            "exists" => Ok(Operation::Exists),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

/// When a hook runs relative to the provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

/// Arguments of the intercepted call, handed to every hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    /// Instance the call was made on.
    pub instance: String,
    /// Intercepted operation.
    pub operation: Operation,
    /// Upload source; `None` for other operations.
    pub file: Option<String>,
    /// Target object name.
    pub filename: String,
}

/// Async hook callback.
pub type Hook = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: HookContext| f(ctx).boxed())
}

/// Hooks attached to one client, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<(Phase, Operation), Vec<Hook>>,
}

impl HookRegistry {
    /// Create an empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; earlier registrations run first.
    pub fn add(&mut self, phase: Phase, operation: Operation, hook: Hook) {
        self.hooks.entry((phase, operation)).or_default().push(hook);
    }

    /// Snapshot of the hooks for `(phase, operation)`.
    pub fn hooks(&self, phase: Phase, operation: Operation) -> Vec<Hook> {
        self.hooks
            .get(&(phase, operation))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of hooks registered for `(phase, operation)`.
    pub fn count(&self, phase: Phase, operation: Operation) -> usize {
        self.hooks.get(&(phase, operation)).map_or(0, Vec::len)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((phase, operation), hooks) in &self.hooks {
            map.entry(&format!("{:?}:{}", phase, operation), &hooks.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn context() -> HookContext {
        HookContext {
            instance: "custom".to_string(),
            operation: Operation::Upload,
            file: Some("a.txt".to_string()),
            filename: "b.txt".to_string(),
        }
    }

    #[test]
    fn test_operation_names() {
        for op in [Operation::Upload, Operation::Remove, Operation::Exists] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!(matches!(
            "download".parse::<Operation>(),
            Err(Error::UnknownOperation(name)) if name == "download"
        ));
    }

    #[tokio::test]
    async fn test_hooks_keep_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();

        for i in 0..3 {
            let seen = seen.clone();
            registry.add(
                Phase::Pre,
                Operation::Upload,
                hook(move |_ctx| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(i);
                        Ok(())
                    }
                }),
            );
        }

        for h in registry.hooks(Phase::Pre, Operation::Upload) {
            h(context()).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_partitions_are_separate() {
        let mut registry = HookRegistry::new();
        registry.add(Phase::Pre, Operation::Upload, hook(|_| async { Ok(()) }));
        registry.add(Phase::Post, Operation::Upload, hook(|_| async { Ok(()) }));
        registry.add(Phase::Post, Operation::Upload, hook(|_| async { Ok(()) }));

        assert_eq!(registry.count(Phase::Pre, Operation::Upload), 1);
        assert_eq!(registry.count(Phase::Post, Operation::Upload), 2);
        assert_eq!(registry.count(Phase::Pre, Operation::Remove), 0);
        assert!(registry.hooks(Phase::Pre, Operation::Exists).is_empty());
    }

    #[tokio::test]
    async fn test_hook_receives_context() {
        let h = hook(|ctx| async move {
            if ctx.file.as_deref() == Some("a.txt") {
                Ok(())
            } else {
                Err(Error::Hook("unexpected source".to_string()))
            }
        });

        h(context()).await.unwrap();
    }
}
