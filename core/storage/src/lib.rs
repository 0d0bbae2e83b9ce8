//! Storage facade for Coffer.
//!
//! Callers configure named instances, each backed by a pluggable
//! [`StorageProvider`], and use the same `upload` / `remove` / `exists`
//! calls whichever backend serves an instance.
//!
//! # Design Principles
//! - Lazy construction: an instance's provider is built on first use and cached
//! - Interception: every call runs through per-instance pre/post hooks
//! - Fail fast on setup: configuration errors are returned before any I/O
//! - Provider isolation: the facade never looks at how a provider moves bytes

pub mod client;
pub mod hooks;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod testing;

pub use client::StorageClient;
pub use hooks::{hook, Hook, HookContext, HookRegistry, Operation, Phase};
pub use memory::MemoryProvider;
pub use provider::StorageProvider;
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
pub use storage::{Storage, StorageConfig, DEFAULT_INSTANCE, OPERATION_TIMEOUT, PROVIDER_KEY};
