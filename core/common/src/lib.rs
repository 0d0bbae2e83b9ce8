//! Common utilities and types shared across Coffer crates.
//!
//! This module provides the error taxonomy used by the storage facade,
//! its providers and its hooks.

pub mod error;

pub use error::{Error, Result};
