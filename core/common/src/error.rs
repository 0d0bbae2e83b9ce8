//! Common error types for Coffer.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for Coffer operations.
///
/// Errors fall into two groups. Configuration errors describe a setup
/// mistake by the caller and are returned synchronously, before any
/// provider I/O starts. Everything else is a runtime error produced by a
/// provider, a hook or a lifecycle step.
#[derive(Debug, Error)]
pub enum Error {
    /// No configuration record exists for the instance.
    #[error("Configuration for {0} is missing")]
    MissingConfiguration(String),

    /// The configuration record has no provider selector.
    #[error("Provider for {0} is not specified")]
    MissingProvider(String),

    /// No instance name was given and no default instance is set.
    #[error("No default provider is specified")]
    NoDefaultInstance,

    /// The provider selector does not name a registered provider.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The configuration record is malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The method name does not name a storage operation.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A provider does not implement a contract operation.
    #[error("Cannot invoke abstract operation: {0}")]
    AbstractOperation(&'static str),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A hook aborted the call chain.
    #[error("Hook error: {0}")]
    Hook(String),

    /// The call chain did not complete in time.
    #[error("{operation} on {instance} timed out after {elapsed:?}")]
    Timeout {
        instance: String,
        operation: String,
        elapsed: Duration,
    },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error describes a setup mistake rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingConfiguration(_)
                | Error::MissingProvider(_)
                | Error::NoDefaultInstance
                | Error::UnknownProvider(_)
                | Error::InvalidConfiguration(_)
                | Error::UnknownOperation(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::NoDefaultInstance.is_configuration());
        assert!(Error::MissingConfiguration("custom".into()).is_configuration());
        assert!(Error::MissingProvider("custom".into()).is_configuration());
        assert!(!Error::Hook("rejected".into()).is_configuration());
        assert!(!Error::AbstractOperation("upload").is_configuration());
    }

    #[test]
    fn test_messages_name_the_instance() {
        let err = Error::MissingConfiguration("custom".into());
        assert_eq!(err.to_string(), "Configuration for custom is missing");

        let err = Error::MissingProvider("custom".into());
        assert_eq!(err.to_string(), "Provider for custom is not specified");
    }
}
