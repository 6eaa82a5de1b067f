//! Error types for the edgesite deployment tool.
//!
//! This module provides the error hierarchy for every stage of a deployment:
//! configuration, content enumeration, descriptor construction, state
//! management, planning and the hand-off to the apply engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for edgesite.
#[derive(Debug, Error)]
pub enum EdgesiteError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Content enumeration errors.
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// Descriptor construction errors.
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Apply engine errors.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A required key has no value and no default.
    #[error("Missing required configuration value: {key}")]
    MissingRequired {
        /// Configuration key, as written in the deployment file.
        key: String,
    },
}

/// Content enumeration errors.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The content root does not exist or is not a directory.
    #[error("Content root is not a directory: {path}")]
    RootNotFound {
        /// Configured content root.
        path: PathBuf,
    },

    /// A file under the content root could not be read.
    #[error("Failed to read {path}: {message}")]
    Unreadable {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// A path under the content root is not valid UTF-8.
    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The offending path, lossily displayed.
        path: PathBuf,
    },

    /// Two files normalize to the same object key.
    #[error("Duplicate object key: {key}")]
    DuplicateKey {
        /// The colliding key.
        key: String,
    },
}

/// Descriptor construction errors.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A resource address was declared twice.
    #[error("Resource declared twice: {address}")]
    DuplicateResource {
        /// The duplicated address.
        address: String,
    },

    /// A property or dependency points at an undeclared resource.
    #[error("{from} references undeclared resource {to}")]
    DanglingReference {
        /// Referencing resource.
        from: String,
        /// Missing resource.
        to: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected involving {address}")]
    Cycle {
        /// A resource on the cycle.
        address: String,
    },

    /// A resource type that must be declared exactly once is not.
    #[error("Expected exactly one {resource_type}, found {count}")]
    SingletonViolated {
        /// Resource type.
        resource_type: String,
        /// Number of declarations found.
        count: usize,
    },

    /// The certificate covers a number of names other than one.
    #[error("Certificate must cover exactly one name, got {count}")]
    ValidationOptionCardinality {
        /// Number of names requested.
        count: usize,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Apply engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("Failed to launch {binary}: {message}")]
    LaunchFailed {
        /// Engine binary.
        binary: String,
        /// Underlying failure.
        message: String,
    },

    /// An engine command exited unsuccessfully.
    #[error("`{command}` failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// Engine output could not be interpreted.
    #[error("Unexpected engine output: {message}")]
    InvalidOutput {
        /// Description of the problem.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan was computed for another project or environment.
    #[error("State belongs to {found}, configuration describes {expected}")]
    StackMismatch {
        /// Stack named by the configuration.
        expected: String,
        /// Stack recorded in state.
        found: String,
    },

    /// Apply was aborted before the engine ran.
    #[error("Apply aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for edgesite operations.
pub type Result<T> = std::result::Result<T, EdgesiteError>;

impl EdgesiteError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::LockFailed { .. } | StateError::LockedByOther { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a missing-value error for the given key.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingRequired { key: key.into() }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl EngineError {
    /// Creates a command failure.
    #[must_use]
    pub fn command_failed(command: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Creates an invalid output error.
    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_is_retryable() {
        let err = EdgesiteError::State(StateError::LockedByOther {
            holder: String::from("ci-runner"),
            since: String::from("2026-01-01T00:00:00Z"),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_required_message() {
        let err = EdgesiteError::from(ConfigError::missing("site.domain"));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required configuration value: site.domain"
        );
        assert!(!err.is_retryable());
    }
}
