//! Error types for workshop-dl
//!
//! This module provides the error taxonomy shared by every transfer backend:
//! - Launch failures (a tool could not be started)
//! - Protocol violations (a helper exited cleanly without a terminal event)
//! - Operation failures (explicit error events, non-zero exit codes)
//! - Prompt exhaustion (a credential prompt repeated past its bound)
//! - Cancellation, which is kept distinct from failure

use crate::session::PromptKind;
use crate::types::{AppId, PublishedFileId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for workshop-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for workshop-dl
///
/// Every fatal variant carries enough context (path, id, exit code) to produce
/// a human-readable message without further lookup.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "prompts.max_password_prompts")
        key: Option<String>,
    },

    /// A child process could not be started
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// The program that failed to start
        program: PathBuf,
        /// The underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// A tool broke its output contract (e.g. clean exit with no result event)
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A tool reported failure (error event or non-zero exit code)
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// An interactive prompt was requested more often than allowed
    #[error("{kind} requested too many times ({attempts} attempts)")]
    PromptExhausted {
        /// Which kind of prompt was repeated
        kind: PromptKind,
        /// How many times it had already been answered
        attempts: u32,
    },

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Caller supplied an invalid request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workshop item could not be located by any enabled strategy
    #[error("workshop item {published_file_id} (app {app_id}) not found in local cache and no download strategy applied")]
    NotFound {
        /// The scope that was searched (0 if unknown)
        app_id: AppId,
        /// The item that was searched for
        published_file_id: PublishedFileId,
    },

    /// Destination already exists and overwriting is not permitted
    #[error("output already exists: {}", path.display())]
    OutputExists {
        /// The conflicting destination path
        path: PathBuf,
    },

    /// A required external tool could not be located
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Content manifest could not be read, validated or written
    #[error("manifest error in {}: {reason}", path.display())]
    Manifest {
        /// The manifest file involved
        path: PathBuf,
        /// The reason the manifest was rejected
        reason: String,
    },

    /// Operation not supported (missing packer binary, unsupported format)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// ZIP archive error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Launch { .. } => "launch_failure",
            Error::ProtocolViolation(_) => "protocol_violation",
            Error::OperationFailed(_) => "operation_failed",
            Error::PromptExhausted { .. } => "prompt_exhausted",
            Error::Cancelled => "cancelled",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound { .. } => "not_found",
            Error::OutputExists { .. } => "output_exists",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::Manifest { .. } => "manifest_error",
            Error::NotSupported(_) => "not_supported",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Zip(_) => "zip_error",
        }
    }

    /// Whether this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_scope_and_item() {
        let err = Error::NotFound {
            app_id: AppId(4000),
            published_file_id: PublishedFileId(123456789),
        };
        let message = err.to_string();
        assert!(message.contains("4000"), "{message}");
        assert!(message.contains("123456789"), "{message}");
        assert_eq!(err.error_code(), "not_found");
    }

    #[test]
    fn prompt_exhausted_names_kind() {
        let err = Error::PromptExhausted {
            kind: PromptKind::OneTimeCode,
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "one-time code requested too many times (3 attempts)"
        );
    }

    #[test]
    fn output_exists_includes_path() {
        let err = Error::OutputExists {
            path: PathBuf::from("/tmp/out/123.gma"),
        };
        assert!(err.to_string().contains("/tmp/out/123.gma"));
    }

    #[test]
    fn launch_failure_keeps_source() {
        let err = Error::Launch {
            program: PathBuf::from("/nope/steamcmd"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.error_code(), "launch_failure");
    }

    #[test]
    fn only_cancelled_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::OperationFailed("x".into()).is_cancelled());
        assert!(!Error::ProtocolViolation("x".into()).is_cancelled());
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::other("disk").into();
        assert_eq!(err.error_code(), "io_error");
    }
}
