//! Error types for ModScout.
//!
//! Errors fall into two tiers:
//!
//! - [`AuditError`]: failures that abort an operation (invalid owner, bad
//!   configuration, a listing failure, a missing local directory). These carry
//!   the source location where they were raised.
//! - [`ErrorEnvelope`](crate::classify::ErrorEnvelope): classified backend
//!   failures. Per-repository and per-file envelopes are logged and excluded
//!   from results; only listing envelopes are promoted to
//!   [`AuditError::Backend`].
//!
//! # Example
//!
//! ```rust
//! use modscout::error::Result;
//!
//! fn read(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| modscout::error::AuditError::io(path, e, file!(), line!()))
//! }
//! ```

use crate::classify::ErrorEnvelope;
use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigMissing { key: "github.token".to_string() }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        $crate::error::AuditError::$variant {
            $($field $(: $value)?,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for ModScout operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// The main error type for ModScout.
#[derive(Error, Debug)]
pub enum AuditError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        src_path: &'static str,
        src_line: u32,
    },

    /// Directory given to the local backend does not exist or is not a directory.
    #[error("Directory not found: {path} ({src_path}:{src_line})")]
    DirectoryNotFound {
        path: PathBuf,
        src_path: &'static str,
        src_line: u32,
    },

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Owner / group / directory argument was empty or malformed.
    #[error("Invalid owner '{owner}' ({src_path}:{src_line}): {message}")]
    InvalidOwner {
        owner: String,
        message: String,
        src_path: &'static str,
        src_line: u32,
    },

    /// Repository name argument was empty or malformed.
    #[error("Invalid repository name '{name}' ({src_path}:{src_line}): {message}")]
    InvalidRepositoryName {
        name: String,
        message: String,
        src_path: &'static str,
        src_line: u32,
    },

    /// A file could not be scanned for module blocks.
    #[error("Failed to parse '{file}' ({src_path}:{src_line}): {message}")]
    Parse {
        file: String,
        message: String,
        src_path: &'static str,
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        src_path: &'static str,
        src_line: u32,
    },

    /// Invalid configuration value (bad regex, glob, URL, ...).
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        key: String,
        message: String,
        src_path: &'static str,
        src_line: u32,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {key} ({src_path}:{src_line})")]
    ConfigMissing {
        key: String,
        src_path: &'static str,
        src_line: u32,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// A classified backend failure that aborted the operation.
    #[error("{operation} failed ({src_path}:{src_line}): {envelope}")]
    Backend {
        operation: String,
        #[source]
        envelope: ErrorEnvelope,
        src_path: &'static str,
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        message: String,
        src_path: &'static str,
        src_line: u32,
    },
}

impl AuditError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source,
            src_path,
            src_line,
        }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::ConfigParse {
            message,
            source,
            src_path,
            src_line,
        }
    }

    /// The classified envelope, when this error came from a backend.
    #[must_use]
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Backend { envelope, .. } => Some(envelope),
            _ => None,
        }
    }

    /// Whether retrying the whole operation later might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.envelope().is_some_and(|e| e.retryable)
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::DirectoryNotFound { .. } => 15,
            Self::InvalidOwner { .. } | Self::InvalidRepositoryName { .. } => 16,
            Self::Parse { .. } => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::ConfigMissing { .. } => 20,
            Self::Backend { .. } => 22,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(source: std::io::Error) -> Self {
        // Prefer AuditError::io when the path is known.
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::types::Platform;

    #[test]
    fn test_err_macro_records_location() {
        let e = crate::err!(ConfigMissing {
            key: "platforms.github.token".to_string(),
        });
        match e {
            AuditError::ConfigMissing { src_path, src_line, .. } => {
                assert!(src_path.ends_with("error.rs"));
                assert!(src_line > 0);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        let e = crate::err!(DirectoryNotFound {
            path: PathBuf::from("/nope"),
        });
        assert_eq!(e.exit_code(), 15);

        let e = crate::err!(InvalidOwner {
            owner: String::new(),
            message: "empty".to_string(),
        });
        assert_eq!(e.exit_code(), 16);
    }

    #[test]
    fn test_backend_error_exposes_envelope() {
        let envelope = ErrorEnvelope::new(ErrorKind::ResourceNotFound, Platform::GitHub, "gone")
            .with_status(404);
        let e = crate::err!(Backend {
            operation: "list repositories".to_string(),
            envelope,
        });
        let env = e.envelope().expect("backend error carries envelope");
        assert_eq!(env.kind, ErrorKind::ResourceNotFound);
        assert!(e.to_string().contains("list repositories"));
        assert!(!e.is_recoverable());

        let e = crate::err!(Backend {
            operation: "list repositories".to_string(),
            envelope: ErrorEnvelope::new(ErrorKind::RateLimitExceeded, Platform::GitHub, "slow down"),
        });
        assert!(e.is_recoverable());
    }
}
