//! Uniform classification of backend failures.
//!
//! Every backend call site converts whatever went wrong (HTTP status,
//! transport failure, filesystem error, decode error) into a [`RawFailure`]
//! and funnels it through [`classify`]. Upstream code only ever sees an
//! [`ErrorEnvelope`].
//!
//! # Taxonomy
//!
//! | Raw shape | Kind | Retryable |
//! |---|---|---|
//! | HTTP 401 | `AuthenticationFailed` | no |
//! | HTTP 403 | `AuthorizationFailed` | no |
//! | HTTP 404 | `ResourceNotFound` | no |
//! | HTTP 429 / platform rate-limit signal | `RateLimitExceeded` | yes |
//! | other HTTP | `PlatformError` | iff status >= 500 |
//! | connection-level failure | `NetworkError` | yes |
//! | construction-time misconfiguration | `InvalidConfiguration` | no |
//! | anything else | `UnknownError` | no |

use crate::types::Platform;
use serde::Serialize;
use std::fmt;
use std::io;

/// Classified failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthenticationFailed,
    AuthorizationFailed,
    ResourceNotFound,
    RateLimitExceeded,
    PlatformError,
    NetworkError,
    InvalidConfiguration,
    UnknownError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::PlatformError => "PLATFORM_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified backend failure.
///
/// Built once where the raw failure is caught and passed along unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind} on {platform}{}: {cause}", .http_status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub platform: Platform,
    pub retryable: bool,
    pub http_status: Option<u16>,
    pub cause: String,
}

impl ErrorEnvelope {
    /// Envelope with the default retryability for `kind`.
    #[must_use]
    pub fn new(kind: ErrorKind, platform: Platform, cause: impl Into<String>) -> Self {
        let retryable = matches!(kind, ErrorKind::RateLimitExceeded | ErrorKind::NetworkError);
        Self {
            kind,
            platform,
            retryable,
            http_status: None,
            cause: cause.into(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::ResourceNotFound
    }
}

/// A failure as observed at a backend boundary, before classification.
#[derive(Debug)]
pub enum RawFailure {
    /// Non-success HTTP response.
    Http { status: u16, message: String },
    /// The platform signalled rate limiting (429, or a 403 with an exhausted quota header).
    RateLimited { status: u16, message: String },
    /// The request never produced a response.
    Connection(String),
    /// Local filesystem error.
    Io(io::Error),
    /// Misconfiguration detected while building a request or client.
    Configuration(String),
    /// The response body could not be decoded.
    Decode(String),
    /// Already classified; passes through unchanged.
    Classified(ErrorEnvelope),
    Other(String),
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { status, message } | Self::RateLimited { status, message } => {
                write!(f, "HTTP {status}: {message}")
            }
            Self::Connection(m) | Self::Configuration(m) | Self::Decode(m) | Self::Other(m) => {
                f.write_str(m)
            }
            Self::Io(e) => write!(f, "{e}"),
            Self::Classified(env) => write!(f, "{env}"),
        }
    }
}

impl From<io::Error> for RawFailure {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ErrorEnvelope> for RawFailure {
    fn from(e: ErrorEnvelope) -> Self {
        Self::Classified(e)
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Configuration(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Map a raw failure onto the uniform taxonomy.
///
/// Pure: the same raw shape always yields the same envelope.
#[must_use]
pub fn classify(platform: Platform, raw: RawFailure) -> ErrorEnvelope {
    match raw {
        RawFailure::Classified(envelope) => envelope,
        RawFailure::Http { status, message } => classify_status(platform, status, message),
        RawFailure::RateLimited { status, message } => {
            ErrorEnvelope::new(ErrorKind::RateLimitExceeded, platform, message).with_status(status)
        }
        RawFailure::Connection(message) => {
            ErrorEnvelope::new(ErrorKind::NetworkError, platform, message)
        }
        RawFailure::Io(e) => classify_io(platform, &e),
        RawFailure::Configuration(message) => {
            ErrorEnvelope::new(ErrorKind::InvalidConfiguration, platform, message)
        }
        RawFailure::Decode(message) | RawFailure::Other(message) => {
            ErrorEnvelope::new(ErrorKind::UnknownError, platform, message)
        }
    }
}

fn classify_status(platform: Platform, status: u16, message: String) -> ErrorEnvelope {
    let kind = match status {
        401 => ErrorKind::AuthenticationFailed,
        403 => ErrorKind::AuthorizationFailed,
        404 => ErrorKind::ResourceNotFound,
        429 => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::PlatformError,
    };
    let envelope = ErrorEnvelope::new(kind, platform, message).with_status(status);
    if kind == ErrorKind::PlatformError {
        envelope.with_retryable(status >= 500)
    } else {
        envelope
    }
}

fn classify_io(platform: Platform, e: &io::Error) -> ErrorEnvelope {
    use io::ErrorKind as Io;
    let kind = match e.kind() {
        Io::NotFound => ErrorKind::ResourceNotFound,
        Io::PermissionDenied => ErrorKind::AuthorizationFailed,
        Io::TimedOut
        | Io::ConnectionRefused
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::NotConnected
        | Io::BrokenPipe => ErrorKind::NetworkError,
        _ => ErrorKind::UnknownError,
    };
    ErrorEnvelope::new(kind, platform, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn http(status: u16) -> RawFailure {
        RawFailure::Http {
            status,
            message: "boom".to_string(),
        }
    }

    #[test_case(401, ErrorKind::AuthenticationFailed, false ; "unauthorized")]
    #[test_case(403, ErrorKind::AuthorizationFailed, false ; "forbidden")]
    #[test_case(404, ErrorKind::ResourceNotFound, false ; "not found")]
    #[test_case(429, ErrorKind::RateLimitExceeded, true ; "too many requests")]
    #[test_case(400, ErrorKind::PlatformError, false ; "bad request")]
    #[test_case(422, ErrorKind::PlatformError, false ; "unprocessable")]
    #[test_case(500, ErrorKind::PlatformError, true ; "internal error")]
    #[test_case(503, ErrorKind::PlatformError, true ; "unavailable")]
    fn test_http_status_classification(status: u16, kind: ErrorKind, retryable: bool) {
        let env = classify(Platform::GitHub, http(status));
        assert_eq!(env.kind, kind);
        assert_eq!(env.retryable, retryable);
        assert_eq!(env.http_status, Some(status));
        assert_eq!(env.platform, Platform::GitHub);
    }

    #[test]
    fn test_rate_limit_signal_is_retryable() {
        let env = classify(
            Platform::GitHub,
            RawFailure::RateLimited {
                status: 403,
                message: "API rate limit exceeded".to_string(),
            },
        );
        assert_eq!(env.kind, ErrorKind::RateLimitExceeded);
        assert!(env.retryable);
        assert_eq!(env.http_status, Some(403));
    }

    #[test]
    fn test_connection_failure_is_network_error() {
        let env = classify(Platform::GitLab, RawFailure::Connection("reset".to_string()));
        assert_eq!(env.kind, ErrorKind::NetworkError);
        assert!(env.retryable);
        assert_eq!(env.http_status, None);
    }

    #[test_case(io::ErrorKind::NotFound, ErrorKind::ResourceNotFound ; "missing file")]
    #[test_case(io::ErrorKind::PermissionDenied, ErrorKind::AuthorizationFailed ; "denied")]
    #[test_case(io::ErrorKind::TimedOut, ErrorKind::NetworkError ; "timed out")]
    #[test_case(io::ErrorKind::InvalidData, ErrorKind::UnknownError ; "invalid data")]
    fn test_io_classification(kind: io::ErrorKind, expected: ErrorKind) {
        let env = classify(Platform::Local, RawFailure::Io(io::Error::new(kind, "x")));
        assert_eq!(env.kind, expected);
    }

    #[test]
    fn test_configuration_and_fallback() {
        let env = classify(Platform::GitHub, RawFailure::Configuration("no token".into()));
        assert_eq!(env.kind, ErrorKind::InvalidConfiguration);
        assert!(!env.retryable);

        let env = classify(Platform::GitHub, RawFailure::Decode("bad json".into()));
        assert_eq!(env.kind, ErrorKind::UnknownError);
        assert!(!env.retryable);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let first = classify(Platform::GitLab, http(502));
        let second = classify(Platform::GitHub, RawFailure::Classified(first.clone()));
        assert_eq!(first, second);
        assert_eq!(second.platform, Platform::GitLab);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = classify(Platform::GitHub, http(418));
        let b = classify(Platform::GitHub, http(418));
        assert_eq!(a, b);
    }

    #[test]
    fn test_envelope_display() {
        let env = classify(Platform::GitHub, http(404));
        assert_eq!(env.to_string(), "RESOURCE_NOT_FOUND on github (HTTP 404): boom");
    }
}
