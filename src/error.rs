use std::time::Duration;

use thiserror::Error;

use crate::types::FallbackReason;

/// Failure of a single command issued to a device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("device not found: {serial}")]
    NotFound { serial: String },

    #[error("command timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("command exited with status {code}: {}", .stderr.trim())]
    NonZeroExit {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("failed to launch transport: {message}")]
    Spawn { message: String },

    #[error("command cancelled")]
    Cancelled,
}

/// A raw block that did not match the shape its parser expects.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {detail}")]
pub struct ParseError {
    pub field: &'static str,
    pub detail: String,
}

impl ParseError {
    pub fn new(field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            field,
            detail: detail.into(),
        }
    }
}

/// Failure of the remote inference path. Every variant is recoverable through
/// the rule engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisBackendError {
    #[error("inference backend not configured")]
    NotConfigured,

    #[error("rate limited by inference backend")]
    RateLimited { retry_after: Option<Duration> },

    #[error("inference request timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("inference backend returned {status}")]
    Server { status: u16 },

    #[error("inference request rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed inference response: {message}")]
    SchemaMismatch { message: String },
}

impl AnalysisBackendError {
    /// Only server-side and connection failures are worth a second attempt.
    /// A 429 never is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisBackendError::Server { .. } | AnalysisBackendError::Network { .. }
        )
    }

    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            AnalysisBackendError::NotConfigured => FallbackReason::NotConfigured,
            AnalysisBackendError::RateLimited { .. } => FallbackReason::RateLimited,
            AnalysisBackendError::Timeout => FallbackReason::Timeout,
            AnalysisBackendError::Network { .. } => FallbackReason::Network,
            AnalysisBackendError::Server { .. } => FallbackReason::ServerError,
            AnalysisBackendError::Rejected { .. } => FallbackReason::Rejected,
            AnalysisBackendError::SchemaMismatch { .. } => FallbackReason::MalformedResponse,
        }
    }
}

/// A device that vanished before its scan could start.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("device {serial} unavailable: {reason}")]
pub struct DeviceUnavailableError {
    pub serial: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
