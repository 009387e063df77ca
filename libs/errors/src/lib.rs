//! Service-level error handling for gridpoll
//!
//! Library crates keep their own domain errors (codec, model, fault). This
//! type is what the service boundary deals in: configuration loading,
//! startup, I/O and anything surfaced through `anyhow`.

use thiserror::Error;

// ============================================================================
// GridpollError - Main error type
// ============================================================================

/// Main error type for the gridpoll service
#[derive(Debug, Error)]
pub enum GridpollError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Transport Errors
    // ======================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {file}: {error}")]
    ParseError { file: String, error: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // ======================================
    // Catch-all
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GridpollError
pub type GridpollResult<T> = Result<T, GridpollError>;

/// Coarse classification used for log levels and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Timeout,
    Internal,
    Unknown,
}

impl GridpollError {
    /// Stable error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Io(_) => "IO_ERROR",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::ParseError { .. } => "PARSE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::FileNotFound(_)
            | Self::ParseError { .. } => ErrorCategory::Configuration,

            Self::Transport(_) | Self::ConnectionFailed { .. } => ErrorCategory::Network,

            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::Io(_)
            | Self::Serialization(_)
            | Self::StartupFailed(_)
            | Self::Internal(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout
        )
    }

    /// Level at which the service should log this error
    pub fn log_level(&self) -> tracing::Level {
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Configuration => tracing::Level::ERROR,
            ErrorCategory::Network | ErrorCategory::Timeout => tracing::Level::WARN,
            ErrorCategory::Unknown => tracing::Level::ERROR,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for GridpollError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GridpollError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::GridpollError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::GridpollError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! invalid_config {
    ($field:expr, $($arg:tt)*) => {
        $crate::GridpollError::InvalidConfig {
            field: $field.to_string(),
            reason: format!($($arg)*),
        }
    };
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GridpollError::Configuration("x".into()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(GridpollError::Timeout("bus".into()).error_code(), "TIMEOUT");
        assert_eq!(
            GridpollError::from(anyhow::anyhow!("boom")).error_code(),
            "OTHER_ERROR"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(GridpollError::Timeout("test".into()).is_retryable());
        assert!(GridpollError::ConnectionFailed {
            endpoint: "10.0.0.1:502".into(),
            reason: "refused".into()
        }
        .is_retryable());
        assert!(!GridpollError::Configuration("test".into()).is_retryable());
        assert!(!GridpollError::Internal("test".into()).is_retryable());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("missing {}", "devices");
        assert_eq!(err.to_string(), "Configuration error: missing devices");

        let err = invalid_config!("devices[0].name", "'{}' is not alphanumeric", "a-b");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: devices[0].name: 'a-b' is not alphanumeric"
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_serde_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GridpollError = parse.unwrap_err().into();
        assert!(matches!(err, GridpollError::Serialization(_)));
    }
}
