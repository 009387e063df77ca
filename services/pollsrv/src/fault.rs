//! Faults raised while talking to a device
//!
//! Each fault names the parameter or device it concerns. [`Fault::scope`]
//! tells the orchestrator how far a fault propagates.

use crate::transport::{ExceptionCode, TransportError};
use errors::GridpollError;
use gridpoll_codec::{DecodeError, EncodeError};
use gridpoll_model::{IdentityError, ProfileError, UnknownModelError, WriteError};
use thiserror::Error;

/// How far a fault reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultScope {
    /// Skip this parameter, keep polling the device
    Parameter,
    /// Stop polling this device for the rest of the process
    Device,
    /// Device unavailable for this cycle, retried on the next
    Cycle,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("{name}: no response within {timeout_ms} ms")]
    TransportTimeout { name: String, timeout_ms: u64 },

    #[error("{name}: device unreachable: {reason}")]
    TransportUnreachable { name: String, reason: String },

    #[error("{name}: Modbus exception {code}")]
    ProtocolException { name: String, code: ExceptionCode },

    #[error("{name}: decode failed: {source}")]
    DecodeFailure { name: String, source: DecodeError },

    #[error("{name}: value rejected: {reason}")]
    EncodeRangeViolation { name: String, reason: String },

    #[error("{name}: write not supported: {reason}")]
    EncodeUnsupported { name: String, reason: String },

    #[error("{device}: serial mismatch, configured {expected}, device reports {actual}")]
    IdentityMismatch {
        device: String,
        expected: String,
        actual: String,
    },

    #[error("{device}: {source}")]
    UnknownModel {
        device: String,
        source: UnknownModelError,
    },

    #[error("{device}: connection failed after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        device: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{name}: {reason}")]
    Precondition { name: String, reason: String },
}

impl Fault {
    pub fn scope(&self) -> FaultScope {
        match self {
            Self::IdentityMismatch { .. } | Self::UnknownModel { .. } => FaultScope::Device,
            Self::ConnectionExhausted { .. } => FaultScope::Cycle,
            Self::UnknownParameter { .. }
            | Self::TransportTimeout { .. }
            | Self::TransportUnreachable { .. }
            | Self::ProtocolException { .. }
            | Self::DecodeFailure { .. }
            | Self::EncodeRangeViolation { .. }
            | Self::EncodeUnsupported { .. }
            | Self::Precondition { .. } => FaultScope::Parameter,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. } | Self::TransportUnreachable { .. }
        )
    }

    /// Parameter or device name the fault concerns
    pub fn subject(&self) -> &str {
        match self {
            Self::UnknownParameter { name }
            | Self::TransportTimeout { name, .. }
            | Self::TransportUnreachable { name, .. }
            | Self::ProtocolException { name, .. }
            | Self::DecodeFailure { name, .. }
            | Self::EncodeRangeViolation { name, .. }
            | Self::EncodeUnsupported { name, .. }
            | Self::Precondition { name, .. } => name,
            Self::IdentityMismatch { device, .. }
            | Self::UnknownModel { device, .. }
            | Self::ConnectionExhausted { device, .. } => device,
        }
    }

    pub fn from_transport(name: &str, err: TransportError) -> Self {
        let name = name.to_string();
        match err {
            TransportError::Timeout(timeout) => Self::TransportTimeout {
                name,
                timeout_ms: timeout.as_millis() as u64,
            },
            TransportError::Unreachable(reason) => Self::TransportUnreachable { name, reason },
            TransportError::NotConnected => Self::TransportUnreachable {
                name,
                reason: "not connected".to_string(),
            },
            TransportError::Exception(code) => Self::ProtocolException { name, code },
        }
    }

    pub fn from_encode(name: &str, err: EncodeError) -> Self {
        match err {
            EncodeError::OutOfRange { .. } => Self::EncodeRangeViolation {
                name: name.to_string(),
                reason: err.to_string(),
            },
            EncodeError::Unsupported { reason, .. } => Self::EncodeUnsupported {
                name: name.to_string(),
                reason,
            },
        }
    }

    pub fn from_profile(name: &str, err: ProfileError) -> Self {
        Self::Precondition {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }

    /// Rejected write requests
    ///
    /// A parameter without a legal-value table is simply not writable.
    pub fn from_write(name: &str, err: WriteError) -> Self {
        let name = name.to_string();
        match err {
            WriteError::UnknownParameter(_) => Self::UnknownParameter { name },
            WriteError::NotWritable { .. } | WriteError::NoLegalValues(_) => {
                Self::EncodeUnsupported {
                    name,
                    reason: err.to_string(),
                }
            },
            WriteError::IllegalValue { .. } => Self::EncodeRangeViolation {
                name,
                reason: err.to_string(),
            },
            WriteError::Profile(profile) => Self::from_profile(&name, profile),
        }
    }

    /// A serial that could not be read never gets here; it surfaces as the
    /// transport fault of the read itself.
    pub fn from_identity(device: &str, err: IdentityError) -> Self {
        let IdentityError::Mismatch { expected, actual } = err;
        Self::IdentityMismatch {
            device: device.to_string(),
            expected,
            actual,
        }
    }
}

impl From<Fault> for GridpollError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::TransportTimeout { .. } => GridpollError::Timeout(fault.to_string()),
            Fault::ConnectionExhausted { ref device, ref last_error, .. } => {
                GridpollError::ConnectionFailed {
                    endpoint: device.clone(),
                    reason: last_error.clone(),
                }
            },
            Fault::TransportUnreachable { .. } | Fault::ProtocolException { .. } => {
                GridpollError::Transport(fault.to_string())
            },
            _ => GridpollError::Internal(fault.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use gridpoll_codec::DataKind;
    use std::time::Duration;

    #[test]
    fn test_scope_table() {
        let mismatch = Fault::IdentityMismatch {
            device: "inv1".into(),
            expected: "A".into(),
            actual: "B".into(),
        };
        assert_eq!(mismatch.scope(), FaultScope::Device);

        let exhausted = Fault::ConnectionExhausted {
            device: "inv1".into(),
            attempts: 2,
            last_error: "refused".into(),
        };
        assert_eq!(exhausted.scope(), FaultScope::Cycle);

        let timeout = Fault::from_transport("Daily Power Yields", TransportError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.scope(), FaultScope::Parameter);
        assert!(timeout.is_transport());
        assert_eq!(timeout.subject(), "Daily Power Yields");
    }

    #[test]
    fn test_transport_mapping() {
        let fault = Fault::from_transport("x", TransportError::Exception(ExceptionCode(2)));
        assert_eq!(
            fault,
            Fault::ProtocolException {
                name: "x".into(),
                code: ExceptionCode(2)
            }
        );
        assert!(fault.to_string().contains("Illegal Data Address"));

        let fault = Fault::from_transport("x", TransportError::NotConnected);
        assert!(matches!(fault, Fault::TransportUnreachable { .. }));
    }

    #[test]
    fn test_encode_mapping_keeps_range_and_unsupported_apart() {
        let range = Fault::from_encode(
            "x",
            EncodeError::OutOfRange {
                kind: DataKind::U16,
                value: 70000,
                min: 0,
                max: 65535,
            },
        );
        assert!(matches!(range, Fault::EncodeRangeViolation { .. }));

        let unsupported = Fault::from_encode(
            "x",
            EncodeError::Unsupported {
                kind: DataKind::U32,
                reason: "only U16 registers are writable".into(),
            },
        );
        assert!(matches!(unsupported, Fault::EncodeUnsupported { .. }));
    }

    #[test]
    fn test_into_service_error() {
        let err: GridpollError = Fault::ConnectionExhausted {
            device: "meter".into(),
            attempts: 3,
            last_error: "refused".into(),
        }
        .into();
        assert!(err.is_retryable());
    }
}
