//! Codec error types

use crate::kind::DataKind;
use thiserror::Error;

/// Failure to turn register words into a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Not enough registers for {kind}: expected {expected}, got {actual}")]
    InsufficientWords {
        kind: DataKind,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid text payload: {0}")]
    InvalidText(String),
}

/// Failure to turn a value into register words
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// The value does not fit the target kind
    #[error("Value {value} out of range for {kind} ({min}..={max})")]
    OutOfRange {
        kind: DataKind,
        value: i128,
        min: i128,
        max: i128,
    },

    /// The value/kind combination is not writable at all
    #[error("Cannot encode for {kind}: {reason}")]
    Unsupported { kind: DataKind, reason: String },
}

/// Unknown data kind spelling in a register table or config file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown data kind: '{0}'")]
pub struct ParseKindError(pub String);
