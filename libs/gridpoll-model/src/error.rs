//! Model error types

use crate::descriptor::RegisterKind;
use gridpoll_codec::DataKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("Scale denominator must be non-zero")]
    ZeroDenominator,

    #[error("Scale exponent {0} outside -9..=9")]
    ExponentOutOfRange(i8),

    #[error("Scale arithmetic overflow")]
    Overflow,
}

/// Register table construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Duplicate parameter name: {0}")]
    DuplicateName(String),

    #[error("Parameter {0} has address 0; addresses are 1-based")]
    ZeroAddress(String),

    #[error("Parameter {name}: {kind} needs {expected} words, descriptor says {actual}")]
    WordCountMismatch {
        name: String,
        kind: DataKind,
        expected: u16,
        actual: u16,
    },

    #[error("Text parameter {0} has zero words")]
    EmptyText(String),

    #[error("Parameter {0} extends past the last register address")]
    AddressOverflow(String),

    #[error("Parameters {first} and {second} overlap in the {register_kind} bank")]
    Overlap {
        first: String,
        second: String,
        register_kind: RegisterKind,
    },

    #[error("Invalid scale: {0}")]
    Scale(#[from] ScaleError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Serial mismatch: configured {expected}, device reports {actual}")]
    Mismatch { expected: String, actual: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {manufacturer} model type code {type_code} (0x{type_code:04X})")]
pub struct UnknownModelError {
    pub manufacturer: String,
    pub type_code: u16,
}

/// Device profile lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Device profile is not finalized; identify the device first")]
    NotFinalized,

    #[error("Device profile is already finalized")]
    AlreadyFinalized,

    #[error("Declared serial number must not be empty")]
    EmptySerial,

    #[error("Unknown vendor tag: {0}")]
    UnknownVendor(String),

    #[error("Model {model} has {requested} channels, channel table supports {available}")]
    TooManyChannels {
        model: String,
        requested: u16,
        available: usize,
    },

    #[error(transparent)]
    Map(#[from] MapError),
}

/// Rejected write requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Parameter {name} is an {register_kind} register and cannot be written")]
    NotWritable {
        name: String,
        register_kind: RegisterKind,
    },

    #[error("Parameter {0} has no legal write values")]
    NoLegalValues(String),

    #[error("Value {value} is not legal for {name} (allowed: {allowed:?})")]
    IllegalValue {
        name: String,
        value: String,
        allowed: Vec<i64>,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),
}
