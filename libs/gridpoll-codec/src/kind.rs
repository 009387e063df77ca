//! Data kinds and decoded values

use crate::error::ParseKindError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// How a run of register words is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    /// Big-endian byte pairs, NUL padded; length comes from the descriptor
    Text,
}

impl DataKind {
    /// Fixed word count, or `None` for variable-length text
    pub fn word_count(&self) -> Option<u16> {
        match self {
            Self::U16 | Self::I16 => Some(1),
            Self::U32 | Self::I32 => Some(2),
            Self::U64 | Self::I64 => Some(4),
            Self::Text => None,
        }
    }

    /// Closed numeric range of the kind, `None` for text
    pub fn range(&self) -> Option<(i128, i128)> {
        let range = match self {
            Self::U16 => (0, i128::from(u16::MAX)),
            Self::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            Self::U32 => (0, i128::from(u32::MAX)),
            Self::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            Self::U64 => (0, i128::from(u64::MAX)),
            Self::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            Self::Text => return None,
        };
        Some(range)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Canonical spelling used in register tables
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U16 => "U16",
            Self::I16 => "I16",
            Self::U32 => "U32",
            Self::I32 => "I32",
            Self::U64 => "U64",
            Self::I64 => "I64",
            Self::Text => "UTF8",
        }
    }
}

impl FromStr for DataKind {
    type Err = ParseKindError;

    /// Accepts the vendor-table spellings:
    /// - "U16", "S16"/"I16"
    /// - "U32", "S32"/"I32"
    /// - "U64", "S64"/"I64"
    /// - "UTF8"/"UTF-8"/"STR"/"TEXT"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "U16" | "UINT16" => Ok(Self::U16),
            "S16" | "I16" | "INT16" => Ok(Self::I16),
            "U32" | "UINT32" => Ok(Self::U32),
            "S32" | "I32" | "INT32" => Ok(Self::I32),
            "U64" | "UINT64" => Ok(Self::U64),
            "S64" | "I64" | "INT64" => Ok(Self::I64),
            "UTF8" | "UTF-8" | "STR" | "TEXT" => Ok(Self::Text),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DataKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Value
// ============================================================================

/// A decoded register value, or a value to be encoded
///
/// `Float` only appears as an encode input; decoding never produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Exact integer view of a numeric value (`None` for floats and text)
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Unsigned(v) => Some(i128::from(*v)),
            Self::Signed(v) => Some(i128::from(*v)),
            Self::Float(_) | Self::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Unsigned(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::Unsigned(u64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Unsigned(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Signed(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Signed(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}
