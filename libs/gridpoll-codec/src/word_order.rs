//! Word ordering for multi-word values
//!
//! Within a word the byte order is always big-endian. What differs between
//! vendors is the order of the 16-bit words when they are combined into a
//! 32 or 64-bit value.
//!
//! For the 32-bit value `0x12345678`:
//! - `HighFirst (ABCD)`: words `[0x1234, 0x5678]`
//! - `LowFirst (CDAB)`: words `[0x5678, 0x1234]`

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// Most significant word at the lowest address (ABCD)
    HighFirst,
    /// Least significant word at the lowest address (CDAB)
    LowFirst,
}

impl WordOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighFirst => "ABCD (high word first)",
            Self::LowFirst => "CDAB (low word first)",
        }
    }

    /// Combine `words` (most significant first after reordering) into one integer
    pub(crate) fn combine(&self, words: &[u16]) -> u64 {
        let fold = |acc: u64, w: &u16| (acc << 16) | u64::from(*w);
        match self {
            Self::HighFirst => words.iter().fold(0, fold),
            Self::LowFirst => words.iter().rev().fold(0, fold),
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-vendor word ordering for 32 and 64-bit kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub order_32: WordOrder,
    pub order_64: WordOrder,
}

impl CodecConfig {
    /// Convention shared by every built-in vendor table:
    /// 32-bit values low word first, 64-bit values high word first.
    pub const STANDARD: Self = Self {
        order_32: WordOrder::LowFirst,
        order_64: WordOrder::HighFirst,
    };
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}
