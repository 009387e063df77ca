//! Register word codec
//!
//! Decoding is bit-exact:
//! - `U16`: the word itself
//! - `I16`: two's complement on bit 15
//! - `U32`/`I32`: two words combined per `CodecConfig::order_32`
//! - `U64`/`I64`: four words combined per `CodecConfig::order_64`
//! - `Text`: big-endian byte pairs, trailing NULs trimmed, UTF-8
//!
//! Encoding is only defined for `U16`. Everything else is rejected as
//! unsupported rather than guessed.

use crate::error::{DecodeError, EncodeError};
use crate::kind::{DataKind, Value};
use crate::word_order::CodecConfig;
use tracing::trace;

/// Decode with the standard word ordering
pub fn decode(words: &[u16], kind: DataKind) -> Result<Value, DecodeError> {
    decode_with(words, kind, &CodecConfig::STANDARD)
}

/// Decode `words` as `kind` using a vendor-specific word ordering
///
/// Extra trailing words are ignored for fixed-width kinds; text consumes
/// every word it is given.
pub fn decode_with(
    words: &[u16],
    kind: DataKind,
    config: &CodecConfig,
) -> Result<Value, DecodeError> {
    let value = match kind {
        DataKind::U16 => {
            let w = leading(words, kind, 1)?;
            Value::Unsigned(u64::from(w[0]))
        },
        DataKind::I16 => {
            let w = leading(words, kind, 1)?;
            Value::Signed(twos_complement_16(w[0]))
        },
        DataKind::U32 => {
            let w = leading(words, kind, 2)?;
            Value::Unsigned(config.order_32.combine(w))
        },
        DataKind::I32 => {
            let w = leading(words, kind, 2)?;
            Value::Signed(i64::from(config.order_32.combine(w) as u32 as i32))
        },
        DataKind::U64 => {
            let w = leading(words, kind, 4)?;
            Value::Unsigned(config.order_64.combine(w))
        },
        DataKind::I64 => {
            let w = leading(words, kind, 4)?;
            Value::Signed(config.order_64.combine(w) as i64)
        },
        DataKind::Text => decode_text(words)?,
    };

    trace!("Decoded {:?} as {} -> {}", words, kind, value);
    Ok(value)
}

/// Encode `value` into register words for `kind`
///
/// Only integral values into `U16` are supported. Floats, text and wider
/// kinds return `EncodeError::Unsupported`, which callers must keep distinct
/// from `EncodeError::OutOfRange`. A single word has no word order, so there
/// is no vendor-config variant.
pub fn encode(value: &Value, kind: DataKind) -> Result<Vec<u16>, EncodeError> {
    let raw = match value {
        Value::Float(v) => {
            return Err(EncodeError::Unsupported {
                kind,
                reason: format!("floating-point value {v} cannot be written"),
            });
        },
        Value::Text(_) => {
            return Err(EncodeError::Unsupported {
                kind,
                reason: "text values cannot be written".to_string(),
            });
        },
        Value::Unsigned(v) => i128::from(*v),
        Value::Signed(v) => i128::from(*v),
    };

    match kind {
        DataKind::U16 => {
            let (min, max) = (0, i128::from(u16::MAX));
            if raw < min || raw > max {
                return Err(EncodeError::OutOfRange {
                    kind,
                    value: raw,
                    min,
                    max,
                });
            }
            trace!("Encoded {} as U16 -> [{}]", raw, raw);
            Ok(vec![raw as u16])
        },
        _ => Err(EncodeError::Unsupported {
            kind,
            reason: "only U16 registers are writable".to_string(),
        }),
    }
}

/// Pack `text` into `word_count` words, two bytes per word, NUL padded
///
/// Used to seed simulated register banks; text longer than the capacity is
/// rejected.
pub fn words_from_text(text: &str, word_count: usize) -> Result<Vec<u16>, EncodeError> {
    let bytes = text.as_bytes();
    let capacity = word_count * 2;
    if bytes.len() > capacity {
        return Err(EncodeError::OutOfRange {
            kind: DataKind::Text,
            value: bytes.len() as i128,
            min: 0,
            max: capacity as i128,
        });
    }

    let mut padded = bytes.to_vec();
    padded.resize(capacity, 0);
    Ok(padded
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

// ============================================================================
// Helpers
// ============================================================================

fn leading(words: &[u16], kind: DataKind, count: usize) -> Result<&[u16], DecodeError> {
    words
        .get(..count)
        .ok_or(DecodeError::InsufficientWords {
            kind,
            expected: count,
            actual: words.len(),
        })
}

fn twos_complement_16(word: u16) -> i64 {
    let v = i64::from(word);
    if v >= 0x8000 {
        v - 0x1_0000
    } else {
        v
    }
}

fn decode_text(words: &[u16]) -> Result<Value, DecodeError> {
    if words.is_empty() {
        return Err(DecodeError::InsufficientWords {
            kind: DataKind::Text,
            expected: 1,
            actual: 0,
        });
    }

    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    String::from_utf8(bytes)
        .map(Value::Text)
        .map_err(|e| DecodeError::InvalidText(e.to_string()))
}
