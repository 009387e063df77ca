//! gridpoll register codec
//!
//! Pure conversion between sequences of 16-bit register words and typed
//! values. The codec knows nothing about addresses, scaling or transports.
//!
//! ```text
//! words ──decode(kind)──▶ Value        Value ──encode(kind)──▶ words
//! ```

pub mod codec;
pub mod error;
pub mod kind;
pub mod word_order;

pub use codec::{decode, decode_with, encode, words_from_text};
pub use error::{DecodeError, EncodeError, ParseKindError};
pub use kind::{DataKind, Value};
pub use word_order::{CodecConfig, WordOrder};
