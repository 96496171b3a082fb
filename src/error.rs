//! Error type shared by the format parser, the encoder and the decoder.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackError>;

/// Everything that can go wrong while packing or unpacking a tuple.
///
/// None of these are recoverable by the codec itself: they mean the format,
/// the values and the bytes disagree. A buffer that was being written when an
/// error surfaced must be thrown away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("format mismatch: wanted '{expected}', format has '{actual}'")]
    FormatMismatch { expected: char, actual: char },

    #[error("no more fields in format")]
    FormatExhausted,

    #[error("value does not fit in a '{field}' field")]
    Overflow { field: char },

    #[error("buffer truncated: field needs {needed} bytes, {available} left")]
    Truncated { needed: usize, available: usize },

    #[error("invalid format string: unexpected '{found}' at position {position}")]
    InvalidFormat { position: usize, found: char },

    #[error("invalid packed integer marker {marker:#04x}")]
    InvalidEncoding { marker: u8 },

    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    #[error("cannot allocate {requested} bytes for a fixed-length field")]
    Allocation { requested: usize },
}

impl PackError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        PackError::Truncated { needed, available }
    }
}
