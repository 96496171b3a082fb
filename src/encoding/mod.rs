//! Format-driven packing of typed tuples into order-preserving bytes.
//!
//! [`FormatParser`] walks the format string, [`Encoder`] and [`Decoder`]
//! move values in and out of bytes one field at a time, and [`varint`] holds
//! the integer layout both of them share.

mod decoder;
mod encoder;
mod format;
pub mod varint;

use serde::{Deserialize, Serialize};

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use format::{FieldDescriptor, FieldType, FormatParser, PackOptions};

use crate::error::Result;

/// One field of a tuple, typed loosely enough to travel through
/// [`encode`](crate::encode) and [`decode`](crate::decode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldValue {
    /// Any signed integer field.
    Int(i64),
    /// Any unsigned integer field, `r` included.
    UInt(u64),
    /// `s` or `S`.
    Str(String),
    /// `u` or `U`.
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// The widest format character this value would pack into.
    pub fn type_char(&self) -> char {
        match self {
            FieldValue::Int(_) => 'q',
            FieldValue::UInt(_) => 'Q',
            FieldValue::Str(_) => 'S',
            FieldValue::Bytes(_) => 'U',
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// Something tuple fields can be written to, one at a time.
pub trait FieldSink {
    /// Write one value into the current field.
    fn put_field(&mut self, value: &FieldValue) -> Result<()>;

    /// Write every value in order, stopping at the first error.
    fn put_fields<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        for value in values {
            self.put_field(&value.into())?;
        }
        Ok(())
    }
}

/// Something tuple fields can be read from, one at a time.
pub trait FieldSource {
    /// The next field, or `None` once the format has no more.
    fn next_field(&mut self) -> Result<Option<FieldValue>>;

    /// Read every remaining field, stopping at the first error.
    fn collect_fields(&mut self) -> Result<Vec<FieldValue>> {
        let mut fields = Vec::new();
        while let Some(field) = self.next_field()? {
            fields.push(field);
        }
        Ok(fields)
    }
}
