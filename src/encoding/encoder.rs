//! Appends typed fields to a buffer following a format string.

use bytes::Bytes;
use tracing::trace;

use super::format::{FieldType, FormatParser, PackOptions};
use super::{varint, FieldSink, FieldValue};
use crate::error::{PackError, Result};

/// Packs one tuple, field by field.
///
/// Each `add_*` call checks the requested type against the current field of
/// the format before touching the buffer. On error the buffer may hold a
/// partial tuple and should be discarded.
#[derive(Debug, Clone)]
pub struct Encoder<'f> {
    format: FormatParser<'f>,
    buffer: Vec<u8>,
}

impl<'f> Encoder<'f> {
    /// Encoder for `format` with default options and an empty buffer.
    pub fn new(format: &'f str) -> Self {
        Self::with_options(format, PackOptions::default())
    }

    /// Encoder for `format`. See [`PackOptions`] for raw mode.
    pub fn with_options(format: &'f str, options: PackOptions) -> Self {
        Self {
            format: FormatParser::with_options(format, options),
            buffer: Vec::new(),
        }
    }

    /// The parser positioned at the next field to pack.
    pub fn format(&self) -> &FormatParser<'f> {
        &self.format
    }

    /// Copy of the bytes packed so far. The encoder keeps its state.
    pub fn value(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// The bytes packed so far, borrowed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Give up the encoder and keep its buffer without copying.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }

    /// Number of bytes packed so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True until a field with a non-empty encoding has been packed.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and rewind the format for another tuple.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.format.reset();
    }

    fn integer_field(&self, expected: char) -> Result<(FieldType, char)> {
        let descriptor = self.format.descriptor()?;
        if !descriptor.field_type.is_integer() {
            return Err(PackError::FormatMismatch {
                expected,
                actual: descriptor.type_char,
            });
        }
        Ok((descriptor.field_type, descriptor.type_char))
    }

    fn pack_signed(&mut self, field_type: FieldType, type_char: char, v: i64) -> Result<()> {
        if !field_type.fits_i64(v) {
            return Err(PackError::Overflow { field: type_char });
        }
        if field_type.is_signed() {
            self.buffer.reserve(varint::int_len(v));
            varint::pack_int(&mut self.buffer, v);
        } else {
            self.buffer.reserve(varint::uint_len(v as u64));
            varint::pack_uint(&mut self.buffer, v as u64);
        }
        trace!(field = %type_char, value = v, "packed integer");
        self.format.advance()
    }

    fn pack_unsigned(&mut self, field_type: FieldType, type_char: char, v: u64) -> Result<()> {
        if !field_type.fits_u64(v) {
            return Err(PackError::Overflow { field: type_char });
        }
        if field_type.is_signed() {
            self.buffer.reserve(varint::int_len(v as i64));
            varint::pack_int(&mut self.buffer, v as i64);
        } else {
            self.buffer.reserve(varint::uint_len(v));
            varint::pack_uint(&mut self.buffer, v);
        }
        trace!(field = %type_char, value = v, "packed integer");
        self.format.advance()
    }

    fn add_signed(&mut self, expected: char, v: i64) -> Result<()> {
        self.format.check_type(expected, false)?;
        let (field_type, type_char) = self.integer_field(expected)?;
        self.pack_signed(field_type, type_char, v)
    }

    fn add_unsigned(&mut self, expected: char, v: u64) -> Result<()> {
        self.format.check_type(expected, false)?;
        let (field_type, type_char) = self.integer_field(expected)?;
        self.pack_unsigned(field_type, type_char, v)
    }

    /// Pack into whatever integer field is current, signed or not.
    pub fn add_int(&mut self, v: i64) -> Result<()> {
        let (field_type, type_char) = self.integer_field('q')?;
        self.pack_signed(field_type, type_char, v)
    }

    /// Unsigned counterpart of [`Encoder::add_int`].
    pub fn add_uint(&mut self, v: u64) -> Result<()> {
        let (field_type, type_char) = self.integer_field('Q')?;
        self.pack_unsigned(field_type, type_char, v)
    }

    /// Pack into a `b` or `B` field.
    pub fn add_i8(&mut self, v: i8) -> Result<()> {
        self.add_signed('b', v.into())
    }

    /// Pack into a `b` or `B` field.
    pub fn add_u8(&mut self, v: u8) -> Result<()> {
        self.add_unsigned('B', v.into())
    }

    /// Pack into an `h` or `H` field.
    pub fn add_i16(&mut self, v: i16) -> Result<()> {
        self.add_signed('h', v.into())
    }

    /// Pack into an `h` or `H` field.
    pub fn add_u16(&mut self, v: u16) -> Result<()> {
        self.add_unsigned('H', v.into())
    }

    /// Pack into an `i`, `I`, `l` or `L` field.
    pub fn add_i32(&mut self, v: i32) -> Result<()> {
        self.add_signed('i', v.into())
    }

    /// Pack into an `i`, `I`, `l` or `L` field.
    pub fn add_u32(&mut self, v: u32) -> Result<()> {
        self.add_unsigned('I', v.into())
    }

    /// Pack into a `q` or `Q` field.
    pub fn add_i64(&mut self, v: i64) -> Result<()> {
        self.add_signed('q', v)
    }

    /// Pack into a `q` or `Q` field.
    pub fn add_u64(&mut self, v: u64) -> Result<()> {
        self.add_unsigned('Q', v)
    }

    /// Pack a record number into an `r` field.
    pub fn add_record_id(&mut self, v: u64) -> Result<()> {
        self.add_unsigned('r', v)
    }

    /// Pack a string into an `s` or `S` field.
    ///
    /// With a length from the format the bytes are cut or NUL padded to it;
    /// a bare `s` is one byte long. A bare `S` is written up to its first
    /// NUL and terminated.
    pub fn add_str(&mut self, value: &str) -> Result<()> {
        self.format.check_type('s', false)?;
        let descriptor = self.format.descriptor()?;
        let bytes = value.as_bytes();
        match (descriptor.field_type, descriptor.explicit_length) {
            (FieldType::String, None) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                self.buffer.extend_from_slice(&bytes[..end]);
                self.buffer.push(0);
            }
            (_, length) => {
                let length = length.unwrap_or(1) as usize;
                self.put_fixed(bytes, length)?;
            }
        }
        trace!(field = %descriptor.type_char, len = bytes.len(), "packed string");
        self.format.advance()
    }

    /// Pack a byte array into a `u` or `U` field.
    ///
    /// A length from the format cuts or zero pads the value and nothing else
    /// is stored. Without one, the size is packed in front of the bytes
    /// unless this is the last field.
    pub fn add_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.format.check_type('U', false)?;
        let descriptor = self.format.descriptor()?;
        match descriptor.explicit_length {
            Some(length) => self.put_fixed(value, length as usize)?,
            None => {
                if !self.format.is_last_field() {
                    varint::pack_uint(&mut self.buffer, value.len() as u64);
                }
                self.buffer.extend_from_slice(value);
            }
        }
        trace!(field = %descriptor.type_char, len = value.len(), "packed byte array");
        self.format.advance()
    }

    /// Lengths come from the format and go up to `u32::MAX`, so the
    /// reservation is fallible.
    fn put_fixed(&mut self, value: &[u8], length: usize) -> Result<()> {
        self.buffer
            .try_reserve(length)
            .map_err(|_| PackError::Allocation { requested: length })?;
        let take = value.len().min(length);
        self.buffer.extend_from_slice(&value[..take]);
        self.buffer.resize(self.buffer.len() + (length - take), 0);
        Ok(())
    }

    /// Pack a dynamically typed value into the current field.
    pub fn add_field(&mut self, value: &FieldValue) -> Result<()> {
        let descriptor = self.format.descriptor()?;
        let field_type = descriptor.field_type;
        match value {
            FieldValue::Int(v) if field_type.is_integer() => {
                self.pack_signed(field_type, descriptor.type_char, *v)
            }
            FieldValue::UInt(v) if field_type.is_integer() => {
                self.pack_unsigned(field_type, descriptor.type_char, *v)
            }
            FieldValue::Str(s) if field_type.is_string() => self.add_str(s),
            FieldValue::Bytes(b) if field_type.is_byte_array() => self.add_bytes(b),
            other => Err(PackError::FormatMismatch {
                expected: other.type_char(),
                actual: descriptor.type_char,
            }),
        }
    }
}

impl FieldSink for Encoder<'_> {
    fn put_field(&mut self, value: &FieldValue) -> Result<()> {
        self.add_field(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_follow_format_signedness() {
        let mut encoder = Encoder::new("iIq");
        encoder.add_i32(-1).unwrap();
        encoder.add_u32(1).unwrap();
        encoder.add_i64(8256).unwrap();
        assert_eq!(encoder.as_bytes(), [0x7f, 0x81, 0xe1, 0x00]);
        assert!(encoder.format().is_exhausted());
    }

    #[test]
    fn typed_adds_check_width_family() {
        let mut encoder = Encoder::new("hL");
        assert_eq!(
            encoder.add_i32(1),
            Err(PackError::FormatMismatch {
                expected: 'i',
                actual: 'h'
            })
        );
        encoder.add_u16(7).unwrap();
        encoder.add_i32(7).unwrap();
        assert_eq!(encoder.as_bytes(), [0x87, 0x87]);
    }

    #[test]
    fn out_of_range_values_overflow() {
        assert_eq!(
            Encoder::new("Q").add_i64(-1),
            Err(PackError::Overflow { field: 'Q' })
        );
        assert_eq!(
            Encoder::new("b").add_int(128),
            Err(PackError::Overflow { field: 'b' })
        );
        assert_eq!(
            Encoder::new("H").add_uint(65536),
            Err(PackError::Overflow { field: 'H' })
        );
        assert_eq!(
            Encoder::new("q").add_uint(u64::MAX),
            Err(PackError::Overflow { field: 'q' })
        );
        assert_eq!(
            Encoder::new("r").add_int(-5),
            Err(PackError::Overflow { field: 'r' })
        );
        let mut encoder = Encoder::new("I");
        encoder.add_i32(i32::MAX).unwrap();
        assert_eq!(encoder.len(), 5);
    }

    #[test]
    fn repeated_fields() {
        let mut encoder = Encoder::new("3B");
        for v in [1, 2, 3] {
            encoder.add_u8(v).unwrap();
        }
        assert_eq!(encoder.add_u8(4), Err(PackError::FormatExhausted));
        assert_eq!(encoder.as_bytes(), [0x81, 0x82, 0x83]);
    }

    #[test]
    fn strings_are_padded_or_terminated() {
        let mut encoder = Encoder::new("10sS");
        encoder.add_str("aaaaa").unwrap();
        encoder.add_str("x").unwrap();
        assert_eq!(encoder.as_bytes(), b"aaaaa\0\0\0\0\0x\0");

        let mut encoder = Encoder::new("s3SS");
        encoder.add_str("abc").unwrap();
        encoder.add_str("abcdef").unwrap();
        encoder.add_str("cut\0here").unwrap();
        assert_eq!(encoder.as_bytes(), b"aabccut\0");
    }

    #[test]
    fn byte_array_length_prefix_only_when_needed() {
        let mut encoder = Encoder::new("uiS");
        encoder.add_bytes(b"abc").unwrap();
        encoder.add_i32(7).unwrap();
        encoder.add_str("end").unwrap();
        assert_eq!(encoder.as_bytes(), b"\x83abc\x87end\0");

        let mut encoder = Encoder::new("U");
        encoder.add_bytes(b"abc").unwrap();
        assert_eq!(encoder.as_bytes(), b"abc");

        let mut encoder = Encoder::new("4uU");
        encoder.add_bytes(b"ab").unwrap();
        encoder.add_bytes(b"abcdef").unwrap();
        assert_eq!(encoder.as_bytes(), b"ab\0\0abcdef");
    }

    #[test]
    fn oversized_fixed_length_is_an_error() {
        let mut encoder = Encoder::new("3s");
        assert_eq!(
            encoder.put_fixed(b"abc", usize::MAX),
            Err(PackError::Allocation {
                requested: usize::MAX
            })
        );
        assert!(encoder.is_empty());
        encoder.add_str("abc").unwrap();
        assert_eq!(encoder.as_bytes(), b"abc");
    }

    #[test]
    fn raw_mode_ignores_format() {
        let mut encoder = Encoder::with_options("iS", PackOptions { raw: true });
        encoder.add_bytes(b"\x01\x02").unwrap();
        assert_eq!(encoder.as_bytes(), [1, 2]);
        assert_eq!(
            encoder.add_bytes(b"more"),
            Err(PackError::FormatExhausted)
        );
    }

    #[test]
    fn add_field_dispatches_on_format() {
        let mut encoder = Encoder::new("hSu");
        encoder.add_field(&FieldValue::Int(-2)).unwrap();
        assert_eq!(
            encoder.add_field(&FieldValue::Int(3)),
            Err(PackError::FormatMismatch {
                expected: 'q',
                actual: 'S'
            })
        );
        encoder.add_field(&FieldValue::Str("k".into())).unwrap();
        encoder.add_field(&FieldValue::Bytes(vec![9])).unwrap();
        assert_eq!(encoder.as_bytes(), [0x7e, b'k', 0, 9]);
    }

    #[test]
    fn value_and_reset() {
        let mut encoder = Encoder::new("q");
        encoder.add_i64(1).unwrap();
        let first = encoder.value();
        assert_eq!(&first[..], [0x81]);
        assert_eq!(encoder.value(), first);

        encoder.reset();
        assert!(encoder.is_empty());
        encoder.add_i64(2).unwrap();
        assert_eq!(&first[..], [0x81]);
        assert_eq!(encoder.into_bytes(), Bytes::from_static(&[0x82]));
    }
}
