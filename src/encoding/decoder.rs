//! Reads typed fields back out of a packed buffer.

use tracing::trace;

use super::format::{FieldType, FormatParser, PackOptions};
use super::{varint, FieldSource, FieldValue};
use crate::error::{PackError, Result};

/// Unpacks one tuple, field by field, from a borrowed buffer.
///
/// Strings and byte arrays are returned as slices of the input; nothing is
/// copied until the caller asks for an owned [`FieldValue`].
#[derive(Debug, Clone)]
pub struct Decoder<'f, 'b> {
    format: FormatParser<'f>,
    data: &'b [u8],
    offset: usize,
}

impl<'f, 'b> Decoder<'f, 'b> {
    /// Decoder reading `data` according to `format` with default options.
    pub fn new(format: &'f str, data: &'b [u8]) -> Self {
        Self::with_options(format, data, PackOptions::default())
    }

    /// Decoder reading `data`. In raw mode the whole buffer is one byte array.
    pub fn with_options(format: &'f str, data: &'b [u8], options: PackOptions) -> Self {
        Self {
            format: FormatParser::with_options(format, options),
            data,
            offset: 0,
        }
    }

    /// The parser positioned at the next field to unpack.
    pub fn format(&self) -> &FormatParser<'f> {
        &self.format
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'b [u8] {
        let data = self.data;
        &data[self.offset..]
    }

    /// Start over on a new buffer with the same format.
    pub fn reset(&mut self, data: &'b [u8]) {
        self.format.reset();
        self.data = data;
        self.offset = 0;
    }

    /// Lengths are checked against the buffer before slicing, so a huge
    /// length from the format fails as truncation.
    fn take(&mut self, len: usize) -> Result<&'b [u8]> {
        let rest = self.remaining();
        if rest.len() < len {
            return Err(PackError::truncated(len, rest.len()));
        }
        self.offset += len;
        Ok(&rest[..len])
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

    fn finish_integer(&mut self, type_char: char, read: usize) -> Result<()> {
        trace!(field = %type_char, offset = self.offset, read, "unpacked integer");
        self.offset += read;
        self.format.advance()
    }

    fn read_signed(&mut self, expected: char) -> Result<i64> {
        let (field_type, type_char) = self.integer_field(expected)?;
        let rest = self.remaining();
        let (v, read) = if field_type.is_signed() {
            varint::unpack_int(rest).map_err(|e| rename_overflow(e, type_char))?
        } else {
            let (v, read) = varint::unpack_uint(rest).map_err(|e| rename_overflow(e, type_char))?;
            let v = i64::try_from(v).map_err(|_| PackError::Overflow { field: type_char })?;
            (v, read)
        };
        if !field_type.fits_i64(v) {
            return Err(PackError::Overflow { field: type_char });
        }
        self.finish_integer(type_char, read)?;
        Ok(v)
    }

    fn read_unsigned(&mut self, expected: char) -> Result<u64> {
        let (field_type, type_char) = self.integer_field(expected)?;
        let rest = self.remaining();
        let (v, read) = if field_type.is_signed() {
            let (v, read) = varint::unpack_int(rest).map_err(|e| rename_overflow(e, type_char))?;
            let v = u64::try_from(v).map_err(|_| PackError::Overflow { field: type_char })?;
            (v, read)
        } else {
            varint::unpack_uint(rest).map_err(|e| rename_overflow(e, type_char))?
        };
        if !field_type.fits_u64(v) {
            return Err(PackError::Overflow { field: type_char });
        }
        self.finish_integer(type_char, read)?;
        Ok(v)
    }

    fn get_signed(&mut self, expected: char) -> Result<i64> {
        self.format.check_type(expected, false)?;
        self.read_signed(expected)
    }

    fn get_unsigned(&mut self, expected: char) -> Result<u64> {
        self.format.check_type(expected, false)?;
        self.read_unsigned(expected)
    }

    /// Unpack the current integer field, whatever its width, as `i64`.
    pub fn get_int(&mut self) -> Result<i64> {
        self.read_signed('q')
    }

    /// Unpack the current integer field, whatever its width, as `u64`.
    pub fn get_uint(&mut self) -> Result<u64> {
        self.read_unsigned('Q')
    }

    /// Unpack a `b` or `B` field.
    pub fn get_i8(&mut self) -> Result<i8> {
        let v = self.get_signed('b')?;
        i8::try_from(v).map_err(|_| PackError::Overflow { field: 'b' })
    }

    /// Unpack a `b` or `B` field.
    pub fn get_u8(&mut self) -> Result<u8> {
        let v = self.get_unsigned('B')?;
        u8::try_from(v).map_err(|_| PackError::Overflow { field: 'B' })
    }

    /// Unpack an `h` or `H` field.
    pub fn get_i16(&mut self) -> Result<i16> {
        let v = self.get_signed('h')?;
        i16::try_from(v).map_err(|_| PackError::Overflow { field: 'h' })
    }

    /// Unpack an `h` or `H` field.
    pub fn get_u16(&mut self) -> Result<u16> {
        let v = self.get_unsigned('H')?;
        u16::try_from(v).map_err(|_| PackError::Overflow { field: 'H' })
    }

    /// Unpack an `i`, `I`, `l` or `L` field.
    pub fn get_i32(&mut self) -> Result<i32> {
        let v = self.get_signed('i')?;
        i32::try_from(v).map_err(|_| PackError::Overflow { field: 'i' })
    }

    /// Unpack an `i`, `I`, `l` or `L` field.
    pub fn get_u32(&mut self) -> Result<u32> {
        let v = self.get_unsigned('I')?;
        u32::try_from(v).map_err(|_| PackError::Overflow { field: 'I' })
    }

    /// Unpack a `q` or `Q` field.
    pub fn get_i64(&mut self) -> Result<i64> {
        self.get_signed('q')
    }

    /// Unpack a `q` or `Q` field.
    pub fn get_u64(&mut self) -> Result<u64> {
        self.get_unsigned('Q')
    }

    /// Unpack the record number in an `r` field.
    pub fn get_record_id(&mut self) -> Result<u64> {
        self.get_unsigned('r')
    }

    /// Unpack an `s` or `S` field. Fixed-length fields end at their first
    /// NUL; a bare `S` reads up to and including its terminator.
    pub fn get_str(&mut self) -> Result<&'b str> {
        self.format.check_type('s', false)?;
        let descriptor = self.format.descriptor()?;
        let field = match (descriptor.field_type, descriptor.explicit_length) {
            (FieldType::String, None) => {
                let rest = self.remaining();
                let nul = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| PackError::truncated(rest.len() + 1, rest.len()))?;
                let field = self.take(nul + 1)?;
                &field[..nul]
            }
            (_, length) => {
                let field = self.take(length.unwrap_or(1) as usize)?;
                let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                &field[..end]
            }
        };
        let s = std::str::from_utf8(field).map_err(|_| PackError::InvalidUtf8)?;
        trace!(field = %descriptor.type_char, len = s.len(), "unpacked string");
        self.format.advance()?;
        Ok(s)
    }

    /// Unpack a `u` or `U` field. Without a length from the format the last
    /// field takes the rest of the buffer and any other reads its packed
    /// size first.
    pub fn get_bytes(&mut self) -> Result<&'b [u8]> {
        self.format.check_type('U', false)?;
        let descriptor = self.format.descriptor()?;
        let field = match descriptor.explicit_length {
            Some(length) => self.take(length as usize)?,
            None if self.format.is_last_field() => self.take(self.remaining().len())?,
            None => {
                let (length, read) = varint::unpack_uint(self.remaining())
                    .map_err(|e| rename_overflow(e, descriptor.type_char))?;
                self.offset += read;
                let length = usize::try_from(length)
                    .map_err(|_| PackError::truncated(usize::MAX, self.remaining().len()))?;
                self.take(length)?
            }
        };
        trace!(field = %descriptor.type_char, len = field.len(), "unpacked byte array");
        self.format.advance()?;
        Ok(field)
    }

    /// Unpack the current field as whatever type the format declares.
    pub fn get_field(&mut self) -> Result<FieldValue> {
        let field_type = self.format.descriptor()?.field_type;
        if field_type.is_integer() {
            if field_type.is_signed() {
                self.get_int().map(FieldValue::Int)
            } else {
                self.get_uint().map(FieldValue::UInt)
            }
        } else if field_type.is_string() {
            self.get_str().map(|s| FieldValue::Str(s.to_owned()))
        } else {
            self.get_bytes().map(|b| FieldValue::Bytes(b.to_vec()))
        }
    }
}

/// The varint layer does not know which field it is reading for.
fn rename_overflow(error: PackError, field: char) -> PackError {
    match error {
        PackError::Overflow { .. } => PackError::Overflow { field },
        other => other,
    }
}

impl FieldSource for Decoder<'_, '_> {
    fn next_field(&mut self) -> Result<Option<FieldValue>> {
        if self.format.is_exhausted() {
            return Ok(None);
        }
        self.get_field().map(Some)
    }
}
