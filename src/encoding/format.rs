//! Incremental cursor over a pack format string.
//!
//! A format is a run of fields, each an optional decimal count followed by a
//! type character, with the layout markers `@ = < > ! x` allowed around the
//! count and ignored. Before `s`, `S`, `u` and `U` the count is a byte
//! length; before any integer type it repeats the field, so `3i` reads as
//! `iii`.
//!
//! The parser never expands the format into a list. It keeps a byte offset
//! to the current field and, for repeated integer fields, how many
//! repetitions are left.

use crate::error::{PackError, Result};

const LAYOUT_MARKERS: &[u8] = b"@=<>!x";

/// Knobs shared by [`FormatParser`], [`Encoder`](super::Encoder) and
/// [`Decoder`](super::Decoder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackOptions {
    /// Ignore the format and treat the whole value as one unsized byte
    /// array, the way raw cursors see their keys and values.
    pub raw: bool,
}

/// The type a format character declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// `r`: a 64-bit record number, always packed unsigned.
    RecordId,
    /// `s`: fixed length, NUL padded.
    FixedString,
    /// `S`: NUL terminated unless the format gives a length.
    String,
    /// `u`: no stored length.
    RawBytes,
    /// `U`: length stored in front unless it is the last field.
    SizedBytes,
}

impl FieldType {
    /// Map a type character to its field type. `l`/`L` are aliases of
    /// `i`/`I`; layout markers and digits are not type characters.
    pub fn from_char(c: char) -> Option<Self> {
        let field_type = match c {
            'b' => FieldType::Int8,
            'B' => FieldType::UInt8,
            'h' => FieldType::Int16,
            'H' => FieldType::UInt16,
            'i' | 'l' => FieldType::Int32,
            'I' | 'L' => FieldType::UInt32,
            'q' => FieldType::Int64,
            'Q' => FieldType::UInt64,
            'r' => FieldType::RecordId,
            's' => FieldType::FixedString,
            'S' => FieldType::String,
            'u' => FieldType::RawBytes,
            'U' => FieldType::SizedBytes,
            _ => return None,
        };
        Some(field_type)
    }

    /// Integer fields take a repeat count and are packed as varints.
    pub fn is_integer(self) -> bool {
        !matches!(
            self,
            FieldType::FixedString | FieldType::String | FieldType::RawBytes | FieldType::SizedBytes
        )
    }

    /// `s` or `S`.
    pub fn is_string(self) -> bool {
        matches!(self, FieldType::FixedString | FieldType::String)
    }

    /// `u` or `U`.
    pub fn is_byte_array(self) -> bool {
        matches!(self, FieldType::RawBytes | FieldType::SizedBytes)
    }

    /// Signed integers use the signed varint rule. `r` is unsigned.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64
        )
    }

    /// Whether a signed value is representable by this integer type.
    pub fn fits_i64(self, v: i64) -> bool {
        match self {
            FieldType::Int8 => i8::try_from(v).is_ok(),
            FieldType::UInt8 => u8::try_from(v).is_ok(),
            FieldType::Int16 => i16::try_from(v).is_ok(),
            FieldType::UInt16 => u16::try_from(v).is_ok(),
            FieldType::Int32 => i32::try_from(v).is_ok(),
            FieldType::UInt32 => u32::try_from(v).is_ok(),
            FieldType::Int64 => true,
            FieldType::UInt64 | FieldType::RecordId => v >= 0,
            _ => false,
        }
    }

    /// Whether an unsigned value is representable by this integer type.
    pub fn fits_u64(self, v: u64) -> bool {
        match self {
            FieldType::Int8 => i8::try_from(v).is_ok(),
            FieldType::UInt8 => u8::try_from(v).is_ok(),
            FieldType::Int16 => i16::try_from(v).is_ok(),
            FieldType::UInt16 => u16::try_from(v).is_ok(),
            FieldType::Int32 => i32::try_from(v).is_ok(),
            FieldType::UInt32 => u32::try_from(v).is_ok(),
            FieldType::Int64 => i64::try_from(v).is_ok(),
            FieldType::UInt64 | FieldType::RecordId => true,
            _ => false,
        }
    }
}

/// The field under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    /// The character as written in the format (`l` stays `l`).
    pub type_char: char,
    /// Byte length declared for a string or byte array field.
    pub explicit_length: Option<u32>,
    /// Repetitions of an integer field still to come, this one included.
    pub repeat_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct Scan {
    count: Option<u32>,
    type_pos: usize,
    type_char: char,
    field_type: FieldType,
}

/// Two format characters name the same kind of field. Signedness is decided
/// by the format, so the comparison ignores case; `i` and `l` are synonyms.
fn same_kind(expected: char, actual: char) -> bool {
    let expected = expected.to_ascii_lowercase();
    let actual = actual.to_ascii_lowercase();
    expected == actual || (matches!(expected, 'i' | 'l') && matches!(actual, 'i' | 'l'))
}

fn skip_markers(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && LAYOUT_MARKERS.contains(&bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Cursor over the fields of a format string.
///
/// Cheap to clone. The position only moves forward until [`reset`]
/// rewinds it.
///
/// [`reset`]: FormatParser::reset
#[derive(Debug, Clone)]
pub struct FormatParser<'a> {
    source: &'a str,
    fields: &'a str,
    options: PackOptions,
    pos: usize,
    repeat: u32,
}

impl<'a> FormatParser<'a> {
    /// Parser over `format` with default options.
    pub fn new(format: &'a str) -> Self {
        Self::with_options(format, PackOptions::default())
    }

    /// Parser over `format`. In raw mode the format text is kept for
    /// [`format`](Self::format) but the fields are a single `u`.
    pub fn with_options(format: &'a str, options: PackOptions) -> Self {
        Self {
            source: format,
            fields: if options.raw { "u" } else { format },
            options,
            pos: 0,
            repeat: 0,
        }
    }

    /// The format string this parser was built from.
    pub fn format(&self) -> &'a str {
        self.source
    }

    /// Options given at construction.
    pub fn options(&self) -> PackOptions {
        self.options
    }

    /// Byte offset of the current field in the format string.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rewind to the first field.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.repeat = 0;
    }

    fn scan_at(&self, mut pos: usize) -> Result<Option<Scan>> {
        let bytes = self.fields.as_bytes();
        loop {
            pos = skip_markers(bytes, pos);
            let digits_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let count = if pos > digits_start {
                let count = self.fields[digits_start..pos].parse::<u32>().map_err(|_| {
                    PackError::InvalidFormat {
                        position: digits_start,
                        found: char::from(bytes[digits_start]),
                    }
                })?;
                Some(count)
            } else {
                None
            };
            pos = skip_markers(bytes, pos);

            let Some(type_char) = self.fields[pos..].chars().next() else {
                return match count {
                    Some(_) => Err(PackError::InvalidFormat {
                        position: digits_start,
                        found: char::from(bytes[digits_start]),
                    }),
                    None => Ok(None),
                };
            };
            let field_type = FieldType::from_char(type_char).ok_or(PackError::InvalidFormat {
                position: pos,
                found: type_char,
            })?;

            // `0i` declares no fields at all.
            if count == Some(0) && field_type.is_integer() {
                pos += type_char.len_utf8();
                continue;
            }
            return Ok(Some(Scan {
                count,
                type_pos: pos,
                type_char,
                field_type,
            }));
        }
    }

    fn current(&self) -> Result<Scan> {
        self.scan_at(self.pos)?.ok_or(PackError::FormatExhausted)
    }

    /// True once every declared field has been passed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.scan_at(self.pos), Ok(None))
    }

    /// Type character of the current field, as written in the format.
    pub fn current_type(&self) -> Result<char> {
        Ok(self.current()?.type_char)
    }

    /// The current field with its length or remaining repetitions.
    pub fn descriptor(&self) -> Result<FieldDescriptor> {
        let scan = self.current()?;
        let (explicit_length, repeat_count) = if scan.field_type.is_integer() {
            let repeat = match self.repeat {
                0 => scan.count.unwrap_or(1),
                left => left,
            };
            (None, repeat)
        } else {
            (scan.count, 1)
        };
        Ok(FieldDescriptor {
            field_type: scan.field_type,
            type_char: scan.type_char,
            explicit_length,
            repeat_count,
        })
    }

    /// Whether a count precedes the current type character.
    pub fn has_explicit_length(&self) -> bool {
        matches!(self.scan_at(self.pos), Ok(Some(Scan { count: Some(_), .. })))
    }

    /// The count in front of the current type character, 1 when there is
    /// none. With `advance` the cursor moves past the length of a string or
    /// byte array so only the type character remains. On an integer the
    /// count is a repeat count and the cursor stays put.
    pub fn explicit_length(&mut self, advance: bool) -> Result<u32> {
        let scan = self.current()?;
        if advance && !scan.field_type.is_integer() {
            self.pos = scan.type_pos;
        }
        Ok(scan.count.unwrap_or(1))
    }

    /// Fail with [`PackError::FormatMismatch`] unless the current field is
    /// of the same kind as `expected`, ignoring case. With `consume` the
    /// field is passed as well.
    pub fn check_type(&mut self, expected: char, consume: bool) -> Result<()> {
        let actual = self.current_type()?;
        if !same_kind(expected, actual) {
            return Err(PackError::FormatMismatch { expected, actual });
        }
        if consume {
            self.advance()?;
        }
        Ok(())
    }

    /// Move past the current field, or past one repetition of it.
    pub fn advance(&mut self) -> Result<()> {
        let scan = self.current()?;
        if let (true, Some(count)) = (scan.field_type.is_integer(), scan.count) {
            if self.repeat == 0 {
                self.repeat = count;
            }
            if self.repeat > 1 {
                self.repeat -= 1;
                return Ok(());
            }
            self.repeat = 0;
        }
        self.pos = scan.type_pos + scan.type_char.len_utf8();
        Ok(())
    }

    /// Fields left including the current one. Counts in front of later
    /// fields are not expanded, so this is exact only for telling whether
    /// the current field is the last.
    pub fn remaining_field_count_approx(&self) -> u32 {
        let Ok(scan) = self.current() else {
            return 0;
        };
        let current = match (self.repeat, scan.field_type.is_integer()) {
            (0, true) => scan.count.unwrap_or(1),
            (0, false) => 1,
            (left, _) => left,
        };
        let later = self.fields[scan.type_pos + scan.type_char.len_utf8()..]
            .bytes()
            .filter(|b| b.is_ascii_alphabetic() && !LAYOUT_MARKERS.contains(b))
            .count();
        current.saturating_add(u32::try_from(later).unwrap_or(u32::MAX))
    }

    /// Whether the current field is the final one, which decides if an
    /// unsized byte array carries its length.
    pub fn is_last_field(&self) -> bool {
        self.remaining_field_count_approx() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(format: &str) -> Vec<char> {
        let mut parser = FormatParser::new(format);
        let mut types = Vec::new();
        while !parser.is_exhausted() {
            types.push(parser.current_type().unwrap());
            parser.advance().unwrap();
        }
        types
    }

    #[test]
    fn walks_plain_fields() {
        assert_eq!(walk("iSqU"), ['i', 'S', 'q', 'U']);
        assert_eq!(walk(""), Vec::<char>::new());
    }

    #[test]
    fn expands_repeat_counts_for_integers_only() {
        assert_eq!(walk("3hS"), ['h', 'h', 'h', 'S']);
        assert_eq!(walk("10s2u"), ['s', 'u']);
        assert_eq!(walk("0iQ"), ['Q']);
    }

    #[test]
    fn skips_layout_markers() {
        assert_eq!(walk("<i>2!Q@x=s"), ['i', 'Q', 'Q', 's']);
        assert_eq!(walk("i<"), ['i']);
    }

    #[test]
    fn explicit_lengths() {
        let mut parser = FormatParser::new("10sS");
        assert!(parser.has_explicit_length());
        let descriptor = parser.descriptor().unwrap();
        assert_eq!(descriptor.field_type, FieldType::FixedString);
        assert_eq!(descriptor.explicit_length, Some(10));
        assert_eq!(parser.explicit_length(true).unwrap(), 10);
        assert_eq!(parser.current_type().unwrap(), 's');
        assert!(!parser.has_explicit_length());
        parser.advance().unwrap();
        assert!(!parser.has_explicit_length());
        assert_eq!(parser.explicit_length(false).unwrap(), 1);
        assert_eq!(parser.descriptor().unwrap().explicit_length, None);
    }

    #[test]
    fn explicit_length_keeps_repeat_counts() {
        let mut parser = FormatParser::new("2i3q");
        parser.advance().unwrap();
        assert_eq!(parser.explicit_length(true).unwrap(), 2);
        assert_eq!(parser.descriptor().unwrap().repeat_count, 1);
        parser.advance().unwrap();
        assert_eq!(parser.current_type().unwrap(), 'q');
        assert_eq!(parser.descriptor().unwrap().repeat_count, 3);

        let mut q_fields = 0;
        while !parser.is_exhausted() {
            parser.explicit_length(true).unwrap();
            parser.advance().unwrap();
            q_fields += 1;
        }
        assert_eq!(q_fields, 3);
    }

    #[test]
    fn repeat_count_in_descriptor() {
        let mut parser = FormatParser::new("3i");
        assert_eq!(parser.descriptor().unwrap().repeat_count, 3);
        assert_eq!(parser.descriptor().unwrap().explicit_length, None);
        parser.advance().unwrap();
        assert_eq!(parser.descriptor().unwrap().repeat_count, 2);
        parser.advance().unwrap();
        assert!(parser.is_last_field());
        parser.advance().unwrap();
        assert!(parser.is_exhausted());
    }

    #[test]
    fn check_type_is_case_insensitive() {
        let mut parser = FormatParser::new("Ql");
        parser.check_type('q', true).unwrap();
        parser.check_type('i', false).unwrap();
        assert_eq!(parser.current_type().unwrap(), 'l');
        assert_eq!(
            parser.check_type('s', false),
            Err(PackError::FormatMismatch {
                expected: 's',
                actual: 'l'
            })
        );
        parser.check_type('I', true).unwrap();
        assert_eq!(parser.check_type('q', false), Err(PackError::FormatExhausted));
        assert_eq!(parser.advance(), Err(PackError::FormatExhausted));
    }

    #[test]
    fn last_field_detection() {
        let mut parser = FormatParser::new("uiS");
        assert_eq!(parser.remaining_field_count_approx(), 3);
        assert!(!parser.is_last_field());
        parser.advance().unwrap();
        parser.advance().unwrap();
        assert!(parser.is_last_field());
        assert_eq!(FormatParser::new("2U").remaining_field_count_approx(), 1);
        assert_eq!(FormatParser::new("2q").remaining_field_count_approx(), 2);
        assert_eq!(FormatParser::new("Ux").remaining_field_count_approx(), 1);
    }

    #[test]
    fn rejects_malformed_formats() {
        let mut parser = FormatParser::new("iz");
        assert_eq!(parser.current_type(), Ok('i'));
        parser.advance().unwrap();
        assert_eq!(
            parser.current_type(),
            Err(PackError::InvalidFormat {
                position: 1,
                found: 'z'
            })
        );
        assert!(!parser.is_exhausted());
        let mut dangling = FormatParser::new("i12");
        dangling.advance().unwrap();
        assert_eq!(
            dangling.current_type(),
            Err(PackError::InvalidFormat {
                position: 1,
                found: '1'
            })
        );
        assert!(matches!(
            FormatParser::new("99999999999s").current_type(),
            Err(PackError::InvalidFormat { position: 0, .. })
        ));
    }

    #[test]
    fn raw_mode_sees_one_byte_array() {
        let mut parser = FormatParser::with_options("iS", PackOptions { raw: true });
        assert_eq!(parser.format(), "iS");
        assert_eq!(parser.current_type().unwrap(), 'u');
        assert!(parser.is_last_field());
        parser.advance().unwrap();
        assert!(parser.is_exhausted());
    }

    #[test]
    fn reset_rewinds() {
        let mut parser = FormatParser::new("2hq");
        parser.advance().unwrap();
        parser.advance().unwrap();
        assert_eq!(parser.current_type().unwrap(), 'q');
        assert!(parser.position() > 0);
        parser.reset();
        assert_eq!(parser.position(), 0);
        assert_eq!(parser.descriptor().unwrap().repeat_count, 2);
    }
}
