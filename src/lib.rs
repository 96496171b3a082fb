//! Pack typed tuples into byte strings that sort like the tuples themselves.
//!
//! A short format string such as `"iS"` or `"10sq"` describes the fields of
//! a tuple. Integers use a variable-length encoding whose byte order matches
//! numeric order, so packed keys can go straight into an ordered store and
//! be compared with `memcmp`. The layout is the one the C packer uses.
//!
//! ```
//! use wtpack::{decode, encode, FieldValue};
//!
//! let low = encode("iS", [FieldValue::Int(1), "a".into()]).unwrap();
//! let high = encode("iS", [FieldValue::Int(2), "a".into()]).unwrap();
//! assert!(low < high);
//! assert_eq!(decode("iS", &low).unwrap(), [FieldValue::Int(1), "a".into()]);
//! ```

use bytes::Bytes;
use tracing::debug;

pub mod encoding;
pub mod error;

pub use encoding::{
    Decoder, Encoder, FieldDescriptor, FieldSink, FieldSource, FieldType, FieldValue,
    FormatParser, PackOptions,
};
pub use error::{PackError, Result};

/// Pack `fields` in order according to `format`.
///
/// Passing fewer values than the format declares packs a prefix of the
/// tuple, which still sorts correctly against complete tuples.
pub fn encode<I>(format: &str, fields: I) -> Result<Bytes>
where
    I: IntoIterator,
    I::Item: Into<FieldValue>,
{
    let mut encoder = Encoder::new(format);
    encoder
        .put_fields(fields)
        .inspect_err(|error| debug!(format, %error, "failed to pack tuple"))?;
    Ok(encoder.into_bytes())
}

/// Unpack every field `format` declares from `data`.
pub fn decode(format: &str, data: &[u8]) -> Result<Vec<FieldValue>> {
    Decoder::new(format, data)
        .collect_fields()
        .inspect_err(|error| debug!(format, %error, "failed to unpack tuple"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::tests as test_helpers;

    #[test]
    fn encode_decode_tuple() {
        let packed = encode("10sS", ["aaaaa", "x"]).unwrap();
        assert_eq!(&packed[..], b"aaaaa\0\0\0\0\0x\0");
        assert_eq!(
            decode("10sS", &packed).unwrap(),
            vec![FieldValue::from("aaaaa"), FieldValue::from("x")]
        );
    }

    #[test]
    fn composite_keys_order_by_leading_field() {
        let keys: Vec<Bytes> = [(1i32, "b"), (2, "a"), (2, "b"), (10, "a")]
            .into_iter()
            .map(|(i, s)| encode("iS", [FieldValue::from(i), s.into()]).unwrap())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn byte_array_sizing() {
        let fields = [
            FieldValue::Bytes(b"abc".to_vec()),
            FieldValue::Int(7),
            "end".into(),
        ];
        test_helpers::assert_roundtrip("uiS", &fields);

        let packed = encode("U", [b"abc".as_slice()]).unwrap();
        assert_eq!(&packed[..], b"abc");
        assert_eq!(decode("U", &packed).unwrap(), [FieldValue::Bytes(b"abc".to_vec())]);
    }

    #[test]
    fn prefix_of_tuple() {
        let prefix = encode("qS", [5i64]).unwrap();
        let full = encode("qS", [FieldValue::Int(5), "z".into()]).unwrap();
        assert!(prefix < full);
        assert!(full.starts_with(&prefix));
    }

    #[test]
    fn error_scenarios() {
        assert_eq!(
            Decoder::new("S", b"a\0").get_int(),
            Err(PackError::FormatMismatch {
                expected: 'q',
                actual: 'S'
            })
        );
        assert_eq!(
            decode("q", &[]),
            Err(PackError::Truncated {
                needed: 1,
                available: 0
            })
        );
        assert_eq!(
            encode("Q", [-1i64]),
            Err(PackError::Overflow { field: 'Q' })
        );
        assert_eq!(encode("q", [1i64, 2]), Err(PackError::FormatExhausted));
    }
}
