//! Order-preserving variable-length integers.
//!
//! Every value is written as a marker byte followed by zero or more payload
//! bytes. The top nibble of the marker selects one of six buckets, and the
//! buckets are laid out so that comparing two encodings with `memcmp` gives
//! the same answer as comparing the integers:
//!
//! | marker      | range                 | payload                                    |
//! |-------------|-----------------------|--------------------------------------------|
//! | `0x10`      | `x < -8256`           | low nibble: elided `0xFF` bytes, then tail |
//! | `0x20-0x3f` | `-8256 <= x < -64`    | `x + 8256` in 13 bits                      |
//! | `0x40-0x7f` | `-64 <= x < 0`        | `x + 64` in 6 bits                         |
//! | `0x80-0xbf` | `0 <= x <= 63`        | `x` in 6 bits                              |
//! | `0xc0-0xdf` | `64 <= x <= 8255`     | `x - 64` in 13 bits                        |
//! | `0xe0`      | `x > 8255`            | low nibble: length, then `x - 8256`        |
//!
//! Multi-byte payloads are big-endian. The layout is shared with the C
//! packer, so bytes produced here can be read there and the other way round.

use crate::error::{PackError, Result};

const NEG_MULTI_MARKER: u8 = 0x10;
const NEG_2BYTE_MARKER: u8 = 0x20;
const NEG_1BYTE_MARKER: u8 = 0x40;
const POS_1BYTE_MARKER: u8 = 0x80;
const POS_2BYTE_MARKER: u8 = 0xc0;
const POS_MULTI_MARKER: u8 = 0xe0;

const NEG_1BYTE_MIN: i64 = -(1 << 6);
const NEG_2BYTE_MIN: i64 = -(1 << 13) + NEG_1BYTE_MIN;
const POS_1BYTE_MAX: u64 = (1 << 6) - 1;
const POS_2BYTE_MAX: u64 = (1 << 13) + POS_1BYTE_MAX;

/// Longest possible encoding: marker plus eight payload bytes.
pub const MAX_PACKED_LEN: usize = 9;

fn leading_zero_bytes(x: u64) -> usize {
    (x.leading_zeros() / 8) as usize
}

/// Append `x` using the unsigned rule.
pub fn pack_uint(buffer: &mut Vec<u8>, x: u64) {
    if x <= POS_1BYTE_MAX {
        buffer.push(POS_1BYTE_MARKER | x as u8);
    } else if x <= POS_2BYTE_MAX {
        let x = x - (POS_1BYTE_MAX + 1);
        buffer.push(POS_2BYTE_MARKER | (x >> 8) as u8);
        buffer.push(x as u8);
    } else if x == POS_2BYTE_MAX + 1 {
        // Zero would fit in an empty payload; keep one byte so the encoding
        // never gets shorter than its neighbours.
        buffer.push(POS_MULTI_MARKER | 1);
        buffer.push(0);
    } else {
        let x = x - (POS_2BYTE_MAX + 1);
        let skip = leading_zero_bytes(x);
        buffer.push(POS_MULTI_MARKER | (8 - skip) as u8);
        buffer.extend_from_slice(&x.to_be_bytes()[skip..]);
    }
}

/// Append `x` using the signed rule. Non-negative values encode exactly like
/// [`pack_uint`].
pub fn pack_int(buffer: &mut Vec<u8>, x: i64) {
    if x < NEG_2BYTE_MIN {
        let skip = leading_zero_bytes(!(x as u64));
        buffer.push(NEG_MULTI_MARKER | skip as u8);
        buffer.extend_from_slice(&x.to_be_bytes()[skip..]);
    } else if x < NEG_1BYTE_MIN {
        let x = (x - NEG_2BYTE_MIN) as u64;
        buffer.push(NEG_2BYTE_MARKER | (x >> 8) as u8);
        buffer.push(x as u8);
    } else if x < 0 {
        buffer.push(NEG_1BYTE_MARKER | (x - NEG_1BYTE_MIN) as u8);
    } else {
        pack_uint(buffer, x as u64);
    }
}

/// Number of bytes [`pack_uint`] writes for `x`.
pub fn uint_len(x: u64) -> usize {
    if x <= POS_1BYTE_MAX {
        1
    } else if x <= POS_2BYTE_MAX + 1 {
        2
    } else {
        1 + 8 - leading_zero_bytes(x - (POS_2BYTE_MAX + 1))
    }
}

/// Number of bytes [`pack_int`] writes for `x`.
pub fn int_len(x: i64) -> usize {
    if x < NEG_2BYTE_MIN {
        1 + 8 - leading_zero_bytes(!(x as u64))
    } else if x < NEG_1BYTE_MIN {
        2
    } else if x < 0 {
        1
    } else {
        uint_len(x as u64)
    }
}

fn payload(data: &[u8], len: usize) -> Result<&[u8]> {
    data.get(1..1 + len)
        .ok_or_else(|| PackError::truncated(1 + len, data.len()))
}

/// Decode an unsigned value, returning it with the number of bytes read.
///
/// Markers from the negative buckets fail with [`PackError::Overflow`].
pub fn unpack_uint(data: &[u8]) -> Result<(u64, usize)> {
    let marker = *data.first().ok_or_else(|| PackError::truncated(1, 0))?;
    match marker >> 4 {
        0x8..=0xb => Ok((u64::from(marker & 0x3f), 1)),
        0xc | 0xd => {
            let low = payload(data, 1)?[0];
            let x = (u64::from(marker & 0x1f) << 8) | u64::from(low);
            Ok((x + POS_1BYTE_MAX + 1, 2))
        }
        0xe => {
            let len = usize::from(marker & 0x0f);
            if len >= MAX_PACKED_LEN {
                return Err(PackError::InvalidEncoding { marker });
            }
            let x = payload(data, len)?
                .iter()
                .fold(0u64, |x, &b| (x << 8) | u64::from(b));
            let x = x
                .checked_add(POS_2BYTE_MAX + 1)
                .ok_or(PackError::InvalidEncoding { marker })?;
            Ok((x, 1 + len))
        }
        0x1..=0x7 => Err(PackError::Overflow { field: 'Q' }),
        _ => Err(PackError::InvalidEncoding { marker }),
    }
}

/// Decode a signed value, returning it with the number of bytes read.
///
/// Unsigned encodings above `i64::MAX` fail with [`PackError::Overflow`].
pub fn unpack_int(data: &[u8]) -> Result<(i64, usize)> {
    let marker = *data.first().ok_or_else(|| PackError::truncated(1, 0))?;
    match marker >> 4 {
        0x1 => {
            let skip = usize::from(marker & 0x0f);
            if skip >= MAX_PACKED_LEN {
                return Err(PackError::InvalidEncoding { marker });
            }
            let len = MAX_PACKED_LEN - 1 - skip;
            let x = payload(data, len)?
                .iter()
                .fold(u64::MAX, |x, &b| (x << 8) | u64::from(b));
            Ok((x as i64, 1 + len))
        }
        0x2 | 0x3 => {
            let low = payload(data, 1)?[0];
            let x = (i64::from(marker & 0x1f) << 8) | i64::from(low);
            Ok((x + NEG_2BYTE_MIN, 2))
        }
        0x4..=0x7 => Ok((i64::from(marker & 0x3f) + NEG_1BYTE_MIN, 1)),
        _ => {
            let (x, read) = unpack_uint(data)?;
            let x = i64::try_from(x).map_err(|_| PackError::Overflow { field: 'q' })?;
            Ok((x, read))
        }
    }
}
