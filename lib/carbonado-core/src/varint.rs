//! Unsigned LEB128 decoding.

use snafu::Snafu;

/// Maximum number of 7-bit groups in a varint that fits in 64 bits.
const MAX_GROUPS: usize = 10;

/// A varint decoding error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum VarintError {
    /// The input ended before a terminating byte was found.
    #[snafu(display("varint truncated after {} byte(s)", read))]
    TruncatedInput {
        /// Number of bytes read before running out of input.
        read: usize,
    },

    /// The encoded value does not fit in 64 bits.
    #[snafu(display("varint overflows a 64-bit integer"))]
    VarintOverflow,
}

/// Decodes a single unsigned varint from the start of `buf`.
///
/// Groups are little-endian, seven bits each, with the high bit of every byte acting as the continuation flag. On
/// success, returns the decoded value and the number of bytes consumed.
///
/// # Errors
///
/// If `buf` ends before a byte without the continuation bit is found, [`VarintError::TruncatedInput`] is returned. If
/// more than ten groups are present, or the tenth group carries more than a single bit, [`VarintError::VarintOverflow`]
/// is returned.
#[inline]
pub fn read_uvarint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_GROUPS {
            return VarintOverflow.fail();
        }

        if byte < 0x80 {
            if i == MAX_GROUPS - 1 && byte > 1 {
                return VarintOverflow.fail();
            }
            return Ok((value | (u64::from(byte) << shift), i + 1));
        }

        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    TruncatedInput { read: buf.len() }.fail()
}

#[cfg(test)]
pub(crate) fn write_uvarint(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}
