use crate::error::{Error, Result};

/// The maximum number of bytes a 64 bit varint can take.
pub const MAX_VARINT_LEN: usize = 10;

/// Encodes the unsigned integer `n` using the protobuf varint (variable integer)
/// format and appends it to `dest`.
pub fn encode_varint_into(mut n: u64, dest: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        // Read least significant 7 bits
        let mut b = (n & 0b0111_1111) as u8;
        n >>= 7;
        // Set top bit when not yet done
        if n != 0 {
            b |= 0b1000_0000;
        }
        buf[len] = b;
        len += 1;
        if n == 0 {
            break;
        }
    }
    dest.extend_from_slice(&buf[0..len]);
}

/// Encodes the unsigned integer `n` as a standalone varint.
///
/// ## Example
///
/// ```
/// use schemabuf::encode_varint;
///
/// assert_eq!(encode_varint(1), [0x01]);
/// assert_eq!(encode_varint(300), [0xAC, 0x02]);
/// ```
pub fn encode_varint(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_len(n));
    encode_varint_into(n, &mut out);
    out
}

/// Number of bytes `encode_varint(n)` produces.
#[inline]
pub fn varint_len(n: u64) -> usize {
    // 1 byte per started group of 7 bits, at least one byte for 0
    let bits = 64 - (n | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Decodes a varint starting at `offset` in `buffer`.
///
/// Returns the value and the number of bytes consumed. Error offsets point to the
/// first byte of the varint.
///
/// ## Example
///
/// ```
/// use schemabuf::decode_varint;
///
/// let (value, consumed) = decode_varint(&[0x08, 0xAC, 0x02], 1).unwrap();
/// assert_eq!(value, 300);
/// assert_eq!(consumed, 2);
/// ```
pub fn decode_varint(buffer: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut out = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = buffer.get(offset + i) else {
            return Err(Error::TruncatedInput { offset });
        };
        // The 10th byte may only contribute the top bit of the u64
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(Error::VarintOverflow { offset });
        }
        out |= ((byte & 0x7f) as u64) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((out, i + 1));
        }
    }
    Err(Error::VarintOverflow { offset })
}

#[inline]
pub fn to_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn from_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

#[inline]
pub fn to_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn from_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
