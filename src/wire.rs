use crate::error::{Error, Result};

/// The largest field number a tag can carry
///
/// "The smallest field number you can specify is 1, and the largest is 2^29-1, or 536,870,911"
/// <https://protobuf.dev/programming-guides/proto2/#assigning>
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// The protobuf wire types
///
/// <https://protobuf.dev/programming-guides/encoding/#structure>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable length field (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
    Varint = 0,
    /// 64-bit value (fixed64, sfixed64, double)
    I64 = 1,
    /// Lengths prefixed field (string, bytes, embedded messages, packed repeated fields)
    Len = 2,
    // group start/end (deprecated, unsupported)
    // SGROUP = 3,
    // EGROUP = 4,
    /// 32-bit value (fixed32, sfixed32, float)
    I32 = 5,
}

impl WireType {
    /// Maps the low 3 bits of a tag to a wire type.
    ///
    /// `offset` is only used for error reporting.
    pub fn from_bits(bits: u8, offset: usize) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::I32),
            wire_type => Err(Error::UnsupportedWireType { offset, wire_type }),
        }
    }
}

/// Combines field number and wire type into the integer that is written as a varint.
#[inline]
pub fn make_tag(field_number: u32, wire_type: WireType) -> u64 {
    // The top 3 bits of a field number must be unset, i.e. this shift is safe for valid field numbers
    ((field_number as u64) << 3) | wire_type as u64
}

/// Splits a decoded tag into field number and wire type.
pub fn split_tag(tag: u64, offset: usize) -> Result<(u32, WireType)> {
    let field_number = tag >> 3;
    if field_number == 0 || field_number > MAX_FIELD_NUMBER as u64 {
        return Err(Error::InvalidTag { offset, tag });
    }
    let wire_type = WireType::from_bits((tag & 0x07) as u8, offset)?;
    Ok((field_number as u32, wire_type))
}

/// A raw value as found on the wire
#[derive(Debug, PartialEq, Clone)]
pub enum WireValue<'a> {
    /// Varint (wire type = 0).
    Varint(u64),

    /// A 64-bit value (wire type = 1). Used for fixed64, sfixed64, double.
    I64([u8; 8]),

    /// Variable length value (wire type = 2).
    Len(&'a [u8]),

    /// A 32-bit value (wire type = 5). Used for fixed32, sfixed32, float.
    I32([u8; 4]),
}

impl WireValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::I64(_) => WireType::I64,
            WireValue::Len(_) => WireType::Len,
            WireValue::I32(_) => WireType::I32,
        }
    }
}
