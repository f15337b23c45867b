use crate::varint::{encode_varint_into, to_zigzag32, to_zigzag64};
use crate::wire::{make_tag, WireType};

/// A low level protobuf writer.
///
/// Unlike proto3 encoders, every appended value is written, including zeros and empty
/// strings: presence is decided by the caller. The schema driven [`Codec`][crate::Codec]
/// builds on top of this.
///
/// ## Example
///
/// ```
/// use schemabuf::WireWriter;
///
/// let mut writer = WireWriter::new();
/// writer.append_string(1, "A").append_int32(2, 1234);
/// assert_eq!(writer.into_vec(), [0x0A, 0x01, 0x41, 0x10, 0xD2, 0x09]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    output: Vec<u8>,
}

impl WireWriter {
    /// Creates a new, empty writer.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a varint field with the given field number.
    pub fn append_varint(&mut self, field_number: u32, value: u64) -> &mut Self {
        self.append_tag(field_number, WireType::Varint);
        encode_varint_into(value, &mut self.output);
        self
    }

    /// Appends a uint64 field with the given field number.
    #[inline]
    pub fn append_uint64(&mut self, field_number: u32, value: u64) -> &mut Self {
        self.append_varint(field_number, value)
    }

    /// Appends a uint32 field with the given field number.
    #[inline]
    pub fn append_uint32(&mut self, field_number: u32, value: u32) -> &mut Self {
        self.append_varint(field_number, value.into())
    }

    /// Appends a bool field with the given field number.
    #[inline]
    pub fn append_bool(&mut self, field_number: u32, value: bool) -> &mut Self {
        self.append_varint(field_number, value.into())
    }

    /// Appends an int64 field with the given field number.
    ///
    /// Please note that protobuf has two different 64 bit signed integer types
    /// with different encodings: sint64 and int64. This only works for the later.
    pub fn append_int64(&mut self, field_number: u32, value: i64) -> &mut Self {
        self.append_varint(field_number, value as u64)
    }

    /// Appends an int32 field with the given field number.
    ///
    /// Negative values are sign extended to 64 bits and always take 10 bytes.
    ///
    /// ## Example
    ///
    /// ```
    /// use schemabuf::WireWriter;
    ///
    /// let mut writer = WireWriter::new();
    /// writer.append_int32(7, -1);
    /// assert_eq!(writer.as_bytes().len(), 11);
    /// ```
    pub fn append_int32(&mut self, field_number: u32, value: i32) -> &mut Self {
        self.append_varint(field_number, value as i64 as u64)
    }

    /// Appends an sint64 field with the given field number.
    pub fn append_sint64(&mut self, field_number: u32, value: i64) -> &mut Self {
        self.append_varint(field_number, to_zigzag64(value))
    }

    /// Appends an sint32 field with the given field number.
    pub fn append_sint32(&mut self, field_number: u32, value: i32) -> &mut Self {
        self.append_varint(field_number, to_zigzag32(value).into())
    }

    /// Appends an enum field with the given field number.
    ///
    /// Enums are encoded like int32.
    #[inline]
    pub fn append_enum(&mut self, field_number: u32, value: i32) -> &mut Self {
        self.append_int32(field_number, value)
    }

    /// Appends a fixed32 field with the given field number.
    pub fn append_fixed32(&mut self, field_number: u32, value: u32) -> &mut Self {
        self.append_tag(field_number, WireType::I32);
        self.output.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends a sfixed32 field with the given field number.
    pub fn append_sfixed32(&mut self, field_number: u32, value: i32) -> &mut Self {
        self.append_fixed32(field_number, value as u32)
    }

    /// Appends a float field with the given field number.
    pub fn append_float(&mut self, field_number: u32, value: f32) -> &mut Self {
        self.append_fixed32(field_number, value.to_bits())
    }

    /// Appends a fixed64 field with the given field number.
    pub fn append_fixed64(&mut self, field_number: u32, value: u64) -> &mut Self {
        self.append_tag(field_number, WireType::I64);
        self.output.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends a sfixed64 field with the given field number.
    pub fn append_sfixed64(&mut self, field_number: u32, value: i64) -> &mut Self {
        self.append_fixed64(field_number, value as u64)
    }

    /// Appends a double field with the given field number.
    pub fn append_double(&mut self, field_number: u32, value: f64) -> &mut Self {
        self.append_fixed64(field_number, value.to_bits())
    }

    /// Appends a bytes field with the given field number.
    pub fn append_bytes(&mut self, field_number: u32, data: impl AsRef<[u8]>) -> &mut Self {
        let data = data.as_ref();
        // tag
        self.append_tag(field_number, WireType::Len);
        // length
        encode_varint_into(data.len() as u64, &mut self.output);
        // value
        self.output.extend_from_slice(data);
        self
    }

    /// Appends a string field with the given field number.
    #[inline]
    pub fn append_string(&mut self, field_number: u32, data: impl AsRef<str>) -> &mut Self {
        self.append_bytes(field_number, data.as_ref().as_bytes())
    }

    /// Appends an already serialized nested message with the given field number.
    ///
    /// ## Example
    ///
    /// ```
    /// use schemabuf::WireWriter;
    ///
    /// let mut lights = WireWriter::new();
    /// lights.append_bool(3, true);
    ///
    /// let mut room = WireWriter::new();
    /// room.append_uint64(1, 4)
    ///     .append_message(2, &lights)
    ///     .append_uint64(3, 56);
    /// assert_eq!(room.into_vec(), b"\x08\x04\x12\x02\x18\x01\x18\x38");
    /// ```
    #[inline]
    pub fn append_message(&mut self, field_number: u32, value: &WireWriter) -> &mut Self {
        self.append_bytes(field_number, value.as_bytes())
    }

    /// Appends pre-encoded bytes (tag included) as they are.
    pub fn append_raw(&mut self, record: &[u8]) -> &mut Self {
        self.output.extend_from_slice(record);
        self
    }

    /// Returns the serialized data as a slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.output
    }

    /// Takes the instance and returns the serialized data.
    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.output
    }

    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    fn append_tag(&mut self, field_number: u32, wire_type: WireType) {
        encode_varint_into(make_tag(field_number, wire_type), &mut self.output);
    }
}
