use log::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{DynamicMessage, MessageType, UnknownField};
use crate::reader::{read_value, Record, WireReader};
use crate::schema::{FieldDescriptor, FieldType};
use crate::slice_reader::SliceReader;
use crate::value::Value;
use crate::varint::{from_zigzag32, from_zigzag64};
use crate::wire::WireValue;
use crate::writer::WireWriter;

/// Default maximum nesting depth of messages
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Default maximum size of a buffer to decode (64 MiB)
pub const DEFAULT_MAX_INPUT_LEN: usize = 64 << 20;

/// Knobs for [`Codec`].
///
/// ```
/// use schemabuf::CodecOptions;
///
/// let options = CodecOptions::default().strict(true).max_depth(16);
/// assert!(options.is_strict());
/// assert_eq!(options.depth_limit(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    strict: bool,
    max_depth: usize,
    max_input_len: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_input_len: DEFAULT_MAX_INPUT_LEN,
        }
    }
}

impl CodecOptions {
    /// In strict mode a known field with an unexpected wire type is an error. Otherwise
    /// it is kept as an unknown field.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_input_len(mut self, max_input_len: usize) -> Self {
        self.max_input_len = max_input_len;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn depth_limit(&self) -> usize {
        self.max_depth
    }

    pub fn input_limit(&self) -> usize {
        self.max_input_len
    }
}

/// Encodes and decodes [`DynamicMessage`]s.
///
/// ## Example
///
/// ```
/// use schemabuf::{Codec, CodecOptions, FieldDescriptor, FieldType, MessageDescriptor, Schema};
///
/// let mut builder = Schema::builder();
/// builder.register_message(
///     MessageDescriptor::new("Reading")
///         .field(FieldDescriptor::required(1, "sensor", FieldType::String))
///         .field(FieldDescriptor::repeated(2, "values", FieldType::SInt32)),
/// )?;
/// let schema = builder.resolve()?;
/// let reading_type = schema.message_type("Reading")?;
///
/// let mut reading = reading_type.new_message();
/// reading.set(1, "t1")?;
/// reading.append(2, -1)?;
/// reading.append(2, 2)?;
///
/// let codec = Codec::new(CodecOptions::default().strict(true));
/// let serialized = codec.encode(&reading)?;
/// assert_eq!(serialized, b"\x0a\x02t1\x10\x01\x10\x04");
/// assert_eq!(codec.decode(&serialized, &reading_type)?, reading);
/// # Ok::<(), schemabuf::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Serializes a message.
    ///
    /// Fields are written in ascending field number order followed by the unknown
    /// fields. Nothing is written if a required field is missing anywhere in the tree.
    pub fn encode(&self, message: &DynamicMessage) -> Result<Vec<u8>> {
        self.check_nesting(message, 0)?;
        let missing = message.missing_fields();
        if !missing.is_empty() {
            return Err(Error::UninitializedMessage {
                message: message.full_name().to_owned(),
                missing,
            });
        }
        let mut writer = WireWriter::new();
        self.encode_message(message, &mut writer, 0)?;
        trace!("encoded {} into {} bytes", message.full_name(), writer.len());
        Ok(writer.into_vec())
    }

    /// Parses `data` as a message of the given type.
    pub fn decode(&self, data: &[u8], message_type: &MessageType) -> Result<DynamicMessage> {
        self.check_input_len(data)?;
        let mut message = message_type.new_message();
        self.merge_window(data, 0, data.len(), &mut message, 0)?;
        trace!("decoded {} from {} bytes", message.full_name(), data.len());
        Ok(message)
    }

    /// Parses `data` into an existing message. Singular fields found in `data` replace
    /// the current values, repeated fields are appended to.
    ///
    /// On error `message` is left as it was.
    pub fn merge(&self, data: &[u8], message: &mut DynamicMessage) -> Result<()> {
        self.check_input_len(data)?;
        let mut merged = message.clone();
        self.merge_window(data, 0, data.len(), &mut merged, 0)?;
        *message = merged;
        trace!("decoded {} from {} bytes", message.full_name(), data.len());
        Ok(())
    }

    fn check_input_len(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.options.max_input_len {
            return Err(Error::LimitExceeded {
                what: "input length",
                limit: self.options.max_input_len,
            });
        }
        Ok(())
    }

    /// Walks the set message values, stopping as soon as the depth limit is passed.
    fn check_nesting(&self, message: &DynamicMessage, depth: usize) -> Result<()> {
        self.check_depth(depth)?;
        for (_, values) in message.entries() {
            for nested in values.iter().filter_map(Value::as_message) {
                self.check_nesting(nested, depth + 1)?;
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            return Err(Error::LimitExceeded {
                what: "nesting depth",
                limit: self.options.max_depth,
            });
        }
        Ok(())
    }

    fn encode_message(
        &self,
        message: &DynamicMessage,
        writer: &mut WireWriter,
        depth: usize,
    ) -> Result<()> {
        self.check_depth(depth)?;
        let descriptor = message.descriptor();
        for (number, values) in message.entries() {
            let field = descriptor
                .field_by_number(number)
                .ok_or_else(|| Error::UnknownField {
                    message: message.full_name().to_owned(),
                    field_number: number,
                })?;
            for value in values {
                self.encode_value(field, value, writer, depth)?;
            }
        }
        for unknown in message.unknown_fields() {
            writer.append_raw(unknown.raw());
        }
        Ok(())
    }

    fn encode_value(
        &self,
        field: &FieldDescriptor,
        value: &Value,
        writer: &mut WireWriter,
        depth: usize,
    ) -> Result<()> {
        let number = field.number();
        match (field.field_type(), value) {
            (FieldType::Int32, Value::Int32(v)) => writer.append_int32(number, *v),
            (FieldType::SInt32, Value::Int32(v)) => writer.append_sint32(number, *v),
            (FieldType::SFixed32, Value::Int32(v)) => writer.append_sfixed32(number, *v),
            (FieldType::Int64, Value::Int64(v)) => writer.append_int64(number, *v),
            (FieldType::SInt64, Value::Int64(v)) => writer.append_sint64(number, *v),
            (FieldType::SFixed64, Value::Int64(v)) => writer.append_sfixed64(number, *v),
            (FieldType::UInt32, Value::UInt32(v)) => writer.append_uint32(number, *v),
            (FieldType::Fixed32, Value::UInt32(v)) => writer.append_fixed32(number, *v),
            (FieldType::UInt64, Value::UInt64(v)) => writer.append_uint64(number, *v),
            (FieldType::Fixed64, Value::UInt64(v)) => writer.append_fixed64(number, *v),
            (FieldType::Bool, Value::Bool(v)) => writer.append_bool(number, *v),
            (FieldType::Float, Value::Float(v)) => writer.append_float(number, *v),
            (FieldType::Double, Value::Double(v)) => writer.append_double(number, *v),
            (FieldType::String, Value::String(v)) => writer.append_string(number, v),
            (FieldType::Bytes, Value::Bytes(v)) => writer.append_bytes(number, v),
            (FieldType::Enum(_), Value::Enum(v)) => writer.append_enum(number, *v),
            (FieldType::Message(_), Value::Message(nested)) => {
                let mut inner = WireWriter::new();
                self.encode_message(nested, &mut inner, depth + 1)?;
                writer.append_message(number, &inner)
            }
            (expected, found) => {
                return Err(Error::TypeMismatch {
                    field_number: number,
                    expected: expected.to_string(),
                    found: found.type_name(),
                })
            }
        };
        Ok(())
    }

    /// Decodes the records in `data[start..end]` into `message`.
    fn merge_window(
        &self,
        data: &[u8],
        start: usize,
        end: usize,
        message: &mut DynamicMessage,
        depth: usize,
    ) -> Result<()> {
        self.check_depth(depth)?;
        let message_type = message.message_type().clone();
        let descriptor = message_type.descriptor();
        let mut reader = WireReader::window(data, start, end);

        while let Some(record) = reader.next_record()? {
            let field = match descriptor.field_by_number(record.field_number) {
                Some(field) => field,
                None => {
                    trace!(
                        "keeping unknown field {} of {}",
                        record.field_number,
                        message_type.full_name()
                    );
                    message.push_unknown(UnknownField::from_record(&record));
                    continue;
                }
            };

            let expected = field.field_type().wire_type();
            if record.wire_type == expected {
                let value = match (field.field_type(), &record.value) {
                    (FieldType::Message(_), WireValue::Len(payload)) => {
                        let mut nested = message_type.field_message_type(field)?.new_message();
                        let payload_start = record.value_offset;
                        self.merge_window(
                            data,
                            payload_start,
                            payload_start + payload.len(),
                            &mut nested,
                            depth + 1,
                        )?;
                        Value::Message(Box::new(nested))
                    }
                    (field_type, value) => scalar_value(field_type, value, &record)?,
                };
                message.insert_decoded(field, value);
            } else if let Some(payload) = packed_payload(field, &record) {
                decode_packed(data, field, &record, payload, message)?;
            } else if self.options.strict {
                return Err(Error::WireTypeMismatch {
                    offset: record.offset,
                    field_number: record.field_number,
                    expected,
                    found: record.wire_type,
                });
            } else {
                debug!(
                    "field {} of {} has wire type {:?}, expected {:?}; keeping it as unknown",
                    record.field_number,
                    message_type.full_name(),
                    record.wire_type,
                    expected
                );
                message.push_unknown(UnknownField::from_record(&record));
            }
        }
        Ok(())
    }
}

/// The payload of a length delimited record holding a packed run for `field`.
fn packed_payload<'a>(field: &FieldDescriptor, record: &Record<'a>) -> Option<&'a [u8]> {
    match record.value {
        WireValue::Len(payload) if field.is_repeated() && field.field_type().is_packable() => {
            Some(payload)
        }
        _ => None,
    }
}

/// Decodes a packed run of numeric values.
fn decode_packed(
    data: &[u8],
    field: &FieldDescriptor,
    record: &Record,
    payload: &[u8],
    message: &mut DynamicMessage,
) -> Result<()> {
    let wire_type = field.field_type().wire_type();
    let start = record.value_offset;
    let mut reader = SliceReader::window(data, start, start + payload.len());
    while !reader.is_empty() {
        let (value, value_offset) = read_value(&mut reader, wire_type)?;
        let element = Record {
            field_number: record.field_number,
            wire_type,
            value,
            offset: value_offset,
            value_offset,
            raw: &[],
        };
        message.insert_decoded(field, scalar_value(field.field_type(), &element.value, &element)?);
    }
    Ok(())
}

/// Interprets a wire value of the matching wire type as a value of `field_type`.
fn scalar_value(field_type: &FieldType, value: &WireValue, record: &Record) -> Result<Value> {
    Ok(match (field_type, value) {
        (FieldType::Int32, WireValue::Varint(v)) => Value::Int32(*v as i32),
        (FieldType::Int64, WireValue::Varint(v)) => Value::Int64(*v as i64),
        (FieldType::UInt32, WireValue::Varint(v)) => Value::UInt32(*v as u32),
        (FieldType::UInt64, WireValue::Varint(v)) => Value::UInt64(*v),
        (FieldType::SInt32, WireValue::Varint(v)) => Value::Int32(from_zigzag32(*v as u32)),
        (FieldType::SInt64, WireValue::Varint(v)) => Value::Int64(from_zigzag64(*v)),
        (FieldType::Bool, WireValue::Varint(v)) => Value::Bool(*v != 0),
        (FieldType::Enum(_), WireValue::Varint(v)) => Value::Enum(*v as i32),
        (FieldType::Fixed32, WireValue::I32(b)) => Value::UInt32(u32::from_le_bytes(*b)),
        (FieldType::SFixed32, WireValue::I32(b)) => Value::Int32(i32::from_le_bytes(*b)),
        (FieldType::Float, WireValue::I32(b)) => Value::Float(f32::from_le_bytes(*b)),
        (FieldType::Fixed64, WireValue::I64(b)) => Value::UInt64(u64::from_le_bytes(*b)),
        (FieldType::SFixed64, WireValue::I64(b)) => Value::Int64(i64::from_le_bytes(*b)),
        (FieldType::Double, WireValue::I64(b)) => Value::Double(f64::from_le_bytes(*b)),
        (FieldType::String, WireValue::Len(b)) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_owned()),
            Err(_) => {
                return Err(Error::InvalidUtf8 {
                    offset: record.value_offset,
                    field_number: record.field_number,
                })
            }
        },
        (FieldType::Bytes, WireValue::Len(b)) => Value::Bytes(b.to_vec()),
        (expected, found) => {
            return Err(Error::WireTypeMismatch {
                offset: record.offset,
                field_number: record.field_number,
                expected: expected.wire_type(),
                found: found.wire_type(),
            })
        }
    })
}

/// Encodes a message with the default options.
pub fn encode(message: &DynamicMessage) -> Result<Vec<u8>> {
    Codec::default().encode(message)
}

/// Decodes a message with the default options.
pub fn decode(data: &[u8], message_type: &MessageType) -> Result<DynamicMessage> {
    Codec::default().decode(data, message_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDescriptor, MessageDescriptor, Schema};
    use crate::wire::WireType;
    use crate::FieldValue;
    use hex_literal::hex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn address_book() -> Arc<Schema> {
        let mut builder = Schema::builder();
        builder
            .register_message(
                MessageDescriptor::new("Person")
                    .field(FieldDescriptor::required(1, "name", FieldType::String))
                    .field(FieldDescriptor::required(2, "id", FieldType::Int32))
                    .field(FieldDescriptor::optional(3, "email", FieldType::String))
                    .field(FieldDescriptor::repeated(
                        4,
                        "phones",
                        FieldType::Message("PhoneNumber".into()),
                    ))
                    .nested_enum(
                        EnumDescriptor::new("PhoneType")
                            .value("MOBILE", 0)
                            .value("HOME", 1)
                            .value("WORK", 2),
                    )
                    .nested_message(
                        MessageDescriptor::new("PhoneNumber")
                            .field(FieldDescriptor::required(1, "number", FieldType::String))
                            .field(
                                FieldDescriptor::optional(
                                    2,
                                    "type",
                                    FieldType::Enum("PhoneType".into()),
                                )
                                .with_default_enum("HOME"),
                            ),
                    ),
            )
            .unwrap();
        builder.resolve().unwrap()
    }

    fn scalars() -> Arc<Schema> {
        let mut builder = Schema::builder();
        builder
            .register_message(
                MessageDescriptor::new("Scalars")
                    .field(FieldDescriptor::optional(1, "int32", FieldType::Int32))
                    .field(FieldDescriptor::optional(2, "int64", FieldType::Int64))
                    .field(FieldDescriptor::optional(3, "uint32", FieldType::UInt32))
                    .field(FieldDescriptor::optional(4, "uint64", FieldType::UInt64))
                    .field(FieldDescriptor::optional(5, "sint32", FieldType::SInt32))
                    .field(FieldDescriptor::optional(6, "sint64", FieldType::SInt64))
                    .field(FieldDescriptor::optional(7, "fixed32", FieldType::Fixed32))
                    .field(FieldDescriptor::optional(8, "fixed64", FieldType::Fixed64))
                    .field(FieldDescriptor::optional(9, "sfixed32", FieldType::SFixed32))
                    .field(FieldDescriptor::optional(10, "sfixed64", FieldType::SFixed64))
                    .field(FieldDescriptor::optional(11, "bool", FieldType::Bool))
                    .field(FieldDescriptor::optional(12, "float", FieldType::Float))
                    .field(FieldDescriptor::optional(13, "double", FieldType::Double))
                    .field(FieldDescriptor::optional(14, "string", FieldType::String))
                    .field(FieldDescriptor::optional(15, "bytes", FieldType::Bytes))
                    .field(FieldDescriptor::repeated(16, "numbers", FieldType::Int32))
                    .field(FieldDescriptor::repeated(17, "fixeds", FieldType::Fixed32))
                    .field(FieldDescriptor::optional(18, "child", FieldType::Message("Scalars".into()))),
            )
            .unwrap();
        builder.resolve().unwrap()
    }

    fn person(schema: &Arc<Schema>) -> DynamicMessage {
        let mut person = schema.new_message("Person").unwrap();
        person.set(1, "A").unwrap();
        person.set(2, 1234).unwrap();
        person.set(3, "e@x.com").unwrap();
        let mut phone = person.new_field_message(4).unwrap();
        phone.set(1, "555-4321").unwrap();
        phone.set_enum_by_name(2, "HOME").unwrap();
        person.append(4, phone).unwrap();
        person
    }

    #[test]
    fn encode_person_works() {
        let schema = address_book();
        let person = person(&schema);
        let serialized = encode(&person).unwrap();
        assert_eq!(
            serialized,
            hex!("0a014110d2091a076540782e636f6d220c0a083535352d343332311001")
        );

        let decoded = decode(&serialized, person.message_type()).unwrap();
        assert_eq!(decoded, person);
        let phones = decoded.get(4).unwrap();
        let phone = phones.as_list()[0].as_message().unwrap();
        assert_eq!(phone.get(1).unwrap().as_value(), Some(&Value::from("555-4321")));
        assert_eq!(phone.get(2).unwrap().as_value(), Some(&Value::Enum(1)));
    }

    #[test]
    fn unset_optional_fields_are_not_written() {
        let schema = address_book();
        let mut person = schema.new_message("Person").unwrap();
        person.set(1, "").unwrap();
        person.set(2, 0).unwrap();
        // required fields are written even when zero
        assert_eq!(encode(&person).unwrap(), hex!("0a001000"));

        let decoded = decode(&hex!("0a001000"), person.message_type()).unwrap();
        assert!(decoded.has(1));
        assert!(!decoded.has(3));
    }

    #[test]
    fn uninitialized_messages_are_not_encoded() {
        let schema = address_book();
        let mut person = schema.new_message("Person").unwrap();
        person.set(1, "A").unwrap();
        let phone = person.new_field_message(4).unwrap();
        person.append(4, phone).unwrap();
        assert_eq!(
            encode(&person).unwrap_err(),
            Error::UninitializedMessage {
                message: "Person".into(),
                missing: vec!["id".into(), "phones[0].number".into()],
            }
        );
    }

    #[test]
    fn unknown_fields_round_trip() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        // name = "A", id = 1, field 99 = 42, field 100 = "xy"
        let data = hex!("0a0141100198062aa206027879");
        let decoded = person_type.decode(&data).unwrap();
        let unknown = decoded.unknown_fields();
        assert_eq!(unknown.len(), 2);
        assert_eq!(unknown[0].field_number(), 99);
        assert_eq!(unknown[0].wire_type(), WireType::Varint);
        assert_eq!(unknown[0].raw(), hex!("98062a"));
        assert_eq!(unknown[0].payload(), [42]);
        assert_eq!(unknown[1].payload(), b"xy");
        assert_eq!(decoded.encode().unwrap(), data);
    }

    #[test]
    fn known_fields_are_written_before_unknown_fields() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        let data = hex!("98062a0a01411001");
        let decoded = person_type.decode(&data).unwrap();
        assert_eq!(decoded.encode().unwrap(), hex!("0a0141100198062a"));
    }

    #[test]
    fn last_value_wins() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        let data = hex!("0a014110010a01421002");
        let decoded = person_type.decode(&data).unwrap();
        assert_eq!(decoded.get(1).unwrap().as_value(), Some(&Value::from("B")));
        assert_eq!(decoded.get(2).unwrap().as_value(), Some(&Value::Int32(2)));
    }

    #[test]
    fn merge_works() {
        let schema = address_book();
        let mut person = person(&schema);
        let mut phone = person.new_field_message(4).unwrap();
        phone.set(1, "1").unwrap();
        let mut other = schema.new_message("Person").unwrap();
        other.set(1, "B").unwrap();
        other.set(2, 2).unwrap();
        other.append(4, phone).unwrap();

        Codec::default()
            .merge(&encode(&other).unwrap(), &mut person)
            .unwrap();
        assert_eq!(person.get(1).unwrap().as_value(), Some(&Value::from("B")));
        assert_eq!(person.get(3).unwrap().as_value(), Some(&Value::from("e@x.com")));
        assert_eq!(person.get(4).unwrap().as_list().len(), 2);
    }

    #[test]
    fn failed_merge_leaves_message_unchanged() {
        let schema = address_book();
        let mut person = person(&schema);
        let before = person.clone();
        // name = "B", then a phone whose length runs past the end
        let err = Codec::default()
            .merge(&hex!("0a0142220a0a01"), &mut person)
            .unwrap_err();
        assert_eq!(err, Error::TruncatedInput { offset: 4 });
        assert_eq!(person, before);

        let err = Codec::new(CodecOptions::default().strict(true))
            .merge(&hex!("0a01421501000000"), &mut person)
            .unwrap_err();
        assert!(matches!(err, Error::WireTypeMismatch { .. }));
        assert_eq!(person, before);
    }

    #[test]
    fn scalars_round_trip() {
        let schema = scalars();
        let mut message = schema.new_message("Scalars").unwrap();
        message.set(1, -1).unwrap();
        message.set(2, i64::MIN).unwrap();
        message.set(3, u32::MAX).unwrap();
        message.set(4, u64::MAX).unwrap();
        message.set(5, i32::MIN).unwrap();
        message.set(6, -2i64).unwrap();
        message.set(7, 7u32).unwrap();
        message.set(8, 8u64).unwrap();
        message.set(9, -9).unwrap();
        message.set(10, -10i64).unwrap();
        message.set(11, true).unwrap();
        message.set(12, 1.5f32).unwrap();
        message.set(13, -0.25).unwrap();
        message.set(14, "ünïcödé").unwrap();
        message.set(15, vec![0u8, 255]).unwrap();

        let serialized = encode(&message).unwrap();
        let decoded = decode(&serialized, message.message_type()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn fixed_width_encoding_works() {
        let schema = scalars();
        let mut message = schema.new_message("Scalars").unwrap();
        message.set(7, 1u32).unwrap();
        message.set(12, 1.0f32).unwrap();
        message.set(10, -1i64).unwrap();
        assert_eq!(
            encode(&message).unwrap(),
            hex!("3d0100000051ffffffffffffffff650000803f")
        );
    }

    #[test]
    fn packed_fields_are_decoded() {
        let schema = scalars();
        let message_type = schema.message_type("Scalars").unwrap();
        // numbers = [3, 270, 86942] packed, followed by an unpacked 5
        let data = hex!("820106038e029ea705800105");
        let decoded = message_type.decode(&data).unwrap();
        assert_eq!(
            decoded.get(16).unwrap().as_list(),
            [
                Value::Int32(3),
                Value::Int32(270),
                Value::Int32(86942),
                Value::Int32(5)
            ]
        );
        // re-encoded unpacked
        assert_eq!(
            decoded.encode().unwrap(),
            hex!("80010380018e0280019ea705800105")
        );

        // packed fixed32
        let data = hex!("8a01080100000002000000");
        let decoded = message_type.decode(&data).unwrap();
        assert_eq!(
            decoded.get(17).unwrap().as_list(),
            [Value::UInt32(1), Value::UInt32(2)]
        );

        // truncated element inside a packed run
        let data = hex!("8a0103010000");
        assert_eq!(
            message_type.decode(&data).unwrap_err(),
            Error::TruncatedInput { offset: 3 }
        );
    }

    #[test]
    fn wire_type_mismatch_handling() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        // field 2 (int32) sent as fixed32
        let data = hex!("0a014115010000001001");

        let decoded = person_type.decode(&data).unwrap();
        assert_eq!(decoded.get(2).unwrap().as_value(), Some(&Value::Int32(1)));
        assert_eq!(decoded.unknown_fields()[0].raw(), hex!("1501000000"));

        let strict = Codec::new(CodecOptions::default().strict(true));
        assert_eq!(
            strict.decode(&data, &person_type).unwrap_err(),
            Error::WireTypeMismatch {
                offset: 3,
                field_number: 2,
                expected: WireType::Varint,
                found: WireType::I32,
            }
        );
    }

    #[test]
    fn truncated_input_fails() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        // id varint cut off
        assert_eq!(
            person_type.decode(&hex!("0a014110d2")).unwrap_err(),
            Error::TruncatedInput { offset: 4 }
        );
        // name claims 5 bytes, only 1 follows
        assert_eq!(
            person_type.decode(&hex!("0a0541")).unwrap_err(),
            Error::TruncatedInput { offset: 1 }
        );
        // nested phone claims more than its parent has
        assert_eq!(
            person_type.decode(&hex!("22050a0a31")).unwrap_err(),
            Error::TruncatedInput { offset: 1 }
        );
        // inner length exceeds the nested window
        assert_eq!(
            person_type.decode(&hex!("22030a05311001")).unwrap_err(),
            Error::TruncatedInput { offset: 3 }
        );
    }

    #[test]
    fn invalid_utf8_fails() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        assert_eq!(
            person_type.decode(&hex!("10010a02c328")).unwrap_err(),
            Error::InvalidUtf8 {
                offset: 4,
                field_number: 1
            }
        );
    }

    #[test]
    fn unknown_enum_numbers_are_kept() {
        let schema = address_book();
        let phone_type = schema.message_type("Person.PhoneNumber").unwrap();
        let decoded = phone_type.decode(&hex!("0a01311063")).unwrap();
        assert_eq!(decoded.get(2).unwrap().as_value(), Some(&Value::Enum(99)));
        assert_eq!(decoded.encode().unwrap(), hex!("0a01311063"));
    }

    #[test]
    fn negative_int32_uses_ten_bytes() {
        let schema = address_book();
        let mut person = schema.new_message("Person").unwrap();
        person.set(1, "A").unwrap();
        person.set(2, -1).unwrap();
        let serialized = encode(&person).unwrap();
        assert_eq!(serialized, hex!("0a014110ffffffffffffffffff01"));
        let decoded = decode(&serialized, person.message_type()).unwrap();
        assert_eq!(decoded.get(2).unwrap().as_value(), Some(&Value::Int32(-1)));
    }

    fn nested(schema: &Arc<Schema>, depth: usize) -> DynamicMessage {
        let mut message = schema.new_message("Scalars").unwrap();
        let mut current = &mut message;
        for _ in 0..depth {
            current = current.field_message_mut(18).unwrap();
        }
        current.set(11, true).unwrap();
        message
    }

    #[test]
    fn depth_limit_is_enforced() {
        let schema = scalars();
        let codec = Codec::new(CodecOptions::default().max_depth(3));

        let ok = nested(&schema, 3);
        let serialized = codec.encode(&ok).unwrap();
        assert_eq!(codec.decode(&serialized, ok.message_type()).unwrap(), ok);

        let too_deep = nested(&schema, 4);
        let limit = Error::LimitExceeded {
            what: "nesting depth",
            limit: 3,
        };
        assert_eq!(codec.encode(&too_deep).unwrap_err(), limit);
        let serialized = encode(&too_deep).unwrap();
        assert_eq!(
            codec.decode(&serialized, too_deep.message_type()).unwrap_err(),
            limit
        );
    }

    #[test]
    fn depth_limit_is_checked_before_required_fields() {
        let mut builder = Schema::builder();
        builder
            .register_message(
                MessageDescriptor::new("Node")
                    .field(FieldDescriptor::required(1, "name", FieldType::String))
                    .field(FieldDescriptor::optional(2, "child", FieldType::Message("Node".into()))),
            )
            .unwrap();
        let schema = builder.resolve().unwrap();

        // none of the nodes has a name
        let mut root = schema.new_message("Node").unwrap();
        let mut current = &mut root;
        for _ in 0..10 {
            current = current.field_message_mut(2).unwrap();
        }

        let codec = Codec::new(CodecOptions::default().max_depth(3));
        assert_eq!(
            codec.encode(&root).unwrap_err(),
            Error::LimitExceeded {
                what: "nesting depth",
                limit: 3
            }
        );
        assert!(matches!(
            encode(&root),
            Err(Error::UninitializedMessage { .. })
        ));
    }

    #[test]
    fn input_limit_is_enforced() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        let codec = Codec::new(CodecOptions::default().max_input_len(4));
        assert_eq!(
            codec.decode(&hex!("0a0141100a"), &person_type).unwrap_err(),
            Error::LimitExceeded {
                what: "input length",
                limit: 4
            }
        );
    }

    #[test]
    fn decoded_messages_may_be_uninitialized() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        let decoded = person_type.decode(&hex!("0a0141")).unwrap();
        assert!(!decoded.is_initialized());
        assert!(matches!(
            decoded.get(4).unwrap(),
            FieldValue::List(list) if list.is_empty()
        ));
    }

    #[test]
    fn random_round_trip() {
        let schema = scalars();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut message = schema.new_message("Scalars").unwrap();
            if rng.gen_bool(0.5) {
                message.set(1, rng.gen::<i32>()).unwrap();
            }
            if rng.gen_bool(0.5) {
                message.set(6, rng.gen::<i64>()).unwrap();
            }
            if rng.gen_bool(0.5) {
                message.set(8, rng.gen::<u64>()).unwrap();
            }
            if rng.gen_bool(0.5) {
                message.set(13, rng.gen::<f64>()).unwrap();
            }
            if rng.gen_bool(0.5) {
                let len = rng.gen_range(0..40);
                let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                message.set(15, bytes).unwrap();
            }
            for _ in 0..rng.gen_range(0..5) {
                message.append(16, rng.gen::<i32>()).unwrap();
            }
            if rng.gen_bool(0.3) {
                message.field_message_mut(18).unwrap().set(5, rng.gen::<i32>()).unwrap();
            }

            let serialized = encode(&message).unwrap();
            let decoded = decode(&serialized, message.message_type()).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(encode(&decoded).unwrap(), serialized);
        }
    }

    #[test]
    fn concurrent_decoding_works() {
        let schema = address_book();
        let person_type = schema.message_type("Person").unwrap();
        let expected = person(&schema);
        let serialized = encode(&expected).unwrap();
        let codec = Codec::default();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let decoded = codec.decode(&serialized, &person_type).unwrap();
                        assert_eq!(decoded, expected);
                    }
                });
            }
        });
    }
}
