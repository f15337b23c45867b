use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::reader::Record;
use crate::schema::{Cardinality, FieldDescriptor, FieldType, MessageDescriptor, Schema};
use crate::value::{FieldValue, Value};
use crate::wire::WireType;

/// A message type of a resolved [`Schema`].
///
/// Cheap to clone; every [`DynamicMessage`] holds one.
#[derive(Clone)]
pub struct MessageType {
    schema: Arc<Schema>,
    descriptor: Arc<MessageDescriptor>,
}

impl MessageType {
    pub(crate) fn new(schema: Arc<Schema>, descriptor: Arc<MessageDescriptor>) -> Self {
        Self { schema, descriptor }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Creates an empty instance.
    pub fn new_message(&self) -> DynamicMessage {
        DynamicMessage {
            message_type: self.clone(),
            fields: BTreeMap::new(),
            unknown: Vec::new(),
        }
    }

    /// Decodes `data` with the default [`CodecOptions`][crate::CodecOptions].
    pub fn decode(&self, data: &[u8]) -> Result<DynamicMessage> {
        crate::codec::decode(data, self)
    }

    /// The message type referenced by a message field.
    pub(crate) fn field_message_type(&self, field: &FieldDescriptor) -> Result<MessageType> {
        match field.field_type() {
            FieldType::Message(name) => {
                let descriptor = self
                    .schema
                    .message(name)
                    .ok_or_else(|| Error::UnresolvedReference {
                        scope: format!("{}.{}", self.full_name(), field.name()),
                        name: name.clone(),
                    })?;
                Ok(MessageType::new(self.schema.clone(), descriptor.clone()))
            }
            other => Err(Error::TypeMismatch {
                field_number: field.number(),
                expected: other.to_string(),
                found: "message",
            }),
        }
    }

    /// The value of an absent field without declared default. Message fields have none.
    fn zero_value(&self, field_type: &FieldType) -> Option<Value> {
        Some(match field_type {
            FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => Value::Int32(0),
            FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => Value::Int64(0),
            FieldType::UInt32 | FieldType::Fixed32 => Value::UInt32(0),
            FieldType::UInt64 | FieldType::Fixed64 => Value::UInt64(0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Enum(name) => Value::Enum(
                self.schema
                    .enum_type(name)
                    .map(|e| e.default_value())
                    .unwrap_or(0),
            ),
            FieldType::Message(_) => return None,
        })
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.full_name()).finish()
    }
}

/// A field that was present on the wire but is not declared in the schema.
///
/// Kept as the exact bytes read (tag included) and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    field_number: u32,
    wire_type: WireType,
    raw: Vec<u8>,
    value_start: usize,
}

impl UnknownField {
    pub(crate) fn from_record(record: &Record) -> Self {
        Self {
            field_number: record.field_number,
            wire_type: record.wire_type,
            raw: record.raw.to_vec(),
            value_start: record.value_offset - record.offset,
        }
    }

    pub fn field_number(&self) -> u32 {
        self.field_number
    }

    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// The complete record including the tag
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The value without tag (and without length prefix for length delimited records)
    pub fn payload(&self) -> &[u8] {
        &self.raw[self.value_start..]
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Single(Value),
    Repeated(Vec<Value>),
}

impl Slot {
    fn values(&self) -> &[Value] {
        match self {
            Slot::Single(value) => std::slice::from_ref(value),
            Slot::Repeated(values) => values,
        }
    }
}

/// An instance of a message type whose layout is only known at runtime.
///
/// Fields are addressed by number. Only fields that were explicitly set are present;
/// reading an absent field yields its default.
///
/// ## Example
///
/// ```
/// use schemabuf::{FieldDescriptor, FieldType, MessageDescriptor, Schema, Value};
///
/// let mut builder = Schema::builder();
/// builder.register_message(
///     MessageDescriptor::new("Room")
///         .field(FieldDescriptor::required(1, "name", FieldType::String))
///         .field(FieldDescriptor::optional(2, "lights", FieldType::UInt32).with_default(1u32)),
/// )?;
/// let schema = builder.resolve()?;
///
/// let mut room = schema.new_message("Room")?;
/// assert!(!room.is_initialized());
/// assert_eq!(room.get(2)?.as_value(), Some(&Value::UInt32(1)));
///
/// room.set(1, "kitchen")?;
/// assert!(room.is_initialized());
/// assert_eq!(room.encode()?, b"\x0a\x07kitchen");
/// # Ok::<(), schemabuf::Error>(())
/// ```
#[derive(Clone)]
pub struct DynamicMessage {
    message_type: MessageType,
    fields: BTreeMap<u32, Slot>,
    unknown: Vec<UnknownField>,
}

impl DynamicMessage {
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        self.message_type.descriptor()
    }

    pub fn full_name(&self) -> &str {
        self.message_type.full_name()
    }

    /// Reads a field.
    ///
    /// Absent singular fields yield the declared default or the zero value of the type,
    /// absent message fields yield [`FieldValue::Unset`] and absent repeated fields an
    /// empty list.
    pub fn get(&self, number: u32) -> Result<FieldValue<'_>> {
        let field = self.field(number)?;
        Ok(match self.fields.get(&number) {
            Some(Slot::Single(value)) => FieldValue::Value(Cow::Borrowed(value)),
            Some(Slot::Repeated(values)) => FieldValue::List(values),
            None if field.is_repeated() => FieldValue::List(&[]),
            None => match field.default_value() {
                Some(default) => FieldValue::Value(Cow::Borrowed(default)),
                None => match self.message_type.zero_value(field.field_type()) {
                    Some(zero) => FieldValue::Value(Cow::Owned(zero)),
                    None => FieldValue::Unset,
                },
            },
        })
    }

    /// Sets a singular field, marking it present even if `value` equals the default.
    pub fn set(&mut self, number: u32, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self.field(number)?;
        if field.is_repeated() {
            return Err(Error::CardinalityViolation {
                field_number: number,
                cardinality: Cardinality::Repeated,
            });
        }
        self.check_type(field, &value)?;
        self.fields.insert(number, Slot::Single(value));
        Ok(())
    }

    /// Appends to a repeated field.
    pub fn append(&mut self, number: u32, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self.field(number)?;
        if !field.is_repeated() {
            return Err(Error::CardinalityViolation {
                field_number: number,
                cardinality: field.cardinality(),
            });
        }
        self.check_type(field, &value)?;
        self.push(number, value);
        Ok(())
    }

    /// Sets an enum field by symbol.
    pub fn set_enum_by_name(&mut self, number: u32, symbol: &str) -> Result<()> {
        let field = self.field(number)?;
        let value = match field.field_type() {
            FieldType::Enum(name) => self
                .message_type
                .schema
                .enum_type(name)
                .and_then(|e| e.value_of(symbol))
                .ok_or_else(|| Error::UnresolvedReference {
                    scope: format!("{}.{}", self.full_name(), field.name()),
                    name: symbol.to_owned(),
                })?,
            other => {
                return Err(Error::TypeMismatch {
                    field_number: number,
                    expected: other.to_string(),
                    found: "enum",
                })
            }
        };
        if field.is_repeated() {
            self.append(number, Value::Enum(value))
        } else {
            self.set(number, Value::Enum(value))
        }
    }

    /// Creates an empty message of the type of the given message field, e.g. for
    /// [`append`][Self::append]ing it to a repeated field.
    pub fn new_field_message(&self, number: u32) -> Result<DynamicMessage> {
        let field = self.field(number)?;
        Ok(self.message_type.field_message_type(field)?.new_message())
    }

    /// Mutable access to a singular message field, creating an empty message if absent.
    pub fn field_message_mut(&mut self, number: u32) -> Result<&mut DynamicMessage> {
        let field = self.field(number)?;
        if field.is_repeated() {
            return Err(Error::CardinalityViolation {
                field_number: number,
                cardinality: Cardinality::Repeated,
            });
        }
        let message_type = self.message_type.field_message_type(field)?;
        let slot = self
            .fields
            .entry(number)
            .or_insert_with(|| Slot::Single(Value::Message(Box::new(message_type.new_message()))));
        match slot {
            Slot::Single(Value::Message(message)) => Ok(message),
            Slot::Single(other) => Err(Error::TypeMismatch {
                field_number: number,
                expected: "message".to_owned(),
                found: other.type_name(),
            }),
            Slot::Repeated(_) => Err(Error::CardinalityViolation {
                field_number: number,
                cardinality: Cardinality::Repeated,
            }),
        }
    }

    /// Whether a field was explicitly set (or, for repeated fields, has any entries).
    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Removes a field so that it reads as default again.
    pub fn clear_field(&mut self, number: u32) -> Result<()> {
        self.field(number)?;
        self.fields.remove(&number);
        Ok(())
    }

    /// Removes all fields, unknown fields included.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.unknown.clear();
    }

    /// True when all required fields are set, recursively through nested messages.
    pub fn is_initialized(&self) -> bool {
        let required_set = self
            .descriptor()
            .fields()
            .all(|f| !f.is_required() || self.fields.contains_key(&f.number()));
        required_set
            && self.fields.values().all(|slot| {
                slot.values()
                    .iter()
                    .all(|v| v.as_message().map_or(true, DynamicMessage::is_initialized))
            })
    }

    /// Paths of all missing required fields, e.g. `phones[1].number`.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        self.collect_missing("", &mut missing);
        missing
    }

    fn collect_missing(&self, prefix: &str, missing: &mut Vec<String>) {
        let descriptor = self.descriptor();
        for field in descriptor.fields() {
            if field.is_required() && !self.fields.contains_key(&field.number()) {
                missing.push(format!("{prefix}{}", field.name()));
            }
        }
        for (number, slot) in &self.fields {
            let name = descriptor
                .field_by_number(*number)
                .map(FieldDescriptor::name)
                .unwrap_or_default();
            match slot {
                Slot::Single(Value::Message(message)) => {
                    message.collect_missing(&format!("{prefix}{name}."), missing)
                }
                Slot::Repeated(values) => {
                    for (i, value) in values.iter().enumerate() {
                        if let Value::Message(message) = value {
                            message.collect_missing(&format!("{prefix}{name}[{i}]."), missing);
                        }
                    }
                }
                Slot::Single(_) => {}
            }
        }
    }

    /// The set fields in ascending field number order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, FieldValue<'_>)> {
        let descriptor = self.message_type.descriptor.as_ref();
        self.fields.iter().filter_map(move |(number, slot)| {
            let field = descriptor.field_by_number(*number)?;
            let value = match slot {
                Slot::Single(value) => FieldValue::Value(Cow::Borrowed(value)),
                Slot::Repeated(values) => FieldValue::List(values),
            };
            Some((field, value))
        })
    }

    /// Fields read from the wire that the schema does not declare, in the order read.
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// Encodes with the default [`CodecOptions`][crate::CodecOptions].
    pub fn encode(&self) -> Result<Vec<u8>> {
        crate::codec::encode(self)
    }

    /// Set fields as (number, values) pairs in ascending order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (u32, &[Value])> {
        self.fields.iter().map(|(number, slot)| (*number, slot.values()))
    }

    /// Stores a decoded value: repeated fields append, singular fields are replaced.
    pub(crate) fn insert_decoded(&mut self, field: &FieldDescriptor, value: Value) {
        if field.is_repeated() {
            self.push(field.number(), value);
        } else {
            self.fields.insert(field.number(), Slot::Single(value));
        }
    }

    pub(crate) fn push_unknown(&mut self, field: UnknownField) {
        self.unknown.push(field);
    }

    fn push(&mut self, number: u32, value: Value) {
        let slot = self
            .fields
            .entry(number)
            .or_insert_with(|| Slot::Repeated(Vec::new()));
        match slot {
            Slot::Repeated(values) => values.push(value),
            Slot::Single(_) => *slot = Slot::Repeated(vec![value]),
        }
    }

    /// Message values must come from the very descriptor the field resolves to, a
    /// same-named type of another schema is rejected.
    fn check_type(&self, field: &FieldDescriptor, value: &Value) -> Result<()> {
        let accepted = field.field_type().accepts(value)
            && match value {
                Value::Message(nested) => {
                    let expected = self.message_type.field_message_type(field)?;
                    Arc::ptr_eq(&expected.descriptor, &nested.message_type.descriptor)
                }
                _ => true,
            };
        if accepted {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field_number: field.number(),
                expected: field.field_type().to_string(),
                found: value.type_name(),
            })
        }
    }

    fn field(&self, number: u32) -> Result<&FieldDescriptor> {
        self.message_type
            .descriptor
            .field_by_number(number)
            .ok_or_else(|| Error::UnknownField {
                message: self.full_name().to_owned(),
                field_number: number,
            })
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name()
            && self.fields == other.fields
            && self.unknown == other.unknown
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.full_name());
        for (field, value) in self.fields() {
            match value {
                FieldValue::Value(value) => out.field(field.name(), &value),
                FieldValue::List(values) => out.field(field.name(), &values),
                FieldValue::Unset => out.field(field.name(), &"unset"),
            };
        }
        if !self.unknown.is_empty() {
            out.field("unknown", &self.unknown);
        }
        out.finish()
    }
}
