use std::borrow::Cow;

use crate::message::DynamicMessage;

/// A dynamically typed field value.
///
/// Several field types share one variant: `int32`, `sint32` and `sfixed32` are all
/// stored as [`Value::Int32`]; the field descriptor decides the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// int32, sint32, sfixed32
    Int32(i32),
    /// int64, sint64, sfixed64
    Int64(i64),
    /// uint32, fixed32
    UInt32(u32),
    /// uint64, fixed64
    UInt64(u64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// The numeric value of an enum. Numbers unknown to the enum are kept as they are.
    Enum(i32),
    Message(Box<DynamicMessage>),
}

impl Value {
    /// Short name of the stored type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) | Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) | Value::Enum(v) => Some((*v).into()),
            Value::Int64(v) => Some(*v),
            Value::UInt32(v) => Some((*v).into()),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt32(v) => Some((*v).into()),
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some((*v).into()),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            Value::String(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match self {
            Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DynamicMessage> for Value {
    fn from(v: DynamicMessage) -> Self {
        Value::Message(Box::new(v))
    }
}

/// The result of reading a field with [`DynamicMessage::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// A singular field: the explicitly set value or the default
    Value(Cow<'a, Value>),
    /// A repeated field in insertion order, empty if nothing was appended
    List(&'a [Value]),
    /// A message field that was never set. Message fields have no default.
    Unset,
}

impl<'a> FieldValue<'a> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The list of a repeated field. Singular fields yield an empty slice.
    pub fn as_list(&self) -> &'a [Value] {
        match self {
            FieldValue::List(values) => *values,
            _ => &[],
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            FieldValue::Value(v) => Some(v.into_owned()),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, FieldValue::Unset)
    }
}
