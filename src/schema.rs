use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::message::{DynamicMessage, MessageType};
use crate::value::Value;
use crate::wire::{WireType, MAX_FIELD_NUMBER};

/// Field numbers reserved by the protobuf implementation.
///
/// <https://protobuf.dev/programming-guides/proto2/#assigning>
pub const RESERVED_FIELD_NUMBERS: RangeInclusive<u32> = 19000..=19999;

/// The declared type of a field.
///
/// Enum and message types reference other descriptors by name. Before
/// [`SchemaBuilder::resolve`] the name may be relative to the enclosing message, afterwards
/// it is always the full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    /// ZigZag encoded int32
    SInt32,
    /// ZigZag encoded int64
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    Float,
    Double,
    String,
    Bytes,
    Enum(String),
    Message(String),
}

impl FieldType {
    /// The wire type values of this type are written with.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::SInt32
            | FieldType::SInt64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Fixed32 | FieldType::SFixed32 | FieldType::Float => WireType::I32,
            FieldType::Fixed64 | FieldType::SFixed64 | FieldType::Double => WireType::I64,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => WireType::Len,
        }
    }

    /// Numeric types can appear packed into a single length delimited record.
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::Len
    }

    pub fn is_message(&self) -> bool {
        matches!(self, FieldType::Message(_))
    }

    /// Checks whether `value` can be stored in a field of this type.
    ///
    /// Message values are matched by full name only; [`DynamicMessage`] additionally
    /// checks that they belong to the same schema.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32, Value::Int32(_)) => true,
            (FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64, Value::Int64(_)) => true,
            (FieldType::UInt32 | FieldType::Fixed32, Value::UInt32(_)) => true,
            (FieldType::UInt64 | FieldType::Fixed64, Value::UInt64(_)) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Float, Value::Float(_)) => true,
            (FieldType::Double, Value::Double(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Enum(_), Value::Enum(_)) => true,
            (FieldType::Message(name), Value::Message(message)) => message.full_name() == name,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::SInt32 => "sint32",
            FieldType::SInt64 => "sint64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Fixed64 => "fixed64",
            FieldType::SFixed32 => "sfixed32",
            FieldType::SFixed64 => "sfixed64",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Enum(name) => return write!(f, "enum {name}"),
            FieldType::Message(name) => return write!(f, "message {name}"),
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Required,
    Optional,
    Repeated,
}

/// Describes a single field of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    number: u32,
    name: String,
    field_type: FieldType,
    cardinality: Cardinality,
    default: Option<Value>,
    /// Symbolic enum default, turned into `default` during resolution
    default_enum: Option<String>,
}

impl FieldDescriptor {
    pub fn new(
        number: u32,
        name: impl Into<String>,
        field_type: FieldType,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            number,
            name: name.into(),
            field_type,
            cardinality,
            default: None,
            default_enum: None,
        }
    }

    pub fn required(number: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(number, name, field_type, Cardinality::Required)
    }

    pub fn optional(number: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(number, name, field_type, Cardinality::Optional)
    }

    pub fn repeated(number: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(number, name, field_type, Cardinality::Repeated)
    }

    /// Sets an explicit default. Only allowed on optional, non-message fields.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.default_enum = None;
        self
    }

    /// Sets the default of an enum field by symbol, e.g. `HOME`.
    pub fn with_default_enum(mut self, symbol: impl Into<String>) -> Self {
        self.default_enum = Some(symbol.into());
        self.default = None;
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_required(&self) -> bool {
        self.cardinality == Cardinality::Required
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// The explicitly declared default, if any.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    fn validate(&self, message: &str) -> Result<()> {
        if self.number == 0
            || self.number > MAX_FIELD_NUMBER
            || RESERVED_FIELD_NUMBERS.contains(&self.number)
        {
            return Err(Error::InvalidFieldNumber {
                message: message.to_owned(),
                number: self.number,
            });
        }
        let invalid = |reason: &str| Error::InvalidDefinition {
            name: format!("{message}.{}", self.name),
            reason: reason.to_owned(),
        };
        if self.name.is_empty() {
            return Err(invalid("empty field name"));
        }
        let has_default = self.default.is_some() || self.default_enum.is_some();
        if has_default && self.cardinality != Cardinality::Optional {
            return Err(invalid("only optional fields can have a default"));
        }
        if has_default && self.field_type.is_message() {
            return Err(invalid("message fields cannot have a default"));
        }
        if self.default_enum.is_some() && !matches!(self.field_type, FieldType::Enum(_)) {
            return Err(invalid("symbolic default on a non-enum field"));
        }
        if let Some(default) = &self.default {
            if !self.field_type.accepts(default) {
                return Err(invalid(&format!(
                    "default of type {} does not match {}",
                    default.type_name(),
                    self.field_type
                )));
            }
        }
        Ok(())
    }
}

/// Describes a message: its fields plus the enums and messages nested in it.
///
/// ## Example
///
/// ```
/// use schemabuf::{EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor};
///
/// let phone_number = MessageDescriptor::new("PhoneNumber")
///     .field(FieldDescriptor::required(1, "number", FieldType::String))
///     .field(
///         FieldDescriptor::optional(2, "type", FieldType::Enum("PhoneType".into()))
///             .with_default_enum("HOME"),
///     );
/// let person = MessageDescriptor::new("Person")
///     .field(FieldDescriptor::required(1, "name", FieldType::String))
///     .field(FieldDescriptor::repeated(4, "phones", FieldType::Message("PhoneNumber".into())))
///     .nested_enum(
///         EnumDescriptor::new("PhoneType")
///             .value("MOBILE", 0)
///             .value("HOME", 1)
///             .value("WORK", 2),
///     )
///     .nested_message(phone_number);
/// assert_eq!(person.field_by_name("phones").unwrap().number(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    name: String,
    full_name: String,
    fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
    nested_messages: Vec<MessageDescriptor>,
    nested_enums: Vec<EnumDescriptor>,
    /// Full names of the nested types, filled in on registration
    nested_names: Vec<String>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            fields: Vec::new(),
            by_number: HashMap::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            nested_names: Vec::new(),
        }
    }

    /// Adds a field. Fields keep their declaration order.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.by_number.insert(field.number, self.fields.len());
        self.fields.push(field);
        self
    }

    pub fn nested_message(mut self, message: MessageDescriptor) -> Self {
        self.nested_messages.push(message);
        self
    }

    pub fn nested_enum(mut self, enumeration: EnumDescriptor) -> Self {
        self.nested_enums.push(enumeration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dotted name including enclosing messages, e.g. `Person.PhoneNumber`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Full names of the types declared inside this message.
    pub fn nested_names(&self) -> &[String] {
        &self.nested_names
    }

    fn validate(&self) -> Result<()> {
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();
        for field in &self.fields {
            field.validate(&self.full_name)?;
            if !numbers.insert(field.number) {
                return Err(Error::DuplicateDefinition {
                    name: format!("{} field number {}", self.full_name, field.number),
                });
            }
            if !names.insert(field.name.as_str()) {
                return Err(Error::DuplicateDefinition {
                    name: format!("{}.{}", self.full_name, field.name),
                });
            }
        }
        Ok(())
    }

    /// Moves nested types out into flat lists, assigning full names on the way.
    fn flatten(
        mut self,
        scope: Option<&str>,
        messages: &mut Vec<MessageDescriptor>,
        enums: &mut Vec<EnumDescriptor>,
    ) {
        self.full_name = qualify(scope, &self.name);
        for mut enumeration in std::mem::take(&mut self.nested_enums) {
            enumeration.full_name = qualify(Some(&self.full_name), &enumeration.name);
            self.nested_names.push(enumeration.full_name.clone());
            enums.push(enumeration);
        }
        for nested in std::mem::take(&mut self.nested_messages) {
            self.nested_names.push(qualify(Some(&self.full_name), &nested.name));
            nested.flatten(Some(&self.full_name), messages, enums);
        }
        messages.push(self);
    }
}

/// Describes an enum. Symbols must be unique, numbers may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    full_name: String,
    values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            values: Vec::new(),
        }
    }

    pub fn value(mut self, symbol: impl Into<String>, number: i32) -> Self {
        self.values.push((symbol.into(), number));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(s, n)| (s.as_str(), *n))
    }

    /// The first declared value, which is the default of enum fields without explicit default.
    pub fn default_value(&self) -> i32 {
        self.values.first().map(|(_, n)| *n).unwrap_or(0)
    }

    pub fn value_of(&self, symbol: &str) -> Option<i32> {
        self.values.iter().find(|(s, _)| s == symbol).map(|(_, n)| *n)
    }

    /// The first symbol declared for `number`.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(s, _)| s.as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(Error::InvalidDefinition {
                name: self.full_name.clone(),
                reason: "an enum needs at least one value".to_owned(),
            });
        }
        let mut symbols = HashSet::new();
        for (symbol, _) in &self.values {
            if !symbols.insert(symbol.as_str()) {
                return Err(Error::DuplicateDefinition {
                    name: format!("{}.{}", self.full_name, symbol),
                });
            }
        }
        Ok(())
    }
}

/// Collects descriptors until [`SchemaBuilder::resolve`] turns them into a [`Schema`].
///
/// Any failed registration poisons the builder: `resolve` then returns that error.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    names: HashSet<String>,
    imports: Vec<Arc<Schema>>,
    poisoned: Option<Error>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the types of an already resolved schema available for references.
    pub fn import(&mut self, schema: Arc<Schema>) -> Result<&mut Self> {
        let clash = schema
            .message_names()
            .chain(schema.enum_names())
            .find(|name| self.names.contains(*name))
            .map(str::to_owned);
        if let Some(name) = clash {
            return Err(self.poison(Error::DuplicateDefinition { name }));
        }
        self.imports.push(schema);
        Ok(self)
    }

    /// Registers a message together with all nested messages and enums.
    pub fn register_message(&mut self, descriptor: MessageDescriptor) -> Result<&mut Self> {
        if let Err(err) = check_name(&descriptor.name) {
            return Err(self.poison(err));
        }
        let mut messages = Vec::new();
        let mut enums = Vec::new();
        descriptor.flatten(None, &mut messages, &mut enums);
        let checked = messages
            .iter()
            .try_for_each(|m| check_name(&m.name).and_then(|_| m.validate()))
            .and_then(|_| {
                enums
                    .iter()
                    .try_for_each(|e| check_name(&e.name).and_then(|_| e.validate()))
            })
            .and_then(|_| {
                self.check_unique(
                    messages
                        .iter()
                        .map(|m| m.full_name.as_str())
                        .chain(enums.iter().map(|e| e.full_name.as_str())),
                )
            });
        if let Err(err) = checked {
            return Err(self.poison(err));
        }
        for message in &messages {
            debug!("registered message {}", message.full_name);
            self.names.insert(message.full_name.clone());
        }
        for enumeration in &enums {
            debug!("registered enum {}", enumeration.full_name);
            self.names.insert(enumeration.full_name.clone());
        }
        self.messages.extend(messages);
        self.enums.extend(enums);
        Ok(self)
    }

    /// Registers a top level enum.
    pub fn register_enum(&mut self, descriptor: EnumDescriptor) -> Result<&mut Self> {
        let checked = check_name(&descriptor.name)
            .and_then(|_| descriptor.validate())
            .and_then(|_| self.check_unique(std::iter::once(descriptor.full_name.as_str())));
        if let Err(err) = checked {
            return Err(self.poison(err));
        }
        debug!("registered enum {}", descriptor.full_name);
        self.names.insert(descriptor.full_name.clone());
        self.enums.push(descriptor);
        Ok(self)
    }

    /// Resolves all type references and freezes the schema.
    pub fn resolve(self) -> Result<Arc<Schema>> {
        if let Some(err) = self.poisoned {
            return Err(err);
        }

        let mut messages: HashMap<String, Arc<MessageDescriptor>> = HashMap::new();
        let mut enums: HashMap<String, Arc<EnumDescriptor>> = HashMap::new();
        for import in &self.imports {
            for (name, message) in &import.messages {
                insert_shared(&mut messages, name, message)?;
            }
            for (name, enumeration) in &import.enums {
                insert_shared(&mut enums, name, enumeration)?;
            }
        }
        for enumeration in self.enums {
            enums.insert(enumeration.full_name.clone(), Arc::new(enumeration));
        }

        let message_names: HashSet<String> = messages
            .keys()
            .cloned()
            .chain(self.messages.iter().map(|m| m.full_name.clone()))
            .collect();
        let mut resolved = Vec::with_capacity(self.messages.len());
        for mut message in self.messages {
            let scope = message.full_name.clone();
            for field in &mut message.fields {
                resolve_field(&scope, field, &message_names, &enums)?;
            }
            resolved.push(message);
        }
        for message in resolved {
            messages.insert(message.full_name.clone(), Arc::new(message));
        }

        debug!(
            "resolved schema with {} messages and {} enums",
            messages.len(),
            enums.len()
        );
        Ok(Arc::new(Schema { messages, enums }))
    }

    fn check_unique<'n>(&self, mut names: impl Iterator<Item = &'n str>) -> Result<()> {
        let mut batch = HashSet::new();
        match names.find(|name| {
            !batch.insert(*name)
                || self.names.contains(*name)
                || self.imports.iter().any(|schema| schema.contains(name))
        }) {
            Some(name) => Err(Error::DuplicateDefinition {
                name: name.to_owned(),
            }),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: Error) -> Error {
        if self.poisoned.is_none() {
            self.poisoned = Some(err.clone());
        }
        err
    }
}

/// A resolved, immutable set of message and enum descriptors.
///
/// Shared through an [`Arc`] by every message created from it; safe to use from many
/// threads at once.
#[derive(Debug)]
pub struct Schema {
    messages: HashMap<String, Arc<MessageDescriptor>>,
    enums: HashMap<String, Arc<EnumDescriptor>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn message(&self, full_name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(full_name)
    }

    pub fn enum_type(&self, full_name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(full_name)
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.messages.contains_key(full_name) || self.enums.contains_key(full_name)
    }

    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }

    /// A handle to encode, decode and create messages of the given type.
    pub fn message_type(self: &Arc<Self>, full_name: &str) -> Result<MessageType> {
        let descriptor = self
            .message(full_name)
            .ok_or_else(|| Error::UnresolvedReference {
                scope: "schema".to_owned(),
                name: full_name.to_owned(),
            })?
            .clone();
        Ok(MessageType::new(self.clone(), descriptor))
    }

    /// Creates an empty message of the given type.
    pub fn new_message(self: &Arc<Self>, full_name: &str) -> Result<DynamicMessage> {
        Ok(self.message_type(full_name)?.new_message())
    }
}

fn qualify(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(scope) => format!("{scope}.{name}"),
        None => name.to_owned(),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') {
        return Err(Error::InvalidDefinition {
            name: name.to_owned(),
            reason: "type names must be non-empty and must not contain '.'".to_owned(),
        });
    }
    Ok(())
}

/// Adds an imported descriptor. The same descriptor reachable through two imports is fine,
/// two different descriptors with one name are not.
fn insert_shared<T>(table: &mut HashMap<String, Arc<T>>, name: &str, item: &Arc<T>) -> Result<()> {
    match table.get(name) {
        Some(existing) if !Arc::ptr_eq(existing, item) => Err(Error::DuplicateDefinition {
            name: name.to_owned(),
        }),
        Some(_) => Ok(()),
        None => {
            table.insert(name.to_owned(), item.clone());
            Ok(())
        }
    }
}

/// Finds `name` starting in `scope` and walking outwards to the root.
/// A leading `.` makes the name fully qualified.
fn lookup(scope: &str, name: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    if let Some(absolute) = name.strip_prefix('.') {
        return exists(absolute).then(|| absolute.to_owned());
    }
    let mut scope = Some(scope);
    while let Some(current) = scope {
        let candidate = format!("{current}.{name}");
        if exists(&candidate) {
            return Some(candidate);
        }
        scope = current.rfind('.').map(|i| &current[..i]);
    }
    exists(name).then(|| name.to_owned())
}

fn resolve_field(
    scope: &str,
    field: &mut FieldDescriptor,
    messages: &HashSet<String>,
    enums: &HashMap<String, Arc<EnumDescriptor>>,
) -> Result<()> {
    let unresolved = |name: &str| Error::UnresolvedReference {
        scope: format!("{scope}.{}", field.name),
        name: name.to_owned(),
    };
    match &field.field_type {
        FieldType::Message(name) => {
            let full_name = lookup(scope, name, |c| messages.contains(c)).ok_or_else(|| unresolved(name))?;
            field.field_type = FieldType::Message(full_name);
        }
        FieldType::Enum(name) => {
            let full_name = lookup(scope, name, |c| enums.contains_key(c)).ok_or_else(|| unresolved(name))?;
            if let Some(symbol) = &field.default_enum {
                let number = enums
                    .get(&full_name)
                    .and_then(|e| e.value_of(symbol))
                    .ok_or_else(|| unresolved(symbol))?;
                field.default = Some(Value::Enum(number));
                field.default_enum = None;
            }
            field.field_type = FieldType::Enum(full_name);
        }
        _ => {}
    }
    Ok(())
}
