//! A schema driven protobuf encoder and decoder for messages whose layout is only
//! known at runtime.
//!
//! Schemas are built from descriptors in memory, there is no `.proto` parser. Messages
//! follow proto2 semantics: required/optional/repeated fields, explicit defaults and
//! presence tracking, i.e. an optional field set to its default is still written.
//!
//! The crate is split in three layers:
//!
//! - [`schemabuf::WireWriter`][crate::WireWriter] and [`schemabuf::WireReader`][crate::WireReader]
//!   write and read raw tag/value records without any schema knowledge
//! - [`schemabuf::Schema`][crate::Schema] holds resolved message and enum descriptors
//! - [`schemabuf::Codec`][crate::Codec] turns [`DynamicMessage`]s into bytes and back
//!
//! ## Example
//!
//! ```
//! use schemabuf::{EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, Schema, Value};
//!
//! let mut builder = Schema::builder();
//! builder.register_message(
//!     MessageDescriptor::new("Person")
//!         .field(FieldDescriptor::required(1, "name", FieldType::String))
//!         .field(FieldDescriptor::required(2, "id", FieldType::Int32))
//!         .field(FieldDescriptor::optional(3, "email", FieldType::String))
//!         .field(FieldDescriptor::repeated(4, "phones", FieldType::Message("PhoneNumber".into())))
//!         .nested_enum(
//!             EnumDescriptor::new("PhoneType")
//!                 .value("MOBILE", 0)
//!                 .value("HOME", 1)
//!                 .value("WORK", 2),
//!         )
//!         .nested_message(
//!             MessageDescriptor::new("PhoneNumber")
//!                 .field(FieldDescriptor::required(1, "number", FieldType::String))
//!                 .field(
//!                     FieldDescriptor::optional(2, "type", FieldType::Enum("PhoneType".into()))
//!                         .with_default_enum("HOME"),
//!                 ),
//!         ),
//! )?;
//! let schema = builder.resolve()?;
//!
//! let mut person = schema.new_message("Person")?;
//! person.set(1, "A")?;
//! person.set(2, 1234)?;
//! let mut phone = person.new_field_message(4)?;
//! phone.set(1, "555-4321")?;
//! person.append(4, phone)?;
//!
//! let serialized = schemabuf::encode(&person)?;
//! assert_eq!(&serialized[..3], b"\x0a\x01A");
//!
//! let decoded = schemabuf::decode(&serialized, person.message_type())?;
//! assert_eq!(decoded, person);
//! let phones = decoded.get(4)?;
//! let phone = phones.as_list()[0].as_message().unwrap();
//! // unset, so the declared default
//! assert_eq!(phone.get(2)?.as_value(), Some(&Value::Enum(1)));
//! # Ok::<(), schemabuf::Error>(())
//! ```
//!
//! ## Non goals
//! - Groups (deprecated, see <https://protobuf.dev/programming-guides/proto2/#groups>)
//! - Extensions, oneofs, maps
//! - Writing packed fields (packed input is accepted when decoding)

mod codec;
mod error;
mod message;
mod reader;
mod schema;
mod slice_reader;
mod value;
mod varint;
mod wire;
mod writer;

pub use codec::{decode, encode, Codec, CodecOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_INPUT_LEN};
pub use error::{Error, Result};
pub use message::{DynamicMessage, MessageType, UnknownField};
pub use reader::{Record, WireReader};
pub use schema::{
    Cardinality, EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, Schema,
    SchemaBuilder, RESERVED_FIELD_NUMBERS,
};
pub use value::{FieldValue, Value};
pub use varint::{
    decode_varint, encode_varint, encode_varint_into, from_zigzag32, from_zigzag64, to_zigzag32,
    to_zigzag64, varint_len, MAX_VARINT_LEN,
};
pub use wire::{make_tag, split_tag, WireType, WireValue, MAX_FIELD_NUMBER};
pub use writer::WireWriter;
