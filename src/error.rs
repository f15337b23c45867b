use thiserror::Error as ThisError;

use crate::schema::Cardinality;
use crate::wire::WireType;

/// Everything that can go wrong while building schemas, filling messages or
/// encoding/decoding them.
///
/// Decode errors carry the absolute byte offset into the buffer passed to the decoder.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("input truncated at byte {offset}")]
    TruncatedInput { offset: usize },
    #[error("varint at byte {offset} does not fit into 64 bits")]
    VarintOverflow { offset: usize },
    #[error("invalid tag {tag:#x} at byte {offset}")]
    InvalidTag { offset: usize, tag: u64 },
    #[error("unsupported wire type {wire_type} at byte {offset}")]
    UnsupportedWireType { offset: usize, wire_type: u8 },
    #[error("field {field_number} at byte {offset}: expected wire type {expected:?}, found {found:?}")]
    WireTypeMismatch {
        offset: usize,
        field_number: u32,
        expected: WireType,
        found: WireType,
    },
    #[error("field {field_number} at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize, field_number: u32 },

    #[error("duplicate definition: {name}")]
    DuplicateDefinition { name: String },
    #[error("unresolved reference to {name:?} in {scope}")]
    UnresolvedReference { scope: String, name: String },
    #[error("invalid field number {number} in {message}")]
    InvalidFieldNumber { message: String, number: u32 },
    #[error("invalid definition of {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("{message} has no field {field_number}")]
    UnknownField { message: String, field_number: u32 },
    #[error("field {field_number} expects {expected}, got {found}")]
    TypeMismatch {
        field_number: u32,
        expected: String,
        found: &'static str,
    },
    #[error("field {field_number} is {cardinality:?}")]
    CardinalityViolation {
        field_number: u32,
        cardinality: Cardinality,
    },
    #[error("{message} is missing required fields: {}", missing.join(", "))]
    UninitializedMessage {
        message: String,
        missing: Vec<String>,
    },
    #[error("{what} limit of {limit} exceeded")]
    LimitExceeded { what: &'static str, limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
