use crate::error::{Error, Result};
use crate::slice_reader::SliceReader;
use crate::wire::{split_tag, WireType, WireValue};

/// One tag/value pair read from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    pub field_number: u32,
    pub wire_type: WireType,
    pub value: WireValue<'a>,
    /// Absolute offset of the tag
    pub offset: usize,
    /// Absolute offset of the value (for length delimited values: of the payload)
    pub value_offset: usize,
    /// The complete record, tag included, exactly as found in the input
    pub raw: &'a [u8],
}

/// A minimal protobuf record reader.
///
/// Reads tag/value pairs one by one without any schema knowledge. The reading is
/// zero-copy: length delimited values borrow from the input.
///
/// ## Example
///
/// ```
/// use schemabuf::{WireReader, WireValue, WireWriter};
///
/// let mut writer = WireWriter::new();
/// writer.append_uint64(1, 150).append_string(4, "hi");
/// let serialized = writer.into_vec();
///
/// let mut reader = WireReader::new(&serialized);
/// let first = reader.next_record().unwrap().unwrap();
/// assert_eq!(first.field_number, 1);
/// assert_eq!(first.value, WireValue::Varint(150));
/// let second = reader.next_record().unwrap().unwrap();
/// assert_eq!(second.value, WireValue::Len(b"hi"));
/// assert!(reader.next_record().unwrap().is_none());
/// ```
pub struct WireReader<'a> {
    reader: SliceReader<'a>,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: SliceReader::new(data),
        }
    }

    /// Reads the records in `data[start..end]`, reporting offsets relative to `data`.
    pub fn window(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            reader: SliceReader::window(data, start, end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    /// Reads the next record. Returns `None` once the input is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.reader.is_empty() {
            return Ok(None);
        }

        let offset = self.reader.position();
        let tag = self.reader.read_varint()?;
        let (field_number, wire_type) = split_tag(tag, offset)?;

        let (value, value_offset) = read_value(&mut self.reader, wire_type)?;
        Ok(Some(Record {
            field_number,
            wire_type,
            value,
            offset,
            value_offset,
            raw: self.reader.since(offset),
        }))
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                // Stop after the first error, the position is not trustworthy anymore
                self.reader = SliceReader::new(&[]);
                Some(Err(err))
            }
        }
    }
}

/// Reads a value of the given wire type. Returns the value and its absolute offset.
pub(crate) fn read_value<'a>(
    data: &mut SliceReader<'a>,
    wire_type: WireType,
) -> Result<(WireValue<'a>, usize)> {
    let offset = data.position();
    let value = match wire_type {
        WireType::Varint => WireValue::Varint(data.read_varint()?),
        WireType::I64 => WireValue::I64(data.read_array::<8>()?),
        WireType::Len => {
            let length = data.read_varint()?;
            // A length that does not even fit into memory can never be satisfied
            let length = usize::try_from(length).map_err(|_| Error::TruncatedInput { offset })?;
            if data.len() < length {
                return Err(Error::TruncatedInput { offset });
            }
            let payload_offset = data.position();
            return Ok((WireValue::Len(data.read(length)?), payload_offset));
        }
        WireType::I32 => WireValue::I32(data.read_array::<4>()?),
    };
    Ok((value, offset))
}
