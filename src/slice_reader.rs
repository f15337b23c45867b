use crate::error::{Error, Result};
use crate::varint::decode_varint;

/// A mutable reader over a window of an immutable data source.
///
/// Positions are absolute offsets into `data`, so errors raised while reading a
/// nested window still point into the top-level buffer.
pub struct SliceReader<'x> {
    data: &'x [u8],
    pos: usize,
    end: usize,
}

impl<'x> SliceReader<'x> {
    pub fn new(data: &'x [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
        }
    }

    /// Reader over `data[start..end]`.
    pub fn window(data: &'x [u8], start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= data.len());
        Self {
            data,
            pos: start,
            end,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }

    /// Remaining data to read
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    /// Absolute position of the next byte
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The bytes between `start` and the current position.
    pub fn since(&self, start: usize) -> &'x [u8] {
        &self.data[start..self.pos]
    }

    /// Advances the position by `n`.
    /// Note that advancing beyond the end of the window is illegal and undefined behaviour.
    fn advance_by(&mut self, n: usize) {
        self.pos += n;
        debug_assert!(self.pos <= self.end)
    }

    /// Reads `n` bytes and advances the reader by `n`
    pub fn read(&mut self, n: usize) -> Result<&'x [u8]> {
        if self.len() < n {
            return Err(Error::TruncatedInput { offset: self.pos });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.advance_by(n);
        Ok(out)
    }

    /// Reads `N` bytes and advances the reader by `N`.
    /// The result is copied into an array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    /// Reads one varint and advances the reader past it
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = decode_varint(&self.data[..self.end], self.pos)?;
        self.advance_by(consumed);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fixed_length_works() {
        let original = vec![5u8, 7, 234, 2, 45, 0, 12, 32, 192];

        // read 3
        let mut reader = SliceReader::new(&original);
        assert_eq!(reader.read_array::<3>().unwrap(), [5, 7, 234]);
        assert_eq!(reader.len(), 6);

        // read 0
        let mut reader = SliceReader::new(&original);
        assert_eq!(reader.read_array::<0>().unwrap(), []);
        assert_eq!(reader.len(), 9);

        // read 10 (exceeds length)
        let mut reader = SliceReader::new(&original);
        assert_eq!(
            reader.read_array::<10>().unwrap_err(),
            Error::TruncatedInput { offset: 0 }
        );
        assert_eq!(reader.len(), 9);

        // consecutive reads (2, 3, 4 bytes)
        let mut reader = SliceReader::new(&original);
        assert_eq!(reader.read_array::<2>().unwrap(), [5, 7]);
        assert_eq!(reader.read_array::<3>().unwrap(), [234, 2, 45]);
        assert_eq!(reader.read_array::<4>().unwrap(), [0, 12, 32, 192]);
        assert!(reader.is_empty());
    }

    #[test]
    fn window_reports_absolute_positions() {
        let original = [1u8, 2, 3, 4, 5, 6];
        let mut reader = SliceReader::window(&original, 2, 4);
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read(1).unwrap(), [3]);
        assert_eq!(reader.since(2), [3]);
        // the window ends before the data does
        assert_eq!(reader.read(2).unwrap_err(), Error::TruncatedInput { offset: 3 });
        assert_eq!(reader.read(1).unwrap(), [4]);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_varint_respects_window() {
        // 0xAC 0x02 is 300, but the window cuts it in half
        let original = [0x00, 0xAC, 0x02];
        let mut reader = SliceReader::window(&original, 1, 2);
        assert_eq!(reader.read_varint().unwrap_err(), Error::TruncatedInput { offset: 1 });

        let mut reader = SliceReader::window(&original, 1, 3);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert!(reader.is_empty());
    }
}
