//! Binary buffer reader with cursor tracking.

use crate::{BufferError, ByteSource};

/// A binary reader over a byte slice.
///
/// The reader maintains a cursor position; every read is bounds-checked and
/// fails with [`BufferError::EndOfBuffer`] instead of panicking.
///
/// # Example
///
/// ```
/// use jser_buffers::{ByteSource, Reader};
///
/// let data = [0x01, 0x02, 0x03, 0x04];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.read_u8().unwrap(), 0x01);
/// assert_eq!(reader.read_u16().unwrap(), 0x0203);
/// assert_eq!(reader.size(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
    /// End position (exclusive).
    pub end: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader for the given byte slice.
    pub fn new(uint8: &'a [u8]) -> Self {
        let end = uint8.len();
        Self { uint8, x: 0, end }
    }

    /// Creates a reader from a slice with custom start and end positions.
    pub fn from_slice(uint8: &'a [u8], x: usize, end: usize) -> Self {
        let end = end.min(uint8.len());
        Self {
            uint8,
            x: x.min(end),
            end,
        }
    }

    /// Resets the reader with a new byte slice.
    pub fn reset(&mut self, uint8: &'a [u8]) {
        self.x = 0;
        self.end = uint8.len();
        self.uint8 = uint8;
    }

    /// Returns the number of remaining bytes.
    pub fn size(&self) -> usize {
        self.end - self.x
    }

    /// Returns `true` when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.x >= self.end
    }

    fn assert_size(&self, wanted: usize) -> Result<(), BufferError> {
        if wanted > self.size() {
            return Err(BufferError::EndOfBuffer {
                offset: self.x as u64,
                wanted,
            });
        }
        Ok(())
    }

    /// Advances the cursor by the given number of bytes.
    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        self.assert_size(length)?;
        self.x += length;
        Ok(())
    }

    /// Returns a subarray of the given size and advances the cursor.
    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.assert_size(size)?;
        let x = self.x;
        self.x += size;
        Ok(&self.uint8[x..x + size])
    }

    /// Creates a new reader over the next `size` bytes and advances past them.
    pub fn cut(&mut self, size: usize) -> Result<Reader<'a>, BufferError> {
        self.assert_size(size)?;
        let slice = Reader::from_slice(self.uint8, self.x, self.x + size);
        self.x += size;
        Ok(slice)
    }
}

impl ByteSource for Reader<'_> {
    fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        let bytes = self.buf(out.len())?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    fn peek_u8(&mut self) -> Result<Option<u8>, BufferError> {
        if self.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.uint8[self.x]))
    }

    fn position(&self) -> u64 {
        self.x as u64
    }

    fn read_vec(&mut self, size: usize) -> Result<Vec<u8>, BufferError> {
        Ok(self.buf(size)?.to_vec())
    }
}
