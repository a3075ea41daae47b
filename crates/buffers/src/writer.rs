//! Auto-growing binary writer.

use crate::ByteSink;

/// A binary writer backed by a growable buffer.
///
/// Bytes written since the last [`flush`](Writer::flush) or
/// [`reset`](Writer::reset) are returned by the next `flush`.
///
/// # Example
///
/// ```
/// use jser_buffers::{ByteSink, Writer};
///
/// let mut writer = Writer::new();
/// writer.write_u16(0xaced);
/// assert_eq!(writer.flush(), vec![0xac, 0xed]);
/// writer.write_u8(0x70);
/// assert_eq!(writer.flush(), vec![0x70]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Writer {
    /// The underlying buffer.
    pub uint8: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_alloc_size(1024)
    }

    pub fn with_alloc_size(alloc_size: usize) -> Self {
        Self {
            uint8: Vec::with_capacity(alloc_size),
        }
    }

    /// Discards everything written so far.
    pub fn reset(&mut self) {
        self.uint8.clear();
    }

    /// Number of bytes written since the last flush.
    pub fn len(&self) -> usize {
        self.uint8.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends raw bytes.
    pub fn buf(&mut self, data: &[u8]) {
        self.uint8.extend_from_slice(data);
    }

    /// Returns the bytes written since the last flush.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.uint8)
    }

    /// Returns the unflushed bytes without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.uint8
    }
}

impl ByteSink for Writer {
    fn write_bytes(&mut self, data: &[u8]) {
        self.buf(data);
    }
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut writer = Writer::new();
        writer.write_i16(-2);
        writer.write_i64(0x0102_0304_0506_0708);
        assert_eq!(
            writer.flush(),
            vec![0xff, 0xfe, 1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut writer = Writer::new();
        writer.write_u32(7);
        writer.reset();
        writer.write_u8(1);
        assert_eq!(writer.as_slice(), &[1]);
        assert_eq!(writer.len(), 1);
    }
}
