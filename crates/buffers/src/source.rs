//! Read and write abstractions the rest of the codec is generic over.

use crate::BufferError;

/// A source of big-endian bytes.
///
/// Implementors only supply [`read_into`](ByteSource::read_into),
/// [`peek_u8`](ByteSource::peek_u8) and [`position`](ByteSource::position);
/// every fixed-width primitive is a provided method on top of them.
pub trait ByteSource {
    /// Fills `out` completely or fails with [`BufferError::EndOfBuffer`].
    fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError>;

    /// Returns the next byte without consuming it, or `None` at end of input.
    fn peek_u8(&mut self) -> Result<Option<u8>, BufferError>;

    /// Number of bytes consumed so far.
    fn position(&self) -> u64;

    /// Reads `size` bytes into a new vector.
    fn read_vec(&mut self, size: usize) -> Result<Vec<u8>, BufferError> {
        let mut out = vec![0u8; size];
        self.read_into(&mut out)?;
        Ok(out)
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, BufferError> {
        let mut out = [0u8; 1];
        self.read_into(&mut out)?;
        Ok(out[0])
    }

    #[inline]
    fn read_i8(&mut self) -> Result<i8, BufferError> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a boolean; any nonzero byte is `true`.
    #[inline]
    fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, BufferError> {
        let mut out = [0u8; 2];
        self.read_into(&mut out)?;
        Ok(u16::from_be_bytes(out))
    }

    #[inline]
    fn read_i16(&mut self) -> Result<i16, BufferError> {
        Ok(self.read_u16()? as i16)
    }

    /// Reads one UTF-16 code unit (a JVM `char`).
    #[inline]
    fn read_char(&mut self) -> Result<u16, BufferError> {
        self.read_u16()
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32, BufferError> {
        let mut out = [0u8; 4];
        self.read_into(&mut out)?;
        Ok(u32::from_be_bytes(out))
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(self.read_u32()? as i32)
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64, BufferError> {
        let mut out = [0u8; 8];
        self.read_into(&mut out)?;
        Ok(u64::from_be_bytes(out))
    }

    #[inline]
    fn read_i64(&mut self) -> Result<i64, BufferError> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads an IEEE 754 single by bit pattern, so NaN payloads survive.
    #[inline]
    fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads an IEEE 754 double by bit pattern.
    #[inline]
    fn read_f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        (**self).read_into(out)
    }

    fn peek_u8(&mut self) -> Result<Option<u8>, BufferError> {
        (**self).peek_u8()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// A sink of big-endian bytes, the mirror of [`ByteSource`].
pub trait ByteSink {
    fn write_bytes(&mut self, data: &[u8]);

    #[inline]
    fn write_u8(&mut self, val: u8) {
        self.write_bytes(&[val]);
    }

    #[inline]
    fn write_i8(&mut self, val: i8) {
        self.write_u8(val as u8);
    }

    #[inline]
    fn write_bool(&mut self, val: bool) {
        self.write_u8(u8::from(val));
    }

    #[inline]
    fn write_u16(&mut self, val: u16) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_i16(&mut self, val: i16) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_char(&mut self, val: u16) {
        self.write_u16(val);
    }

    #[inline]
    fn write_u32(&mut self, val: u32) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_i32(&mut self, val: i32) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_u64(&mut self, val: u64) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_i64(&mut self, val: i64) {
        self.write_bytes(&val.to_be_bytes());
    }

    #[inline]
    fn write_f32(&mut self, val: f32) {
        self.write_u32(val.to_bits());
    }

    #[inline]
    fn write_f64(&mut self, val: f64) {
        self.write_u64(val.to_bits());
    }
}
