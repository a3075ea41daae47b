//! [`ByteSource`] over a blocking [`std::io::Read`].

use std::io::{self, Read};

use crate::{BufferError, ByteSource};

/// Adapts any [`Read`] into a [`ByteSource`] with one byte of lookahead.
///
/// The lookahead is what lets the stream decoder test for end-of-stream and
/// for terminator opcodes without consuming them.
pub struct IoSource<R> {
    inner: R,
    peeked: Option<u8>,
    offset: u64,
}

impl<R: Read> IoSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            offset: 0,
        }
    }

    /// Returns the wrapped reader. A peeked byte, if any, is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn io_error(&self, err: io::Error, wanted: usize) -> BufferError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BufferError::EndOfBuffer {
                offset: self.offset,
                wanted,
            }
        } else {
            BufferError::Io {
                offset: self.offset,
                message: err.to_string(),
            }
        }
    }
}

impl<R: Read> ByteSource for IoSource<R> {
    fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        if out.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        if let Some(byte) = self.peeked.take() {
            out[0] = byte;
            start = 1;
        }
        if let Err(err) = self.inner.read_exact(&mut out[start..]) {
            let wanted = out.len() - start;
            return Err(self.io_error(err, wanted));
        }
        self.offset += out.len() as u64;
        Ok(())
    }

    fn peek_u8(&mut self) -> Result<Option<u8>, BufferError> {
        if self.peeked.is_some() {
            return Ok(self.peeked);
        }
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.peeked = Some(byte[0]);
                    return Ok(self.peeked);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.io_error(err, 1)),
            }
        }
    }

    fn position(&self) -> u64 {
        self.offset
    }

    // Reads through `take` so a hostile length prefix cannot force a huge
    // up-front allocation.
    fn read_vec(&mut self, size: usize) -> Result<Vec<u8>, BufferError> {
        let mut out = Vec::new();
        if size == 0 {
            return Ok(out);
        }
        if let Some(byte) = self.peeked.take() {
            out.push(byte);
        }
        let rest = (size - out.len()) as u64;
        let read = (&mut self.inner).take(rest).read_to_end(&mut out);
        let got = read.map_err(|err| self.io_error(err, size))?;
        if (got as u64) < rest {
            return Err(BufferError::EndOfBuffer {
                offset: self.offset + out.len() as u64,
                wanted: (rest - got as u64) as usize,
            });
        }
        self.offset += size as u64;
        Ok(out)
    }
}
