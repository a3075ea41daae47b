//! Reading and writing custom-written class data.
//!
//! An annotation is a list of block-data chunks and object entries. Primitive
//! reads see the chunks as one continuous byte stream; objects have to be
//! read exactly where they were written.

use jser_buffers::{BufferError, ByteSink, ByteSource};
use jser_stream::{Content, ElementId};

use crate::DecodeError;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Forward cursor over an annotation.
///
/// ```
/// use jser_buffers::ByteSource;
/// use jser_decode::AnnotationReader;
/// use jser_stream::Content;
///
/// let items = [Content::BlockData(vec![0, 0]), Content::BlockData(vec![0, 7]), Content::Null];
/// let mut reader = AnnotationReader::new(&items);
/// assert_eq!(reader.read_i32().unwrap(), 7);
/// assert_eq!(reader.read_object().unwrap(), None);
/// assert!(reader.is_at_end());
/// ```
#[derive(Debug, Clone)]
pub struct AnnotationReader<'a> {
    items: &'a [Content],
    index: usize,
    /// Bytes consumed from `items[index]` when it is block data.
    offset: usize,
    position: u64,
}

impl<'a> AnnotationReader<'a> {
    pub fn new(items: &'a [Content]) -> Self {
        let mut reader = Self {
            items,
            index: 0,
            offset: 0,
            position: 0,
        };
        reader.skip_drained();
        reader
    }

    /// Steps past block data with nothing left to read.
    fn skip_drained(&mut self) {
        while let Some(Content::BlockData(bytes)) = self.items.get(self.index) {
            if self.offset < bytes.len() {
                break;
            }
            self.index += 1;
            self.offset = 0;
        }
    }

    /// Reads the object entry under the cursor. Unread bytes before it, or
    /// the end of the annotation, are an error.
    pub fn read_object(&mut self) -> Result<Option<ElementId>, DecodeError> {
        let id = match self.items.get(self.index) {
            Some(Content::Element(id)) => Some(*id),
            Some(Content::Null) => None,
            _ => {
                return Err(DecodeError::AnnotationMisaligned {
                    position: self.position,
                })
            }
        };
        self.index += 1;
        self.skip_drained();
        Ok(id)
    }

    pub fn is_at_end(&self) -> bool {
        self.index >= self.items.len()
    }

    /// Entries not yet consumed; a partly read chunk counts whole.
    pub fn remaining(&self) -> &'a [Content] {
        &self.items[self.index.min(self.items.len())..]
    }
}

impl ByteSource for AnnotationReader<'_> {
    fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        let mut filled = 0;
        while filled < out.len() {
            let Some(Content::BlockData(bytes)) = self.items.get(self.index) else {
                return Err(BufferError::EndOfBuffer {
                    offset: self.position,
                    wanted: out.len() - filled,
                });
            };
            let take = (bytes.len() - self.offset).min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&bytes[self.offset..self.offset + take]);
            filled += take;
            self.offset += take;
            self.position += take as u64;
            self.skip_drained();
        }
        Ok(())
    }

    fn peek_u8(&mut self) -> Result<Option<u8>, BufferError> {
        Ok(match self.items.get(self.index) {
            Some(Content::BlockData(bytes)) => bytes.get(self.offset).copied(),
            _ => None,
        })
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Builds an annotation: primitive writes fill block-data chunks of at most
/// `chunk_size` bytes, object writes add their own entry.
#[derive(Debug, Clone)]
pub struct AnnotationWriter {
    items: Vec<Content>,
    chunk_size: usize,
}

impl Default for AnnotationWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationWriter {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            items: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn write_object(&mut self, id: Option<ElementId>) {
        self.items.push(Content::from(id));
    }

    pub fn finish(self) -> Vec<Content> {
        self.items
    }
}

impl ByteSink for AnnotationWriter {
    fn write_bytes(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = match self.items.last() {
                Some(Content::BlockData(chunk)) => self.chunk_size.saturating_sub(chunk.len()),
                _ => 0,
            };
            if room == 0 {
                self.items.push(Content::BlockData(Vec::new()));
                continue;
            }
            let take = room.min(data.len());
            if let Some(Content::BlockData(chunk)) = self.items.last_mut() {
                chunk.extend_from_slice(&data[..take]);
            }
            data = &data[take..];
        }
    }
}
