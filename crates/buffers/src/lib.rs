//! Primitive wire codec for the JVM object serialization stream.
//!
//! Everything on the wire is big-endian. This crate provides the read and
//! write halves of that codec and the JVM's "modified UTF-8" string format.
//!
//! # Overview
//!
//! - [`ByteSource`] - Minimal read abstraction; primitive reads are provided methods
//! - [`ByteSink`] - Write counterpart of [`ByteSource`]
//! - [`Reader`] - Reads from a byte slice with cursor tracking
//! - [`IoSource`] - Reads from any [`std::io::Read`] with one byte of lookahead
//! - [`Writer`] - Writes to an auto-growing buffer
//! - [`mutf8`] - Modified UTF-8 encode/decode over UTF-16 code units
//!
//! # Example
//!
//! ```
//! use jser_buffers::{ByteSink, ByteSource, Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.write_u8(0x01);
//! writer.write_i32(-2);
//! writer.write_f64(1.5);
//! let data = writer.flush();
//!
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.read_u8().unwrap(), 0x01);
//! assert_eq!(reader.read_i32().unwrap(), -2);
//! assert_eq!(reader.read_f64().unwrap(), 1.5);
//! assert!(reader.read_u8().is_err());
//! ```

mod io_source;
pub mod mutf8;
mod print_octets;
mod reader;
mod source;
mod writer;

pub use io_source::IoSource;
pub use mutf8::Mutf8Error;
pub use print_octets::{print_octets, print_octets_default};
pub use reader::Reader;
pub use source::{ByteSink, ByteSource};
pub use writer::Writer;

use thiserror::Error;

/// Error type for buffer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Attempted to read past the end of the input.
    #[error("unexpected end of input at offset {offset} ({wanted} more bytes wanted)")]
    EndOfBuffer { offset: u64, wanted: usize },
    /// The underlying reader failed.
    #[error("read failed at offset {offset}: {message}")]
    Io { offset: u64, message: String },
}
