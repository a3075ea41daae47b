//! JVM object serialization streams, end to end.
//!
//! Re-exports the three layers: [`buffers`] (primitive codec and modified
//! UTF-8), [`stream`] (opcodes, element arena, encoder and decoder) and
//! [`decode`] (staged decoding into runtime values).
//!
//! ```
//! use jser::{encode, Content, GraphBuilder, ObjectReader, Value};
//!
//! let mut b = GraphBuilder::new();
//! let s = b.string("queued");
//! let bytes = encode(&b.finish(), &[Content::Element(s)]).unwrap();
//! let decoded = ObjectReader::from_bytes(&bytes).unwrap().read().unwrap();
//! assert_eq!(decoded.value, Value::string("queued"));
//! ```

pub mod config;

pub use jser_buffers as buffers;
pub use jser_decode as decode;
pub use jser_stream as stream;

pub use config::DumpConfig;
pub use jser_decode::{
    DecodeError, Decoded, ObjectReader, Registry, Value,
};
pub use jser_stream::{
    encode, Arena, Content, DumpContext, GraphBuilder, StreamDecoder, StreamEncoder, StreamError,
    StreamOptions,
};
