//! Opcode-level model of the JVM object serialization stream.
//!
//! A stream is a header followed by contents. Each content is an element
//! (string, class descriptor, object, array, enum or class), a null, or a
//! block of raw bytes. Elements are kept in an [`Arena`] and link to each
//! other by [`ElementId`], so shared and cyclic graphs need no special
//! ownership.
//!
//! # Overview
//!
//! - [`StreamDecoder`] - Reads contents, resolving back-references through a [`HandleTable`]
//! - [`StreamEncoder`] - Writes contents, turning repeated elements into back-references
//! - [`GraphBuilder`] - Assembles an [`Arena`] by hand for encoding
//! - [`elements_equal`] - Cycle-aware structural equality across arenas
//! - [`Arena::dump`] - Indented tree rendering with back-links for repeats
//!
//! # Example
//!
//! ```
//! use jser_stream::{encode, Content, EqContext, GraphBuilder, StreamDecoder, elements_equal};
//!
//! let mut b = GraphBuilder::new();
//! let foo = b.string("foo");
//! let arena = b.finish();
//! let bytes = encode(&arena, &[Content::Element(foo)]).unwrap();
//!
//! let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
//! let Content::Element(id) = decoder.read_content().unwrap().content else { panic!() };
//! assert!(elements_equal(&arena, foo, decoder.arena(), id, &mut EqContext::new()));
//! ```

mod builder;
mod constants;
mod decoder;
mod descriptor;
mod dump;
mod element;
mod encoder;
mod equal;
mod error;
mod handles;
mod options;

pub use builder::GraphBuilder;
pub use constants::{
    ClassFlags, Opcode, BASE_WIRE_HANDLE, MAX_SHORT_BLOCK, MAX_SHORT_UTF, STREAM_MAGIC,
    STREAM_VERSION,
};
pub use decoder::StreamDecoder;
pub use descriptor::{BaseType, PrimitiveKind, TypeDescriptor, MAX_EXTENTS};
pub use dump::{DumpContext, DumpNode, DEFAULT_DUMP_DEPTH};
pub use element::{
    Arena, ArrayValues, ClassData, ClassDesc, ClassDescInfo, Content, Element, ElementId,
    ElementKind, FieldDesc, FieldKind, FieldValue, NamedClassDesc, NewArray, NewClass, NewEnum,
    NewObject, ProxyClassDesc, StreamContent, StreamString,
};
pub use encoder::{encode, StreamEncoder};
pub use equal::{contents_equal, elements_equal, EqContext};
pub use error::{ErrorCategory, StreamError};
pub use handles::HandleTable;
pub use options::StreamOptions;
