//! Runtime values from JVM serialization streams.
//!
//! [`jser_stream`] turns bytes into an element graph; this crate turns that
//! graph into [`Value`]s. Each element gets an [`ObjectDecoder`] that builds
//! its value in three stages (`Initial`, `Comparable`, `Complete`), which
//! lets self-referencing and mutually referencing objects resolve without a
//! topological order.
//!
//! # Overview
//!
//! - [`ObjectReader`] - Reads top-level values from a stream session
//! - [`DecoderContext`] - Per-session decoder cache and stage transitions
//! - [`Registry`] - Class name to decoder factories, with JDK built-ins
//! - [`AnnotationReader`] / [`AnnotationWriter`] - Custom-written class data

mod annotation;
mod builtins;
mod error;
mod reader;
mod registry;
mod stage;
mod value;

pub use annotation::{AnnotationReader, AnnotationWriter, DEFAULT_CHUNK_SIZE};
pub use error::DecodeError;
pub use reader::{Decoded, ObjectReader};
pub use registry::{ClassRegistry, Registry};
pub use stage::{DecoderContext, DecoderId, DecoderState, ObjectDecoder, Stage};
pub use value::{
    ArrayItems, ArrayValue, ClassFields, ClassHandle, EnumConstant, ObjectValue, Shared, Value,
    ValueMap, ValueSet,
};
