//! Stream-level error type.

use jser_buffers::{BufferError, Mutf8Error};
use thiserror::Error;

use crate::{ElementId, ElementKind, Opcode};

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or inconsistent stream; the whole session must be discarded.
    Decoding,
    /// Bad string data or an over-limit string, usually a caller-side encoding bug.
    InvalidInput,
}

/// Error type for decoding and encoding serialization streams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Utf(#[from] Mutf8Error),
    #[error("string of {len} bytes exceeds limit {max}")]
    StringTooLong { len: u64, max: u64 },
    #[error("bad stream magic 0x{0:04x}")]
    BadMagic(u16),
    #[error("unsupported stream version {0}")]
    BadVersion(u16),
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u64 },
    #[error("unexpected {opcode} at offset {offset} while reading {context}")]
    UnexpectedOpcode {
        opcode: Opcode,
        offset: u64,
        context: &'static str,
    },
    #[error("handle 0x{0:x} is not registered")]
    InvalidHandle(u32),
    #[error("element {id} is a {found}, expected {expected}")]
    WrongElementKind {
        id: ElementId,
        expected: ElementKind,
        found: ElementKind,
    },
    #[error("element {0} does not exist")]
    UnknownElement(ElementId),
    #[error("invalid field type descriptor {0:?}")]
    InvalidDescriptor(String),
    #[error("field {field:?} has type code {code:?} but descriptor {descriptor:?}")]
    TypeCodeMismatch {
        field: String,
        code: char,
        descriptor: String,
    },
    #[error("invalid field type code 0x{0:02x}")]
    InvalidTypeCode(u8),
    #[error("class {class} has conflicting flags 0x{flags:02x}")]
    ConflictingFlags { class: String, flags: u8 },
    #[error("class {0} is externalizable without block data")]
    UnsupportedExternalizable(String),
    #[error("{0} is not an array class")]
    NotAnArrayClass(String),
    #[error("{0} where a named class is required")]
    UnexpectedProxy(String),
    #[error("negative length {0}")]
    NegativeLength(i64),
    #[error("array of {len} elements exceeds limit {max}")]
    ArrayTooLong { len: usize, max: usize },
    #[error("block data of {len} bytes exceeds limit {max}")]
    BlockTooLong { len: usize, max: usize },
    #[error("nesting exceeds depth limit {0}")]
    TooDeep(usize),
    #[error("superclass chain of {0} is cyclic")]
    CyclicClassChain(ElementId),
    #[error("null class descriptor for a new {0}")]
    NullClassDesc(ElementKind),
    #[error("null where a string is required")]
    NullString,
    #[error("object {object} has no class data for {class}")]
    MissingClassData { object: ElementId, class: String },
    #[error("object {object} has no value for field {class}.{field}")]
    MissingField {
        object: ElementId,
        class: String,
        field: String,
    },
    #[error("value of field {field:?} does not match its declared type")]
    FieldTypeMismatch { field: String },
    #[error("array {0} values do not match its class")]
    ArrayTypeMismatch(ElementId),
    #[error("writer aborted at offset {0}; an exception follows")]
    WriteAborted(u64),
}

impl StreamError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Utf(_) | StreamError::StringTooLong { .. } => ErrorCategory::InvalidInput,
            _ => ErrorCategory::Decoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let utf = StreamError::from(Mutf8Error::Truncated { position: 0 });
        assert_eq!(utf.category(), ErrorCategory::InvalidInput);
        let long = StreamError::StringTooLong { len: 10, max: 5 };
        assert_eq!(long.category(), ErrorCategory::InvalidInput);
        assert_eq!(StreamError::BadMagic(0).category(), ErrorCategory::Decoding);
        let eof = StreamError::from(BufferError::EndOfBuffer {
            offset: 0,
            wanted: 1,
        });
        assert_eq!(eof.category(), ErrorCategory::Decoding);
    }

    #[test]
    fn test_messages() {
        let err = StreamError::UnexpectedOpcode {
            opcode: Opcode::EndBlockData,
            offset: 4,
            context: "content",
        };
        assert_eq!(
            err.to_string(),
            "unexpected TC_ENDBLOCKDATA (0x78) at offset 4 while reading content"
        );
        assert_eq!(
            StreamError::InvalidHandle(0x7e0005).to_string(),
            "handle 0x7e0005 is not registered"
        );
    }
}
