//! Errors raised while turning stream elements into values.

use jser_buffers::BufferError;
use jser_stream::{ErrorCategory, StreamError};
use thiserror::Error;

use crate::DecoderId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("annotation: {0}")]
    Buffer(#[from] BufferError),
    #[error("no decoder registered for class {0}")]
    UnknownClass(String),
    #[error("decoder {0} re-entered while its transition was in progress")]
    ReentrantTransition(DecoderId),
    #[error("decoder {0} has not been started")]
    Unstarted(DecoderId),
    #[error("decoder {0} does not exist")]
    UnknownDecoder(DecoderId),
    #[error("annotation cursor at byte {position} is not at an object")]
    AnnotationMisaligned { position: u64 },
    #[error("object has no class data for {0}")]
    MissingClassData(String),
    #[error("class {class} has no field {field}")]
    MissingField { class: String, field: String },
    #[error("expected {expected}, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}

impl DecodeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DecodeError::Stream(err) => err.category(),
            _ => ErrorCategory::Decoding,
        }
    }
}
