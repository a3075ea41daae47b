//! Stream-to-value decoding session.

use jser_buffers::{ByteSource, Reader};
use jser_stream::{Arena, Content, StreamContent, StreamDecoder};
use tracing::debug;

use crate::{ClassRegistry, DecodeError, DecoderContext, DecoderState, Registry, Value};

/// One top-level value.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    /// The writer aborted and `value` is the exception it sent in-band.
    pub exception: bool,
}

/// Reads runtime values from a stream.
///
/// Decoders persist for the whole session, so a back-reference in a later
/// top-level read yields the very value an earlier read produced. Dropping
/// the reader leaves the values intact; cyclic ones are only freed by
/// [`ObjectReader::release`].
///
/// ```
/// use jser_decode::{ObjectReader, Value};
/// use jser_stream::{encode, Content, GraphBuilder};
///
/// let mut b = GraphBuilder::new();
/// let s = b.string("hello");
/// let bytes = encode(&b.finish(), &[Content::Element(s), Content::Element(s)]).unwrap();
///
/// let mut reader = ObjectReader::from_bytes(&bytes).unwrap();
/// let values = reader.read_all().unwrap();
/// assert_eq!(values[0].value, Value::string("hello"));
/// assert_eq!(values[0], values[1]);
/// ```
pub struct ObjectReader<S, R = Registry> {
    stream: StreamDecoder<S>,
    registry: R,
    state: DecoderState,
}

impl<'a> ObjectReader<Reader<'a>> {
    /// Reads the header and uses [`Registry::with_builtins`].
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(Self::new(
            StreamDecoder::from_bytes(data)?,
            Registry::with_builtins(),
        ))
    }
}

impl<S: ByteSource, R: ClassRegistry> ObjectReader<S, R> {
    pub fn new(stream: StreamDecoder<S>, registry: R) -> Self {
        Self {
            stream,
            registry,
            state: DecoderState::new(),
        }
    }

    pub fn stream(&self) -> &StreamDecoder<S> {
        &self.stream
    }

    pub fn arena(&self) -> &Arena {
        self.stream.arena()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        Ok(self.stream.is_at_end()?)
    }

    /// Reads one top-level content and builds its value to `Complete`.
    pub fn read(&mut self) -> Result<Decoded, DecodeError> {
        let StreamContent {
            content,
            is_exception,
        } = self.stream.read_content()?;
        if is_exception {
            debug!(?content, "in-band exception content");
        }
        Ok(Decoded {
            value: self.value_of(&content)?,
            exception: is_exception,
        })
    }

    pub fn read_all(&mut self) -> Result<Vec<Decoded>, DecodeError> {
        let mut out = Vec::new();
        while !self.is_at_end()? {
            out.push(self.read()?);
        }
        Ok(out)
    }

    /// Ends the session and empties every array, list, map, set and object
    /// it decoded. Values still held by the caller lose their contents.
    pub fn release(mut self) {
        self.state.release_values();
    }

    /// Value of a content already read from this session's stream.
    pub fn value_of(&mut self, content: &Content) -> Result<Value, DecodeError> {
        let element = match content {
            Content::BlockData(bytes) => return Ok(Value::BlockData(bytes.as_slice().into())),
            Content::Null => None,
            Content::Element(id) => Some(*id),
        };
        let mut cx = DecoderContext::new(self.stream.arena(), &self.registry, &mut self.state);
        let id = cx.decoder_for(element)?;
        cx.get_complete(id)
    }
}
