//! Stream encoder: the mirror of [`StreamDecoder`](crate::StreamDecoder).
//!
//! The encoder assigns handles in the same order the decoder registers them,
//! so a graph read from a stream and written back reproduces the same
//! back-references. Sharing is by [`ElementId`]: an element written twice is
//! written once and referenced afterwards.
//!
//! Nested elements are written from an explicit stack of [`Step`]s rather
//! than by recursion, so a chain of any length fits in constant native stack.

use std::collections::HashMap;

use jser_buffers::{mutf8, ByteSink, Mutf8Error, Writer};
use tracing::{debug, trace};

use crate::{
    Arena, ArrayValues, ClassDesc, ClassFlags, Content, Element, ElementId, FieldDesc, FieldKind,
    FieldValue, NewArray, NewObject, Opcode, StreamError, StreamString, BASE_WIRE_HANDLE,
    MAX_SHORT_BLOCK, MAX_SHORT_UTF, STREAM_MAGIC, STREAM_VERSION,
};

/// Writes elements of an [`Arena`] as a serialization stream.
///
/// # Example
///
/// ```
/// use jser_stream::{Content, GraphBuilder, StreamDecoder, StreamEncoder};
///
/// let mut builder = GraphBuilder::new();
/// let hi = builder.string("hi");
/// let arena = builder.finish();
///
/// let mut encoder = StreamEncoder::new();
/// encoder.write_header();
/// encoder.write_content(&arena, &Content::Element(hi)).unwrap();
/// encoder.write_content(&arena, &Content::Element(hi)).unwrap();
/// let bytes = encoder.flush();
///
/// let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
/// let first = decoder.read_content().unwrap().content;
/// let second = decoder.read_content().unwrap().content;
/// assert_eq!(first, second);
/// ```
#[derive(Default)]
pub struct StreamEncoder {
    pub writer: Writer,
    handles: HashMap<ElementId, u32>,
}

/// Outstanding work while writing one element, popped last-in first-out.
enum Step<'a> {
    /// An element slot: null, back-reference or a new element.
    Element(Option<ElementId>),
    /// An element slot that must hold a class descriptor.
    ClassDesc(ElementId),
    /// An element slot that must hold a string.
    String(ElementId),
    Content(&'a Content),
    Assign(ElementId),
    /// Type code, name and type string of one declared field.
    FieldDesc(&'a FieldDesc),
    FieldValue(&'a FieldValue),
    Int(i32),
    EndBlockData,
    ArrayValues(&'a ArrayValues),
}

impl StreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_header(&mut self) {
        self.writer.write_u16(STREAM_MAGIC);
        self.writer.write_u16(STREAM_VERSION);
    }

    /// Takes the bytes written so far.
    pub fn flush(&mut self) -> Vec<u8> {
        self.writer.flush()
    }

    /// Number of handles assigned since the header or the last reset.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Writes one top-level content.
    pub fn write_content(&mut self, arena: &Arena, content: &Content) -> Result<(), StreamError> {
        self.run(arena, Step::Content(content))
    }

    /// Emits a reset; elements written afterwards are written afresh.
    pub fn write_reset(&mut self) {
        debug!(discarded = self.handles.len(), "reset");
        self.writer.write_u8(Opcode::Reset.byte());
        self.handles.clear();
    }

    /// Aborts the current write with `throwable` in-band. Handles are
    /// discarded before the exception and again after it; no reset opcode
    /// is written, the reader discards its handles on its own.
    pub fn write_exception(
        &mut self,
        arena: &Arena,
        throwable: ElementId,
    ) -> Result<(), StreamError> {
        self.handles.clear();
        self.writer.write_u8(Opcode::Exception.byte());
        self.run(arena, Step::Element(Some(throwable)))?;
        debug!(discarded = self.handles.len(), "exception written");
        self.handles.clear();
        Ok(())
    }

    fn assign(&mut self, id: ElementId) -> u32 {
        let handle = BASE_WIRE_HANDLE + self.handles.len() as u32;
        self.handles.insert(id, handle);
        trace!(handle, element = %id, "assign handle");
        handle
    }

    fn run<'a>(&mut self, arena: &'a Arena, root: Step<'a>) -> Result<(), StreamError> {
        let mut stack = vec![root];
        while let Some(step) = stack.pop() {
            self.step(arena, step, &mut stack)?;
        }
        Ok(())
    }

    fn step<'a>(
        &mut self,
        arena: &'a Arena,
        step: Step<'a>,
        stack: &mut Vec<Step<'a>>,
    ) -> Result<(), StreamError> {
        match step {
            Step::Element(None) => self.writer.write_u8(Opcode::Null.byte()),
            Step::Element(Some(id)) => {
                if let Some(&handle) = self.handles.get(&id) {
                    self.writer.write_u8(Opcode::Reference.byte());
                    self.writer.write_u32(handle);
                } else {
                    let plan = self.begin_element(arena, id)?;
                    stack.extend(plan.into_iter().rev());
                }
            }
            Step::ClassDesc(id) => {
                arena.class_desc(id)?;
                stack.push(Step::Element(Some(id)));
            }
            Step::String(id) => {
                arena.string(id)?;
                stack.push(Step::Element(Some(id)));
            }
            Step::Content(Content::Null) => self.writer.write_u8(Opcode::Null.byte()),
            Step::Content(Content::Element(id)) => stack.push(Step::Element(Some(*id))),
            Step::Content(Content::BlockData(bytes)) => self.write_block_data(bytes)?,
            Step::Assign(id) => {
                self.assign(id);
            }
            Step::FieldDesc(field) => {
                self.writer.write_u8(field.type_code());
                self.write_utf(&field.name)?;
                if let FieldKind::Object { type_name, .. } = &field.kind {
                    stack.push(Step::String(*type_name));
                }
            }
            Step::FieldValue(value) => self.write_field_value(value, stack),
            Step::Int(v) => self.writer.write_i32(v),
            Step::EndBlockData => self.writer.write_u8(Opcode::EndBlockData.byte()),
            Step::ArrayValues(values) => self.write_array_values(values, stack),
        }
        Ok(())
    }

    /// Writes the fixed head of a new element and returns what follows it,
    /// in stream order.
    fn begin_element<'a>(
        &mut self,
        arena: &'a Arena,
        id: ElementId,
    ) -> Result<Vec<Step<'a>>, StreamError> {
        match arena.get(id)? {
            Element::String(s) => {
                self.write_new_string(id, s);
                Ok(Vec::new())
            }
            Element::ClassDesc(desc) => self.begin_class_desc(id, desc),
            Element::Object(obj) => self.begin_object(arena, id, obj),
            Element::Array(array) => self.begin_array(arena, id, array),
            Element::Enum(constant) => {
                self.writer.write_u8(Opcode::Enum.byte());
                Ok(vec![
                    Step::ClassDesc(constant.class_desc),
                    Step::Assign(id),
                    Step::String(constant.constant),
                ])
            }
            Element::Class(class) => {
                self.writer.write_u8(Opcode::Class.byte());
                Ok(vec![Step::ClassDesc(class.class_desc), Step::Assign(id)])
            }
        }
    }

    fn write_new_string(&mut self, id: ElementId, s: &StreamString) {
        let bytes = mutf8::encode(&s.units);
        if bytes.len() <= MAX_SHORT_UTF {
            self.writer.write_u8(Opcode::String.byte());
            self.writer.write_u16(bytes.len() as u16);
        } else {
            self.writer.write_u8(Opcode::LongString.byte());
            self.writer.write_u64(bytes.len() as u64);
        }
        self.writer.buf(&bytes);
        self.assign(id);
    }

    /// A `utf` field, which has no long form.
    fn write_utf(&mut self, s: &str) -> Result<(), StreamError> {
        let bytes = mutf8::encode_str(s);
        if bytes.len() > MAX_SHORT_UTF {
            return Err(Mutf8Error::TooLong {
                len: bytes.len() as u64,
                max: MAX_SHORT_UTF as u64,
            }
            .into());
        }
        self.writer.write_u16(bytes.len() as u16);
        self.writer.buf(&bytes);
        Ok(())
    }

    fn begin_class_desc<'a>(
        &mut self,
        id: ElementId,
        desc: &'a ClassDesc,
    ) -> Result<Vec<Step<'a>>, StreamError> {
        let mut plan = Vec::new();
        match desc {
            ClassDesc::Named(named) => {
                self.writer.write_u8(Opcode::ClassDesc.byte());
                self.write_utf(&named.name)?;
                self.writer.write_i64(named.serial_version_uid);
                self.assign(id);
                let info = &named.info;
                self.writer.write_u8(info.flags.bits());
                let count =
                    i16::try_from(info.fields.len()).map_err(|_| StreamError::ArrayTooLong {
                        len: info.fields.len(),
                        max: i16::MAX as usize,
                    })?;
                self.writer.write_i16(count);
                plan.extend(info.fields.iter().map(Step::FieldDesc));
            }
            ClassDesc::Proxy(proxy) => {
                self.writer.write_u8(Opcode::ProxyClassDesc.byte());
                self.assign(id);
                self.writer.write_i32(wire_len(proxy.interfaces.len())?);
                for interface in &proxy.interfaces {
                    self.write_utf(interface)?;
                }
            }
        }
        let info = desc.info();
        annotation(&mut plan, &info.annotation);
        plan.push(match info.super_class {
            Some(super_class) => Step::ClassDesc(super_class),
            None => Step::Element(None),
        });
        Ok(plan)
    }

    fn write_block_data(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if bytes.len() <= MAX_SHORT_BLOCK {
            self.writer.write_u8(Opcode::BlockData.byte());
            self.writer.write_u8(bytes.len() as u8);
        } else {
            let len = i32::try_from(bytes.len()).map_err(|_| StreamError::BlockTooLong {
                len: bytes.len(),
                max: i32::MAX as usize,
            })?;
            self.writer.write_u8(Opcode::BlockDataLong.byte());
            self.writer.write_i32(len);
        }
        self.writer.buf(bytes);
        Ok(())
    }

    fn begin_object<'a>(
        &mut self,
        arena: &'a Arena,
        id: ElementId,
        obj: &'a NewObject,
    ) -> Result<Vec<Step<'a>>, StreamError> {
        let mut plan = vec![Step::ClassDesc(obj.class_desc), Step::Assign(id)];
        for class in arena.class_chain(obj.class_desc)? {
            let desc = arena.class_desc(class)?;
            let info = desc.info();
            if !info.flags.has_class_data() {
                continue;
            }
            let data = obj
                .class_data
                .get(&class)
                .ok_or_else(|| StreamError::MissingClassData {
                    object: id,
                    class: desc.display_name(),
                })?;
            if info.flags.contains(ClassFlags::SERIALIZABLE) {
                for field in &info.fields {
                    let value = data.values.get(&field.name).ok_or_else(|| {
                        StreamError::MissingField {
                            object: id,
                            class: desc.display_name(),
                            field: field.name.clone(),
                        }
                    })?;
                    if !value.matches(&field.kind) {
                        return Err(StreamError::FieldTypeMismatch {
                            field: field.name.clone(),
                        });
                    }
                    plan.push(Step::FieldValue(value));
                }
                if !info.flags.is_plain_serializable() {
                    annotation(&mut plan, &data.annotation);
                }
            } else {
                if !info.flags.contains(ClassFlags::BLOCK_DATA) {
                    return Err(StreamError::UnsupportedExternalizable(desc.display_name()));
                }
                annotation(&mut plan, &data.annotation);
            }
        }
        self.writer.write_u8(Opcode::Object.byte());
        Ok(plan)
    }

    fn write_field_value<'a>(&mut self, value: &'a FieldValue, stack: &mut Vec<Step<'a>>) {
        let w = &mut self.writer;
        match *value {
            FieldValue::Byte(v) => w.write_i8(v),
            FieldValue::Char(v) => w.write_u16(v),
            FieldValue::Double(v) => w.write_f64(v),
            FieldValue::Float(v) => w.write_f32(v),
            FieldValue::Int(v) => w.write_i32(v),
            FieldValue::Long(v) => w.write_i64(v),
            FieldValue::Short(v) => w.write_i16(v),
            FieldValue::Boolean(v) => w.write_bool(v),
            FieldValue::Object(id) => stack.push(Step::Element(id)),
        }
    }

    fn begin_array<'a>(
        &mut self,
        arena: &'a Arena,
        id: ElementId,
        array: &'a NewArray,
    ) -> Result<Vec<Step<'a>>, StreamError> {
        let component = match arena.class_desc(array.class_desc)? {
            ClassDesc::Named(desc) => desc
                .descriptor
                .component()
                .ok_or_else(|| StreamError::NotAnArrayClass(desc.name.clone()))?,
            proxy @ ClassDesc::Proxy(_) => {
                return Err(StreamError::NotAnArrayClass(proxy.display_name()))
            }
        };
        let expected = match component.as_primitive() {
            Some(kind) => kind.code(),
            None => b'L',
        };
        if array.values.element_code() != expected {
            return Err(StreamError::ArrayTypeMismatch(id));
        }
        let len = wire_len(array.values.len())?;
        self.writer.write_u8(Opcode::Array.byte());
        Ok(vec![
            Step::ClassDesc(array.class_desc),
            Step::Int(len),
            Step::Assign(id),
            Step::ArrayValues(&array.values),
        ])
    }

    fn write_array_values<'a>(&mut self, values: &'a ArrayValues, stack: &mut Vec<Step<'a>>) {
        let w = &mut self.writer;
        match values {
            ArrayValues::Byte(v) => v.iter().for_each(|&x| w.write_i8(x)),
            ArrayValues::Char(v) => v.iter().for_each(|&x| w.write_u16(x)),
            ArrayValues::Double(v) => v.iter().for_each(|&x| w.write_f64(x)),
            ArrayValues::Float(v) => v.iter().for_each(|&x| w.write_f32(x)),
            ArrayValues::Int(v) => v.iter().for_each(|&x| w.write_i32(x)),
            ArrayValues::Long(v) => v.iter().for_each(|&x| w.write_i64(x)),
            ArrayValues::Short(v) => v.iter().for_each(|&x| w.write_i16(x)),
            ArrayValues::Boolean(v) => v.iter().for_each(|&x| w.write_bool(x)),
            ArrayValues::Object(items) => {
                stack.extend(items.iter().rev().map(|item| Step::Element(*item)));
            }
        }
    }
}

/// Annotation contents followed by their end marker.
fn annotation<'a>(plan: &mut Vec<Step<'a>>, items: &'a [Content]) {
    plan.extend(items.iter().map(Step::Content));
    plan.push(Step::EndBlockData);
}

/// A length as the signed 32-bit count the wire format carries.
fn wire_len(len: usize) -> Result<i32, StreamError> {
    i32::try_from(len).map_err(|_| StreamError::ArrayTooLong {
        len,
        max: i32::MAX as usize,
    })
}

/// Encodes a complete stream: header followed by `contents`.
pub fn encode(arena: &Arena, contents: &[Content]) -> Result<Vec<u8>, StreamError> {
    let mut encoder = StreamEncoder::new();
    encoder.write_header();
    for content in contents {
        encoder.write_content(arena, content)?;
    }
    Ok(encoder.flush())
}
