//! Opcode-driven stream decoder.
//!
//! Every element decoder that needs a nested class descriptor or object goes
//! back through [`StreamDecoder::read_element`], which dispatches on the next
//! opcode byte, so back-references and nulls are handled in one place.

use indexmap::IndexMap;
use jser_buffers::{mutf8, BufferError, ByteSource, Reader};
use tracing::{debug, trace};

use crate::{
    Arena, ArrayValues, ClassData, ClassDesc, ClassDescInfo, ClassFlags, Content, Element,
    ElementId, ElementKind, FieldDesc, FieldKind, FieldValue, HandleTable, NamedClassDesc,
    NewArray, NewClass, NewEnum, NewObject, Opcode, PrimitiveKind, ProxyClassDesc, StreamContent,
    StreamError, StreamOptions, StreamString, TypeDescriptor, STREAM_MAGIC, STREAM_VERSION,
};

/// Upper bound on speculative preallocation for length-prefixed data.
const PREALLOC_LIMIT: usize = 1 << 16;

/// What a nested element slot may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Any,
    ClassDesc,
    String,
}

impl Expect {
    fn kind(self) -> Option<ElementKind> {
        match self {
            Expect::Any => None,
            Expect::ClassDesc => Some(ElementKind::ClassDesc),
            Expect::String => Some(ElementKind::String),
        }
    }

    fn accepts(self, kind: ElementKind) -> bool {
        self.kind().map_or(true, |expected| expected == kind)
    }

    fn context(self) -> &'static str {
        match self {
            Expect::Any => "an object",
            Expect::ClassDesc => "a class descriptor",
            Expect::String => "a string",
        }
    }
}

/// Reads a serialization stream into an [`Arena`] of elements.
///
/// # Example
///
/// ```
/// use jser_stream::{Content, StreamDecoder};
///
/// // header, TC_STRING "hi"
/// let bytes = [0xac, 0xed, 0x00, 0x05, 0x74, 0x00, 0x02, b'h', b'i'];
/// let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
/// let read = decoder.read_content().unwrap();
/// let Content::Element(id) = read.content else { panic!() };
/// assert_eq!(decoder.arena().string(id).unwrap().to_string_lossy(), "hi");
/// assert!(decoder.is_at_end().unwrap());
/// ```
pub struct StreamDecoder<S> {
    source: S,
    arena: Arena,
    handles: HandleTable,
    options: StreamOptions,
    depth: usize,
}

impl<'a> StreamDecoder<Reader<'a>> {
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, StreamError> {
        Self::new(Reader::new(data))
    }
}

impl<S: ByteSource> StreamDecoder<S> {
    /// Reads and checks the stream header.
    pub fn new(source: S) -> Result<Self, StreamError> {
        Self::with_options(source, StreamOptions::default())
    }

    pub fn with_options(mut source: S, options: StreamOptions) -> Result<Self, StreamError> {
        let magic = source.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(StreamError::BadMagic(magic));
        }
        let version = source.read_u16()?;
        if version != STREAM_VERSION {
            return Err(StreamError::BadVersion(version));
        }
        Ok(Self {
            source,
            arena: Arena::new(),
            handles: HandleTable::new(),
            options,
            depth: 0,
        })
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn into_arena(self) -> Arena {
        self.arena
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Whether the stream has no further content. Trailing resets are
    /// consumed (and honored) along the way.
    pub fn is_at_end(&mut self) -> Result<bool, StreamError> {
        loop {
            match self.source.peek_u8()? {
                None => return Ok(true),
                Some(byte) if byte == Opcode::Reset.byte() => {
                    self.source.read_u8()?;
                    self.reset_handles();
                }
                Some(_) => return Ok(false),
            }
        }
    }

    /// Reads one top-level content: an element, a null, or block data.
    ///
    /// An in-band exception, whether it appears here or in the middle of a
    /// nested element, discards the handle table and yields the exception
    /// object that follows with `is_exception` set. Handles registered while
    /// reading the exception object are discarded once it is read.
    pub fn read_content(&mut self) -> Result<StreamContent, StreamError> {
        let mut is_exception = false;
        loop {
            self.depth = 0;
            let op = self.next_opcode()?;
            let result = match op {
                Opcode::BlockData | Opcode::BlockDataLong => {
                    self.read_block_data(op).map(Content::BlockData)
                }
                _ => self.read_element_with(op, Expect::Any).map(Content::from),
            };
            match result {
                Ok(content) => {
                    if is_exception {
                        self.reset_handles();
                    }
                    return Ok(StreamContent {
                        content,
                        is_exception,
                    })
                }
                Err(StreamError::WriteAborted(offset)) => {
                    debug!(offset, discarded = self.handles.len(), "in-band exception");
                    self.handles.reset();
                    is_exception = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Reads contents until the end of the stream.
    pub fn read_all(&mut self) -> Result<Vec<StreamContent>, StreamError> {
        let mut out = Vec::new();
        while !self.is_at_end()? {
            out.push(self.read_content()?);
        }
        Ok(out)
    }

    fn reset_handles(&mut self) {
        debug!(
            offset = self.source.position(),
            discarded = self.handles.len(),
            "reset"
        );
        self.handles.reset();
    }

    /// Next opcode, with any resets in front of it applied and skipped.
    fn next_opcode(&mut self) -> Result<Opcode, StreamError> {
        loop {
            let offset = self.source.position();
            let byte = self.source.read_u8()?;
            let op = Opcode::from_u8(byte).ok_or(StreamError::UnknownOpcode {
                opcode: byte,
                offset,
            })?;
            if op == Opcode::Reset {
                self.reset_handles();
                continue;
            }
            trace!(%op, offset, "opcode");
            return Ok(op);
        }
    }

    fn unexpected(&self, opcode: Opcode, context: &'static str) -> StreamError {
        StreamError::UnexpectedOpcode {
            opcode,
            offset: self.source.position().saturating_sub(1),
            context,
        }
    }

    fn register(&mut self, element: Element) -> ElementId {
        let id = self.arena.push(element);
        let handle = self.handles.register(id);
        self.arena.set_wire_handle(id, handle);
        id
    }

    fn read_element(&mut self, expect: Expect) -> Result<Option<ElementId>, StreamError> {
        let op = self.next_opcode()?;
        self.read_element_with(op, expect)
    }

    fn read_element_with(
        &mut self,
        op: Opcode,
        expect: Expect,
    ) -> Result<Option<ElementId>, StreamError> {
        let produced = match op {
            Opcode::Null if expect == Expect::String => return Err(StreamError::NullString),
            Opcode::Null => return Ok(None),
            Opcode::Reference => return self.read_reference(expect).map(Some),
            Opcode::Exception => {
                return Err(StreamError::WriteAborted(self.source.position()));
            }
            Opcode::ClassDesc | Opcode::ProxyClassDesc => ElementKind::ClassDesc,
            Opcode::String | Opcode::LongString => ElementKind::String,
            Opcode::Object => ElementKind::Object,
            Opcode::Array => ElementKind::Array,
            Opcode::Enum => ElementKind::Enum,
            Opcode::Class => ElementKind::Class,
            Opcode::BlockData
            | Opcode::BlockDataLong
            | Opcode::EndBlockData
            | Opcode::Reset => return Err(self.unexpected(op, expect.context())),
        };
        if !expect.accepts(produced) {
            return Err(self.unexpected(op, expect.context()));
        }

        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(StreamError::TooDeep(self.options.max_depth));
        }
        let id = match op {
            Opcode::ClassDesc => self.read_new_class_desc(),
            Opcode::ProxyClassDesc => self.read_new_proxy_class_desc(),
            Opcode::String | Opcode::LongString => self.read_new_string(op),
            Opcode::Object => self.read_new_object(),
            Opcode::Array => self.read_new_array(),
            Opcode::Enum => self.read_new_enum(),
            _ => self.read_new_class(),
        };
        self.depth -= 1;
        Ok(Some(id?))
    }

    fn read_reference(&mut self, expect: Expect) -> Result<ElementId, StreamError> {
        let handle = self.source.read_u32()?;
        let id = self.handles.resolve(handle)?;
        let found = self.arena.kind(id)?;
        if let Some(expected) = expect.kind() {
            if found != expected {
                return Err(StreamError::WrongElementKind {
                    id,
                    expected,
                    found,
                });
            }
        }
        trace!(handle, element = %id, "back-reference");
        Ok(id)
    }

    fn read_class_desc_ref(&mut self, owner: ElementKind) -> Result<ElementId, StreamError> {
        self.read_element(Expect::ClassDesc)?
            .ok_or(StreamError::NullClassDesc(owner))
    }

    fn read_string_ref(&mut self) -> Result<ElementId, StreamError> {
        self.read_element(Expect::String)?
            .ok_or(StreamError::NullString)
    }

    /// A `utf` field: 2-byte length and modified UTF-8, not an element.
    fn read_utf(&mut self) -> Result<String, StreamError> {
        let len = self.source.read_u16()? as usize;
        let bytes = self.source.read_vec(len)?;
        Ok(mutf8::decode_to_string(&bytes)?)
    }

    fn read_new_string(&mut self, op: Opcode) -> Result<ElementId, StreamError> {
        let len = match op {
            Opcode::LongString => self.source.read_u64()?,
            _ => self.source.read_u16()? as u64,
        };
        let max = self.options.max_string_len;
        if len > max {
            return Err(StreamError::StringTooLong { len, max });
        }
        let bytes = self.source.read_vec(len as usize)?;
        let units = mutf8::decode(&bytes)?;
        Ok(self.register(Element::String(StreamString { units })))
    }

    fn read_new_class_desc(&mut self) -> Result<ElementId, StreamError> {
        let name = self.read_utf()?;
        let descriptor = TypeDescriptor::parse_class_name(&name)?;
        let serial_version_uid = self.source.read_i64()?;
        let id = self.register(Element::ClassDesc(ClassDesc::Named(NamedClassDesc {
            name: name.clone(),
            descriptor,
            serial_version_uid,
            info: ClassDescInfo::default(),
        })));
        let info = self.read_class_desc_info(&name)?;
        *self.arena.class_desc_mut(id)?.info_mut() = info;
        Ok(id)
    }

    fn read_new_proxy_class_desc(&mut self) -> Result<ElementId, StreamError> {
        let id = self.register(Element::ClassDesc(ClassDesc::Proxy(ProxyClassDesc {
            interfaces: Vec::new(),
            info: ClassDescInfo::default(),
        })));
        let count = self.read_length()?;
        let mut interfaces = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            interfaces.push(self.read_utf()?);
        }
        let (annotation, super_class) = self.read_class_tail()?;
        // Proxy classes are serializable and declare no fields of their own.
        let info = ClassDescInfo {
            flags: ClassFlags::SERIALIZABLE,
            fields: Vec::new(),
            annotation,
            super_class,
        };
        if let ClassDesc::Proxy(desc) = self.arena.class_desc_mut(id)? {
            desc.interfaces = interfaces;
            desc.info = info;
        }
        Ok(id)
    }

    fn read_class_desc_info(&mut self, class: &str) -> Result<ClassDescInfo, StreamError> {
        let flags = ClassFlags::from_bits_retain(self.source.read_u8()?);
        if flags.contains(ClassFlags::SERIALIZABLE | ClassFlags::EXTERNALIZABLE) {
            return Err(StreamError::ConflictingFlags {
                class: class.to_owned(),
                flags: flags.bits(),
            });
        }
        let count = self.source.read_i16()?;
        if count < 0 {
            return Err(StreamError::NegativeLength(count as i64));
        }
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            fields.push(self.read_field_desc()?);
        }
        let (annotation, super_class) = self.read_class_tail()?;
        Ok(ClassDescInfo {
            flags,
            fields,
            annotation,
            super_class,
        })
    }

    fn read_class_tail(&mut self) -> Result<(Vec<Content>, Option<ElementId>), StreamError> {
        let annotation = self.read_annotation()?;
        let super_class = self.read_element(Expect::ClassDesc)?;
        Ok((annotation, super_class))
    }

    fn read_field_desc(&mut self) -> Result<FieldDesc, StreamError> {
        let code = self.source.read_u8()?;
        let name = self.read_utf()?;
        if let Some(kind) = PrimitiveKind::from_code(code) {
            return Ok(FieldDesc {
                name,
                kind: FieldKind::Primitive(kind),
            });
        }
        if code != b'L' && code != b'[' {
            return Err(StreamError::InvalidTypeCode(code));
        }
        let type_name = self.read_string_ref()?;
        let text = self.arena.string(type_name)?.to_rust_string()?;
        let descriptor = TypeDescriptor::parse(&text)?;
        if descriptor.type_code() != code {
            return Err(StreamError::TypeCodeMismatch {
                field: name,
                code: code as char,
                descriptor: text,
            });
        }
        Ok(FieldDesc {
            name,
            kind: FieldKind::Object {
                descriptor,
                type_name,
            },
        })
    }

    /// Contents up to and including the end-of-block-data opcode.
    fn read_annotation(&mut self) -> Result<Vec<Content>, StreamError> {
        let mut items = Vec::new();
        loop {
            let op = self.next_opcode()?;
            match op {
                Opcode::EndBlockData => return Ok(items),
                Opcode::BlockData | Opcode::BlockDataLong => {
                    items.push(Content::BlockData(self.read_block_data(op)?));
                }
                _ => items.push(Content::from(self.read_element_with(op, Expect::Any)?)),
            }
        }
    }

    fn read_block_data(&mut self, op: Opcode) -> Result<Vec<u8>, StreamError> {
        let len = match op {
            Opcode::BlockData => self.source.read_u8()? as usize,
            _ => self.read_length()?,
        };
        let max = self.options.max_block_len;
        if len > max {
            return Err(StreamError::BlockTooLong { len, max });
        }
        Ok(self.source.read_vec(len)?)
    }

    /// A 4-byte signed length; negative values are corrupt.
    fn read_length(&mut self) -> Result<usize, StreamError> {
        let len = self.source.read_i32()?;
        if len < 0 {
            return Err(StreamError::NegativeLength(len as i64));
        }
        Ok(len as usize)
    }

    fn read_new_object(&mut self) -> Result<ElementId, StreamError> {
        let class_desc = self.read_class_desc_ref(ElementKind::Object)?;
        let id = self.register(Element::Object(NewObject {
            class_desc,
            class_data: IndexMap::new(),
        }));
        let chain = self.arena.class_chain(class_desc)?;
        let mut class_data = IndexMap::with_capacity(chain.len());
        for class in chain {
            let info = self.arena.class_desc(class)?.info();
            let flags = info.flags;
            if !flags.has_class_data() {
                continue;
            }
            let data = if flags.contains(ClassFlags::SERIALIZABLE) {
                let fields = info.fields.clone();
                let mut values = IndexMap::with_capacity(fields.len());
                for field in fields {
                    let value = self.read_field_value(&field.kind)?;
                    values.insert(field.name, value);
                }
                let annotation = if flags.is_plain_serializable() {
                    Vec::new()
                } else {
                    self.read_annotation()?
                };
                ClassData { values, annotation }
            } else {
                if !flags.contains(ClassFlags::BLOCK_DATA) {
                    let name = self.arena.class_desc(class)?.display_name();
                    return Err(StreamError::UnsupportedExternalizable(name));
                }
                ClassData {
                    values: IndexMap::new(),
                    annotation: self.read_annotation()?,
                }
            };
            class_data.insert(class, data);
        }
        self.arena.object_mut(id)?.class_data = class_data;
        Ok(id)
    }

    fn read_field_value(&mut self, kind: &FieldKind) -> Result<FieldValue, StreamError> {
        match kind {
            FieldKind::Primitive(kind) => Ok(self.read_primitive(*kind)?),
            FieldKind::Object { .. } => Ok(FieldValue::Object(self.read_element(Expect::Any)?)),
        }
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<FieldValue, BufferError> {
        let source = &mut self.source;
        Ok(match kind {
            PrimitiveKind::Byte => FieldValue::Byte(source.read_i8()?),
            PrimitiveKind::Char => FieldValue::Char(source.read_char()?),
            PrimitiveKind::Double => FieldValue::Double(source.read_f64()?),
            PrimitiveKind::Float => FieldValue::Float(source.read_f32()?),
            PrimitiveKind::Int => FieldValue::Int(source.read_i32()?),
            PrimitiveKind::Long => FieldValue::Long(source.read_i64()?),
            PrimitiveKind::Short => FieldValue::Short(source.read_i16()?),
            PrimitiveKind::Boolean => FieldValue::Boolean(source.read_bool()?),
        })
    }

    fn read_new_array(&mut self) -> Result<ElementId, StreamError> {
        let class_desc = self.read_class_desc_ref(ElementKind::Array)?;
        let component = match self.arena.class_desc(class_desc)? {
            ClassDesc::Named(desc) => desc
                .descriptor
                .component()
                .ok_or_else(|| StreamError::NotAnArrayClass(desc.name.clone()))?,
            proxy @ ClassDesc::Proxy(_) => {
                return Err(StreamError::NotAnArrayClass(proxy.display_name()))
            }
        };
        let len = self.read_length()?;
        let max = self.options.max_array_len;
        if len > max {
            return Err(StreamError::ArrayTooLong { len, max });
        }
        let id = self.register(Element::Array(NewArray {
            class_desc,
            values: ArrayValues::empty_for(&component),
        }));
        let values = self.read_array_values(&component, len)?;
        if let Element::Array(array) = self.arena.get_mut(id)? {
            array.values = values;
        }
        Ok(id)
    }

    fn read_array_values(
        &mut self,
        component: &TypeDescriptor,
        len: usize,
    ) -> Result<ArrayValues, StreamError> {
        let values = match component.as_primitive() {
            Some(PrimitiveKind::Byte) => {
                let bytes = self.source.read_vec(len)?;
                ArrayValues::Byte(bytes.into_iter().map(|b| b as i8).collect())
            }
            Some(PrimitiveKind::Char) => {
                ArrayValues::Char(self.read_many(len, |s| s.read_char())?)
            }
            Some(PrimitiveKind::Double) => {
                ArrayValues::Double(self.read_many(len, |s| s.read_f64())?)
            }
            Some(PrimitiveKind::Float) => {
                ArrayValues::Float(self.read_many(len, |s| s.read_f32())?)
            }
            Some(PrimitiveKind::Int) => ArrayValues::Int(self.read_many(len, |s| s.read_i32())?),
            Some(PrimitiveKind::Long) => ArrayValues::Long(self.read_many(len, |s| s.read_i64())?),
            Some(PrimitiveKind::Short) => {
                ArrayValues::Short(self.read_many(len, |s| s.read_i16())?)
            }
            Some(PrimitiveKind::Boolean) => {
                ArrayValues::Boolean(self.read_many(len, |s| s.read_bool())?)
            }
            None => {
                let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                for _ in 0..len {
                    items.push(self.read_element(Expect::Any)?);
                }
                ArrayValues::Object(items)
            }
        };
        Ok(values)
    }

    fn read_many<T>(
        &mut self,
        len: usize,
        read: impl Fn(&mut S) -> Result<T, BufferError>,
    ) -> Result<Vec<T>, StreamError> {
        let mut out = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for _ in 0..len {
            out.push(read(&mut self.source)?);
        }
        Ok(out)
    }

    fn read_new_enum(&mut self) -> Result<ElementId, StreamError> {
        let class_desc = self.read_class_desc_ref(ElementKind::Enum)?;
        // The constant name is read after the handle is taken; until then the
        // slot points at the class descriptor.
        let id = self.register(Element::Enum(NewEnum {
            class_desc,
            constant: class_desc,
        }));
        let constant = self.read_string_ref()?;
        if let Element::Enum(value) = self.arena.get_mut(id)? {
            value.constant = constant;
        }
        Ok(id)
    }

    fn read_new_class(&mut self) -> Result<ElementId, StreamError> {
        let class_desc = self.read_class_desc_ref(ElementKind::Class)?;
        Ok(self.register(Element::Class(NewClass { class_desc })))
    }
}
