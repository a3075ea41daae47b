//! The stream element model and the arena that owns it.
//!
//! Elements link to each other through [`ElementId`] indices, never through
//! owning pointers, so cyclic graphs (an object whose field refers back to
//! itself, a class descriptor annotated with its own instance) are plain data.
//! The whole arena is dropped at the end of a session.

use std::fmt;

use indexmap::IndexMap;
use jser_buffers::mutf8;

use crate::{ClassFlags, PrimitiveKind, StreamError, TypeDescriptor};

/// Stable identity of an element within one [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) u32);

impl ElementId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A string as the JVM holds it: UTF-16 code units, surrogates unchecked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StreamString {
    pub units: Vec<u16>,
}

impl StreamString {
    pub fn new(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }

    /// Strict conversion; fails on unpaired surrogates.
    pub fn to_rust_string(&self) -> Result<String, StreamError> {
        Ok(mutf8::units_to_string(&self.units)?)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    /// Object or array field; `type_name` is the string element carrying the
    /// descriptor text, which takes part in handle numbering.
    Object {
        descriptor: TypeDescriptor,
        type_name: ElementId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDesc {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDesc {
    pub fn type_code(&self) -> u8 {
        match &self.kind {
            FieldKind::Primitive(kind) => kind.code(),
            FieldKind::Object { descriptor, .. } => descriptor.type_code(),
        }
    }
}

/// Flags, fields, class annotation and superclass of a class descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDescInfo {
    pub flags: ClassFlags,
    /// Declaration order is wire order.
    pub fields: Vec<FieldDesc>,
    pub annotation: Vec<Content>,
    pub super_class: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedClassDesc {
    pub name: String,
    pub descriptor: TypeDescriptor,
    pub serial_version_uid: i64,
    pub info: ClassDescInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyClassDesc {
    pub interfaces: Vec<String>,
    pub info: ClassDescInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassDesc {
    Named(NamedClassDesc),
    Proxy(ProxyClassDesc),
}

impl ClassDesc {
    pub fn info(&self) -> &ClassDescInfo {
        match self {
            ClassDesc::Named(desc) => &desc.info,
            ClassDesc::Proxy(desc) => &desc.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut ClassDescInfo {
        match self {
            ClassDesc::Named(desc) => &mut desc.info,
            ClassDesc::Proxy(desc) => &mut desc.info,
        }
    }

    /// Class name; proxy classes have none on the wire.
    pub fn name(&self) -> Option<&str> {
        match self {
            ClassDesc::Named(desc) => Some(&desc.name),
            ClassDesc::Proxy(_) => None,
        }
    }

    /// Name for diagnostics; proxies render as their interface list.
    pub fn display_name(&self) -> String {
        match self {
            ClassDesc::Named(desc) => desc.name.clone(),
            ClassDesc::Proxy(desc) => format!("proxy[{}]", desc.interfaces.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(Option<ElementId>),
}

impl FieldValue {
    /// Type code this value is written with (`L` for any reference).
    pub fn type_code(&self) -> u8 {
        match self {
            FieldValue::Byte(_) => b'B',
            FieldValue::Char(_) => b'C',
            FieldValue::Double(_) => b'D',
            FieldValue::Float(_) => b'F',
            FieldValue::Int(_) => b'I',
            FieldValue::Long(_) => b'J',
            FieldValue::Short(_) => b'S',
            FieldValue::Boolean(_) => b'Z',
            FieldValue::Object(_) => b'L',
        }
    }

    pub fn matches(&self, kind: &FieldKind) -> bool {
        match (self, kind) {
            (FieldValue::Object(_), FieldKind::Object { .. }) => true,
            (value, FieldKind::Primitive(kind)) => value.type_code() == kind.code(),
            _ => false,
        }
    }
}

/// One class's slice of an object's state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassData {
    pub values: IndexMap<String, FieldValue>,
    pub annotation: Vec<Content>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewObject {
    /// Leaf class descriptor.
    pub class_desc: ElementId,
    /// Keyed by each class descriptor in the chain that carries data,
    /// root-most first.
    pub class_data: IndexMap<ElementId, ClassData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClass {
    pub class_desc: ElementId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Double(Vec<f64>),
    Float(Vec<f32>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Short(Vec<i16>),
    Boolean(Vec<bool>),
    Object(Vec<Option<ElementId>>),
}

impl ArrayValues {
    /// Empty vector of the kind an array with this component type holds.
    pub fn empty_for(component: &TypeDescriptor) -> Self {
        match component.as_primitive() {
            Some(PrimitiveKind::Byte) => ArrayValues::Byte(Vec::new()),
            Some(PrimitiveKind::Char) => ArrayValues::Char(Vec::new()),
            Some(PrimitiveKind::Double) => ArrayValues::Double(Vec::new()),
            Some(PrimitiveKind::Float) => ArrayValues::Float(Vec::new()),
            Some(PrimitiveKind::Int) => ArrayValues::Int(Vec::new()),
            Some(PrimitiveKind::Long) => ArrayValues::Long(Vec::new()),
            Some(PrimitiveKind::Short) => ArrayValues::Short(Vec::new()),
            Some(PrimitiveKind::Boolean) => ArrayValues::Boolean(Vec::new()),
            None => ArrayValues::Object(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValues::Byte(v) => v.len(),
            ArrayValues::Char(v) => v.len(),
            ArrayValues::Double(v) => v.len(),
            ArrayValues::Float(v) => v.len(),
            ArrayValues::Int(v) => v.len(),
            ArrayValues::Long(v) => v.len(),
            ArrayValues::Short(v) => v.len(),
            ArrayValues::Boolean(v) => v.len(),
            ArrayValues::Object(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type code of the elements (`L` for references).
    pub fn element_code(&self) -> u8 {
        match self {
            ArrayValues::Byte(_) => b'B',
            ArrayValues::Char(_) => b'C',
            ArrayValues::Double(_) => b'D',
            ArrayValues::Float(_) => b'F',
            ArrayValues::Int(_) => b'I',
            ArrayValues::Long(_) => b'J',
            ArrayValues::Short(_) => b'S',
            ArrayValues::Boolean(_) => b'Z',
            ArrayValues::Object(_) => b'L',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArray {
    pub class_desc: ElementId,
    pub values: ArrayValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEnum {
    pub class_desc: ElementId,
    /// String element holding the constant's name.
    pub constant: ElementId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    String(StreamString),
    ClassDesc(ClassDesc),
    Object(NewObject),
    Class(NewClass),
    Array(NewArray),
    Enum(NewEnum),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    String,
    ClassDesc,
    Object,
    Class,
    Array,
    Enum,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::String => "string",
            ElementKind::ClassDesc => "class descriptor",
            ElementKind::Object => "object",
            ElementKind::Class => "class",
            ElementKind::Array => "array",
            ElementKind::Enum => "enum",
        })
    }
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::String(_) => ElementKind::String,
            Element::ClassDesc(_) => ElementKind::ClassDesc,
            Element::Object(_) => ElementKind::Object,
            Element::Class(_) => ElementKind::Class,
            Element::Array(_) => ElementKind::Array,
            Element::Enum(_) => ElementKind::Enum,
        }
    }

    /// The class descriptor an instance element was created from.
    pub fn class_desc(&self) -> Option<ElementId> {
        match self {
            Element::Object(obj) => Some(obj.class_desc),
            Element::Class(class) => Some(class.class_desc),
            Element::Array(array) => Some(array.class_desc),
            Element::Enum(constant) => Some(constant.class_desc),
            Element::String(_) | Element::ClassDesc(_) => None,
        }
    }
}

/// An entry of a content sequence: top-level reads and annotations alike.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Null,
    Element(ElementId),
    BlockData(Vec<u8>),
}

impl From<Option<ElementId>> for Content {
    fn from(id: Option<ElementId>) -> Self {
        match id {
            Some(id) => Content::Element(id),
            None => Content::Null,
        }
    }
}

/// What one top-level read yields.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamContent {
    pub content: Content,
    /// Set when the writer aborted and this content is the exception it
    /// wrote in-band. Check it before treating the content as data.
    pub is_exception: bool,
}

/// Owner of every element decoded (or built) in one session.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    elements: Vec<Element>,
    wire_handles: Vec<Option<u32>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn push(&mut self, element: Element) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(element);
        self.wire_handles.push(None);
        id
    }

    pub fn get(&self, id: ElementId) -> Result<&Element, StreamError> {
        self.elements
            .get(id.index())
            .ok_or(StreamError::UnknownElement(id))
    }

    pub fn get_mut(&mut self, id: ElementId) -> Result<&mut Element, StreamError> {
        self.elements
            .get_mut(id.index())
            .ok_or(StreamError::UnknownElement(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, element)| (ElementId(i as u32), element))
    }

    /// Wire handle the element was registered under when it was decoded.
    pub fn wire_handle(&self, id: ElementId) -> Option<u32> {
        self.wire_handles.get(id.index()).copied().flatten()
    }

    pub(crate) fn set_wire_handle(&mut self, id: ElementId, handle: u32) {
        if let Some(slot) = self.wire_handles.get_mut(id.index()) {
            *slot = Some(handle);
        }
    }

    pub fn kind(&self, id: ElementId) -> Result<ElementKind, StreamError> {
        Ok(self.get(id)?.kind())
    }

    pub fn check_kind(&self, id: ElementId, expected: ElementKind) -> Result<(), StreamError> {
        let found = self.kind(id)?;
        if found != expected {
            return Err(StreamError::WrongElementKind {
                id,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn wrong_kind(&self, id: ElementId, expected: ElementKind) -> StreamError {
        match self.get(id) {
            Ok(element) => StreamError::WrongElementKind {
                id,
                expected,
                found: element.kind(),
            },
            Err(err) => err,
        }
    }

    pub fn string(&self, id: ElementId) -> Result<&StreamString, StreamError> {
        match self.get(id)? {
            Element::String(s) => Ok(s),
            _ => Err(self.wrong_kind(id, ElementKind::String)),
        }
    }

    pub fn class_desc(&self, id: ElementId) -> Result<&ClassDesc, StreamError> {
        match self.get(id)? {
            Element::ClassDesc(desc) => Ok(desc),
            _ => Err(self.wrong_kind(id, ElementKind::ClassDesc)),
        }
    }

    pub fn class_desc_mut(&mut self, id: ElementId) -> Result<&mut ClassDesc, StreamError> {
        let found = self.kind(id)?;
        match self.elements.get_mut(id.index()) {
            Some(Element::ClassDesc(desc)) => Ok(desc),
            _ => Err(StreamError::WrongElementKind {
                id,
                expected: ElementKind::ClassDesc,
                found,
            }),
        }
    }

    pub fn object(&self, id: ElementId) -> Result<&NewObject, StreamError> {
        match self.get(id)? {
            Element::Object(obj) => Ok(obj),
            _ => Err(self.wrong_kind(id, ElementKind::Object)),
        }
    }

    pub fn object_mut(&mut self, id: ElementId) -> Result<&mut NewObject, StreamError> {
        let found = self.kind(id)?;
        match self.elements.get_mut(id.index()) {
            Some(Element::Object(obj)) => Ok(obj),
            _ => Err(StreamError::WrongElementKind {
                id,
                expected: ElementKind::Object,
                found,
            }),
        }
    }

    pub fn array(&self, id: ElementId) -> Result<&NewArray, StreamError> {
        match self.get(id)? {
            Element::Array(array) => Ok(array),
            _ => Err(self.wrong_kind(id, ElementKind::Array)),
        }
    }

    pub fn enum_constant(&self, id: ElementId) -> Result<&NewEnum, StreamError> {
        match self.get(id)? {
            Element::Enum(constant) => Ok(constant),
            _ => Err(self.wrong_kind(id, ElementKind::Enum)),
        }
    }

    pub fn class(&self, id: ElementId) -> Result<&NewClass, StreamError> {
        match self.get(id)? {
            Element::Class(class) => Ok(class),
            _ => Err(self.wrong_kind(id, ElementKind::Class)),
        }
    }

    /// Name of a named class descriptor; proxies are rejected.
    pub fn class_name(&self, class_desc: ElementId) -> Result<&str, StreamError> {
        match self.class_desc(class_desc)? {
            ClassDesc::Named(desc) => Ok(&desc.name),
            ClassDesc::Proxy(desc) => Err(StreamError::UnexpectedProxy(format!(
                "proxy[{}]",
                desc.interfaces.join(", ")
            ))),
        }
    }

    /// Class descriptors from the root-most superclass down to `leaf`.
    pub fn class_chain(&self, leaf: ElementId) -> Result<Vec<ElementId>, StreamError> {
        let mut chain = Vec::new();
        let mut next = Some(leaf);
        while let Some(id) = next {
            if chain.contains(&id) || chain.len() > self.elements.len() {
                return Err(StreamError::CyclicClassChain(leaf));
            }
            chain.push(id);
            next = self.class_desc(id)?.info().super_class;
        }
        chain.reverse();
        Ok(chain)
    }
}
