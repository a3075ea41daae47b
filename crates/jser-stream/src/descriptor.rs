//! Field-type descriptors: `I`, `[J`, `Ljava/lang/String;`, `[[Lfoo.Bar;`.
//!
//! Class descriptors name their class the same way when the class is an
//! array; non-array class names appear bare (`java.util.ArrayList`).

use std::fmt;

use crate::StreamError;

/// The JVM caps array dimensions at 255.
pub const MAX_EXTENTS: usize = 255;

/// The eight primitive kinds, in the order of their descriptor letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl PrimitiveKind {
    pub fn from_code(code: u8) -> Option<Self> {
        let kind = match code {
            b'B' => PrimitiveKind::Byte,
            b'C' => PrimitiveKind::Char,
            b'D' => PrimitiveKind::Double,
            b'F' => PrimitiveKind::Float,
            b'I' => PrimitiveKind::Int,
            b'J' => PrimitiveKind::Long,
            b'S' => PrimitiveKind::Short,
            b'Z' => PrimitiveKind::Boolean,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(self) -> u8 {
        match self {
            PrimitiveKind::Byte => b'B',
            PrimitiveKind::Char => b'C',
            PrimitiveKind::Double => b'D',
            PrimitiveKind::Float => b'F',
            PrimitiveKind::Int => b'I',
            PrimitiveKind::Long => b'J',
            PrimitiveKind::Short => b'S',
            PrimitiveKind::Boolean => b'Z',
        }
    }

    /// Encoded width in bytes.
    pub fn size(self) -> usize {
        match self {
            PrimitiveKind::Byte | PrimitiveKind::Boolean => 1,
            PrimitiveKind::Char | PrimitiveKind::Short => 2,
            PrimitiveKind::Float | PrimitiveKind::Int => 4,
            PrimitiveKind::Double | PrimitiveKind::Long => 8,
        }
    }

    /// Source-level keyword, e.g. `int`.
    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Primitive(PrimitiveKind),
    /// Class name as written on the wire, with either `.` or `/` separators.
    Object(String),
}

/// A parsed type: `extents` levels of array around a base type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub extents: usize,
    pub base: BaseType,
}

impl TypeDescriptor {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self {
            extents: 0,
            base: BaseType::Primitive(kind),
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self {
            extents: 0,
            base: BaseType::Object(name.into()),
        }
    }

    /// Parses a field-type descriptor.
    ///
    /// ```
    /// use jser_stream::{BaseType, PrimitiveKind, TypeDescriptor};
    ///
    /// let td = TypeDescriptor::parse("[[I").unwrap();
    /// assert_eq!(td.extents, 2);
    /// assert_eq!(td.base, BaseType::Primitive(PrimitiveKind::Int));
    ///
    /// let td = TypeDescriptor::parse("Ljava/lang/String;").unwrap();
    /// assert_eq!(td.base, BaseType::Object("java/lang/String".into()));
    ///
    /// assert!(TypeDescriptor::parse("[").is_err());
    /// assert!(TypeDescriptor::parse("Ljava/lang/String").is_err());
    /// ```
    pub fn parse(descriptor: &str) -> Result<Self, StreamError> {
        let invalid = || StreamError::InvalidDescriptor(descriptor.to_owned());
        let bytes = descriptor.as_bytes();
        let extents = bytes.iter().take_while(|&&b| b == b'[').count();
        if extents > MAX_EXTENTS {
            return Err(invalid());
        }
        let rest = &descriptor[extents..];
        let base = match rest.as_bytes() {
            [code] => BaseType::Primitive(PrimitiveKind::from_code(*code).ok_or_else(invalid)?),
            [b'L', .., b';'] if rest.len() > 2 => {
                let name = &rest[1..rest.len() - 1];
                if name.contains(';') || name.contains('[') {
                    return Err(invalid());
                }
                BaseType::Object(name.to_owned())
            }
            _ => return Err(invalid()),
        };
        Ok(Self { extents, base })
    }

    /// Parses the name carried by a class descriptor: array classes use
    /// descriptor syntax, every other class is a bare binary name.
    pub fn parse_class_name(name: &str) -> Result<Self, StreamError> {
        if name.starts_with('[') {
            return Self::parse(name);
        }
        if name.is_empty() {
            return Err(StreamError::InvalidDescriptor(String::new()));
        }
        Ok(Self::object(name))
    }

    pub fn is_array(&self) -> bool {
        self.extents > 0
    }

    /// Descriptor of one array level down, or `None` for non-arrays.
    pub fn component(&self) -> Option<TypeDescriptor> {
        if self.extents == 0 {
            return None;
        }
        Some(Self {
            extents: self.extents - 1,
            base: self.base.clone(),
        })
    }

    /// Primitive kind of this exact type (not of its elements).
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match (&self.base, self.extents) {
            (BaseType::Primitive(kind), 0) => Some(*kind),
            _ => None,
        }
    }

    /// The single-letter type code a field of this type is written with.
    pub fn type_code(&self) -> u8 {
        match (&self.base, self.extents) {
            (BaseType::Primitive(kind), 0) => kind.code(),
            (BaseType::Object(_), 0) => b'L',
            _ => b'[',
        }
    }

    /// Full descriptor text, e.g. `[Ljava/lang/Object;`.
    pub fn descriptor(&self) -> String {
        let mut out = "[".repeat(self.extents);
        match &self.base {
            BaseType::Primitive(kind) => out.push(kind.code() as char),
            BaseType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
        }
        out
    }

    /// Name as a class descriptor carries it.
    pub fn class_name(&self) -> String {
        match (&self.base, self.extents) {
            (BaseType::Object(name), 0) => name.clone(),
            (BaseType::Primitive(kind), 0) => kind.keyword().to_owned(),
            _ => self.descriptor(),
        }
    }
}

/// Renders source syntax: `int[][]`, `java.lang.String`.
impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            BaseType::Primitive(kind) => f.write_str(kind.keyword())?,
            BaseType::Object(name) => f.write_str(&name.replace('/', "."))?,
        }
        for _ in 0..self.extents {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        for code in *b"BCDFIJSZ" {
            let td = TypeDescriptor::parse(std::str::from_utf8(&[code]).unwrap()).unwrap();
            assert_eq!(td.as_primitive().map(PrimitiveKind::code), Some(code));
            assert_eq!(td.type_code(), code);
        }
    }

    #[test]
    fn test_arrays() {
        let td = TypeDescriptor::parse("[[Ljava.lang.Object;").unwrap();
        assert_eq!(td.extents, 2);
        assert_eq!(td.type_code(), b'[');
        assert_eq!(td.to_string(), "java.lang.Object[][]");
        let inner = td.component().unwrap();
        assert_eq!(inner.descriptor(), "[Ljava.lang.Object;");
        let leaf = inner.component().unwrap();
        assert_eq!(leaf.class_name(), "java.lang.Object");
        assert_eq!(leaf.component(), None);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "[", "X", "II", "L;", "Lfoo", "[Lfoo;x", "Lfo;o;", "[[", "Q"] {
            assert!(
                matches!(TypeDescriptor::parse(bad), Err(StreamError::InvalidDescriptor(_))),
                "{bad:?} should be rejected"
            );
        }
        let too_deep = format!("{}I", "[".repeat(256));
        assert!(TypeDescriptor::parse(&too_deep).is_err());
    }

    #[test]
    fn test_class_names() {
        let td = TypeDescriptor::parse_class_name("java.util.ArrayList").unwrap();
        assert_eq!(td, TypeDescriptor::object("java.util.ArrayList"));
        assert_eq!(td.class_name(), "java.util.ArrayList");
        let td = TypeDescriptor::parse_class_name("[B").unwrap();
        assert_eq!(td.component().unwrap().as_primitive(), Some(PrimitiveKind::Byte));
        assert!(TypeDescriptor::parse_class_name("").is_err());
        assert!(TypeDescriptor::parse_class_name("[Q").is_err());
    }
}
