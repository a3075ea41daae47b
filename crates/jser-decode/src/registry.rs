//! Class name to decoder lookup.

use std::collections::{HashMap, HashSet};

use jser_stream::{ElementId, PrimitiveKind, TypeDescriptor};
use tracing::debug;

use crate::builtins::{
    ArrayListDecoder, BoxedDecoder, EnumDecoder, FieldsDecoder, HashMapDecoder, HashSetDecoder,
};
use crate::{ClassHandle, DecodeError, DecoderContext, ObjectDecoder};

/// Source of per-class decoders and class handles for a decode session.
pub trait ClassRegistry {
    /// Creates the decoder for `element`, an object or enum constant of
    /// class `class_name`. Unknown names are an error.
    fn decoder(
        &self,
        class_name: &str,
        cx: &mut DecoderContext<'_>,
        element: ElementId,
    ) -> Result<Box<dyn ObjectDecoder>, DecodeError>;

    /// The class value for `Foo.class` contents.
    fn get_class(&self, class_name: &str) -> Result<ClassHandle, DecodeError>;
}

type Factory = Box<
    dyn Fn(&mut DecoderContext<'_>, ElementId) -> Result<Box<dyn ObjectDecoder>, DecodeError>,
>;

const BOXED: [&str; 8] = [
    "java.lang.Boolean",
    "java.lang.Byte",
    "java.lang.Character",
    "java.lang.Short",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
];

/// Factories keyed by exact class name.
///
/// ```
/// use jser_decode::{ClassRegistry, Registry};
///
/// let mut registry = Registry::with_builtins();
/// registry.register_object("com.example.Point");
/// assert!(registry.contains("java.util.ArrayList"));
/// assert!(registry.contains("com.example.Point"));
/// assert!(registry.get_class("[I").is_ok());
/// assert!(registry.get_class("com.example.Missing").is_err());
/// ```
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
    classes: HashSet<String>,
}

impl Registry {
    /// An empty registry: every object or enum lookup fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed primitives and the common collections, plus class handles for
    /// `java.lang.Object`, `java.lang.String` and the primitive types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for name in BOXED {
            registry.register(name, |_cx, element| Ok(Box::new(BoxedDecoder { element })));
        }
        registry.register("java.util.ArrayList", |_cx, element| {
            Ok(Box::new(ArrayListDecoder::new(element)))
        });
        for name in ["java.util.HashMap", "java.util.LinkedHashMap"] {
            registry.register(name, |_cx, element| Ok(Box::new(HashMapDecoder::new(element))));
        }
        for name in ["java.util.HashSet", "java.util.LinkedHashSet"] {
            registry.register(name, |_cx, element| Ok(Box::new(HashSetDecoder::new(element))));
        }
        for name in ["java.lang.Object", "java.lang.String", "java.lang.Number"] {
            registry.register_class(name);
        }
        registry
    }

    /// Installs `factory` for `class_name`, replacing any earlier entry.
    pub fn register<F>(&mut self, class_name: &str, factory: F) -> &mut Self
    where
        F: Fn(&mut DecoderContext<'_>, ElementId) -> Result<Box<dyn ObjectDecoder>, DecodeError>
            + 'static,
    {
        self.factories
            .insert(class_name.to_owned(), Box::new(factory));
        self
    }

    /// Decodes `class_name` objects field by field into [`crate::ObjectValue`].
    pub fn register_object(&mut self, class_name: &str) -> &mut Self {
        self.register(class_name, |_cx, element| Ok(Box::new(FieldsDecoder::new(element))))
    }

    /// Decodes `class_name` enum constants into [`crate::EnumConstant`].
    pub fn register_enum(&mut self, class_name: &str) -> &mut Self {
        self.register(class_name, |_cx, element| Ok(Box::new(EnumDecoder { element })))
    }

    /// Makes `class_name` resolvable as a class object without a decoder.
    pub fn register_class(&mut self, class_name: &str) -> &mut Self {
        self.classes.insert(class_name.to_owned());
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }
}

impl ClassRegistry for Registry {
    fn decoder(
        &self,
        class_name: &str,
        cx: &mut DecoderContext<'_>,
        element: ElementId,
    ) -> Result<Box<dyn ObjectDecoder>, DecodeError> {
        let factory = self.factories.get(class_name).ok_or_else(|| {
            debug!(class = class_name, "no decoder registered");
            DecodeError::UnknownClass(class_name.to_owned())
        })?;
        debug!(class = class_name, %element, "registry lookup");
        factory(cx, element)
    }

    fn get_class(&self, class_name: &str) -> Result<ClassHandle, DecodeError> {
        let primitive = [
            PrimitiveKind::Byte,
            PrimitiveKind::Char,
            PrimitiveKind::Double,
            PrimitiveKind::Float,
            PrimitiveKind::Int,
            PrimitiveKind::Long,
            PrimitiveKind::Short,
            PrimitiveKind::Boolean,
        ]
        .into_iter()
        .find(|kind| kind.keyword() == class_name);
        let descriptor = if let Some(kind) = primitive {
            TypeDescriptor::primitive(kind)
        } else if class_name.starts_with('[') {
            TypeDescriptor::parse(class_name)?
        } else if self.contains(class_name) || self.classes.contains(class_name) {
            TypeDescriptor::object(class_name)
        } else {
            return Err(DecodeError::UnknownClass(class_name.to_owned()));
        };
        Ok(ClassHandle {
            name: class_name.to_owned(),
            descriptor,
        })
    }
}

#[cfg(test)]
mod tests {
    use jser_stream::{BaseType, StreamError};

    use super::*;

    #[test]
    fn test_get_class() {
        let registry = Registry::with_builtins();
        let list = registry.get_class("java.util.ArrayList").unwrap();
        assert_eq!(list.descriptor, TypeDescriptor::object("java.util.ArrayList"));

        let int = registry.get_class("int").unwrap();
        assert_eq!(int.descriptor.as_primitive(), Some(PrimitiveKind::Int));

        let strings = registry.get_class("[Ljava.lang.String;").unwrap();
        assert_eq!(strings.descriptor.extents, 1);
        assert_eq!(strings.descriptor.base, BaseType::Object("java.lang.String".into()));

        assert_eq!(
            registry.get_class("[Q"),
            Err(DecodeError::Stream(StreamError::InvalidDescriptor("[Q".into())))
        );
        assert_eq!(
            Registry::new().get_class("java.lang.String"),
            Err(DecodeError::UnknownClass("java.lang.String".into()))
        );
    }

    #[test]
    fn test_registration_is_exact() {
        let mut registry = Registry::new();
        registry
            .register_object("com.example.Point")
            .register_enum("com.example.Color")
            .register_class("com.example.Marker");
        assert!(registry.contains("com.example.Point"));
        assert!(registry.contains("com.example.Color"));
        assert!(!registry.contains("com.example.point"));
        assert!(!registry.contains("com.example.Marker"));
        assert!(registry.get_class("com.example.Marker").is_ok());
    }
}
