//! Programmatic construction of element graphs for the encoder.

use indexmap::IndexMap;

use crate::{
    Arena, ArrayValues, ClassData, ClassDesc, ClassDescInfo, ClassFlags, Content, Element,
    ElementId, ElementKind, FieldDesc, FieldKind, FieldValue, NamedClassDesc, NewArray, NewClass,
    NewEnum, NewObject, PrimitiveKind, ProxyClassDesc, StreamError, StreamString, TypeDescriptor,
};

/// Builds an [`Arena`] by hand.
///
/// Class descriptors must be complete (fields added, superclass set) before
/// objects are created from them: [`object`](GraphBuilder::object) fills in
/// one [`ClassData`] per data-carrying class in the chain, every field at
/// its zero value.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    arena: Arena,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn finish(self) -> Arena {
        self.arena
    }

    pub fn string(&mut self, s: &str) -> ElementId {
        self.arena.push(Element::String(StreamString::new(s)))
    }

    /// A named class descriptor with no fields and no superclass. Array
    /// classes are named by descriptor (`[I`, `[Ljava.lang.String;`).
    pub fn class_desc(
        &mut self,
        name: &str,
        serial_version_uid: i64,
        flags: ClassFlags,
    ) -> Result<ElementId, StreamError> {
        let descriptor = TypeDescriptor::parse_class_name(name)?;
        if flags.contains(ClassFlags::SERIALIZABLE | ClassFlags::EXTERNALIZABLE) {
            return Err(StreamError::ConflictingFlags {
                class: name.to_owned(),
                flags: flags.bits(),
            });
        }
        Ok(self
            .arena
            .push(Element::ClassDesc(ClassDesc::Named(NamedClassDesc {
                name: name.to_owned(),
                descriptor,
                serial_version_uid,
                info: ClassDescInfo {
                    flags,
                    ..Default::default()
                },
            }))))
    }

    pub fn proxy_class_desc(&mut self, interfaces: &[&str]) -> ElementId {
        self.arena
            .push(Element::ClassDesc(ClassDesc::Proxy(ProxyClassDesc {
                interfaces: interfaces.iter().map(|&s| s.to_owned()).collect(),
                info: ClassDescInfo {
                    flags: ClassFlags::SERIALIZABLE,
                    ..Default::default()
                },
            })))
    }

    pub fn set_super(
        &mut self,
        class: ElementId,
        super_class: Option<ElementId>,
    ) -> Result<(), StreamError> {
        if let Some(super_class) = super_class {
            self.arena.check_kind(super_class, ElementKind::ClassDesc)?;
        }
        self.arena.class_desc_mut(class)?.info_mut().super_class = super_class;
        Ok(())
    }

    /// Declares a field. `descriptor` is a field-type descriptor: `I`,
    /// `Ljava/lang/String;`, `[B`. Object and array fields get a string
    /// element for their type name, as on the wire.
    pub fn add_field(
        &mut self,
        class: ElementId,
        name: &str,
        descriptor: &str,
    ) -> Result<(), StreamError> {
        let parsed = TypeDescriptor::parse(descriptor)?;
        self.arena.check_kind(class, ElementKind::ClassDesc)?;
        let kind = match parsed.as_primitive() {
            Some(kind) => FieldKind::Primitive(kind),
            None => FieldKind::Object {
                descriptor: parsed,
                type_name: self.string(descriptor),
            },
        };
        self.arena
            .class_desc_mut(class)?
            .info_mut()
            .fields
            .push(FieldDesc {
                name: name.to_owned(),
                kind,
            });
        Ok(())
    }

    pub fn add_class_annotation(
        &mut self,
        class: ElementId,
        content: Content,
    ) -> Result<(), StreamError> {
        self.arena
            .class_desc_mut(class)?
            .info_mut()
            .annotation
            .push(content);
        Ok(())
    }

    pub fn object(&mut self, class_desc: ElementId) -> Result<ElementId, StreamError> {
        let mut class_data = IndexMap::new();
        for class in self.arena.class_chain(class_desc)? {
            let info = self.arena.class_desc(class)?.info();
            if !info.flags.has_class_data() {
                continue;
            }
            let mut data = ClassData::default();
            if info.flags.contains(ClassFlags::SERIALIZABLE) {
                for field in &info.fields {
                    data.values.insert(field.name.clone(), zero_value(&field.kind));
                }
            }
            class_data.insert(class, data);
        }
        Ok(self.arena.push(Element::Object(NewObject {
            class_desc,
            class_data,
        })))
    }

    /// Sets `name` on the most-derived class in the object's chain that
    /// declares it.
    pub fn set_field(
        &mut self,
        object: ElementId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), StreamError> {
        let leaf = self.arena.object(object)?.class_desc;
        let chain = self.arena.class_chain(leaf)?;
        for class in chain.into_iter().rev() {
            let declares = self
                .arena
                .class_desc(class)?
                .info()
                .fields
                .iter()
                .any(|f| f.name == name);
            if declares {
                return self.set_class_field(object, class, name, value);
            }
        }
        Err(StreamError::MissingField {
            object,
            class: self.arena.class_desc(leaf)?.display_name(),
            field: name.to_owned(),
        })
    }

    /// Sets a field of a specific class in the chain, for shadowed names.
    pub fn set_class_field(
        &mut self,
        object: ElementId,
        class: ElementId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), StreamError> {
        let desc = self.arena.class_desc(class)?;
        let field = desc
            .info()
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| StreamError::MissingField {
                object,
                class: desc.display_name(),
                field: name.to_owned(),
            })?;
        if !value.matches(&field.kind) {
            return Err(StreamError::FieldTypeMismatch {
                field: name.to_owned(),
            });
        }
        self.class_data_mut(object, class)?
            .values
            .insert(name.to_owned(), value);
        Ok(())
    }

    /// Appends to the custom-written data of one class in the object's chain.
    pub fn push_annotation(
        &mut self,
        object: ElementId,
        class: ElementId,
        content: Content,
    ) -> Result<(), StreamError> {
        self.class_data_mut(object, class)?.annotation.push(content);
        Ok(())
    }

    fn class_data_mut(
        &mut self,
        object: ElementId,
        class: ElementId,
    ) -> Result<&mut ClassData, StreamError> {
        let class_name = self.arena.class_desc(class)?.display_name();
        self.arena
            .object_mut(object)?
            .class_data
            .get_mut(&class)
            .ok_or(StreamError::MissingClassData {
                object,
                class: class_name,
            })
    }

    pub fn array(
        &mut self,
        class_desc: ElementId,
        values: ArrayValues,
    ) -> Result<ElementId, StreamError> {
        let component = match self.arena.class_desc(class_desc)? {
            ClassDesc::Named(desc) => desc
                .descriptor
                .component()
                .ok_or_else(|| StreamError::NotAnArrayClass(desc.name.clone()))?,
            proxy @ ClassDesc::Proxy(_) => {
                return Err(StreamError::NotAnArrayClass(proxy.display_name()))
            }
        };
        if ArrayValues::empty_for(&component).element_code() != values.element_code() {
            return Err(StreamError::ArrayTypeMismatch(class_desc));
        }
        Ok(self.arena.push(Element::Array(NewArray { class_desc, values })))
    }

    pub fn enum_constant(
        &mut self,
        class_desc: ElementId,
        name: &str,
    ) -> Result<ElementId, StreamError> {
        self.arena.check_kind(class_desc, ElementKind::ClassDesc)?;
        let constant = self.string(name);
        Ok(self.arena.push(Element::Enum(NewEnum {
            class_desc,
            constant,
        })))
    }

    /// A class object (`Foo.class`).
    pub fn class_object(&mut self, class_desc: ElementId) -> Result<ElementId, StreamError> {
        self.arena.check_kind(class_desc, ElementKind::ClassDesc)?;
        Ok(self.arena.push(Element::Class(NewClass { class_desc })))
    }
}

fn zero_value(kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Primitive(kind) => match kind {
            PrimitiveKind::Byte => FieldValue::Byte(0),
            PrimitiveKind::Char => FieldValue::Char(0),
            PrimitiveKind::Double => FieldValue::Double(0.0),
            PrimitiveKind::Float => FieldValue::Float(0.0),
            PrimitiveKind::Int => FieldValue::Int(0),
            PrimitiveKind::Long => FieldValue::Long(0),
            PrimitiveKind::Short => FieldValue::Short(0),
            PrimitiveKind::Boolean => FieldValue::Boolean(false),
        },
        FieldKind::Object { .. } => FieldValue::Object(None),
    }
}
