//! Decoders for element kinds with a fixed shape and for the common JDK
//! classes.

use std::rc::Rc;

use indexmap::IndexMap;
use jser_buffers::ByteSource;
use jser_stream::{ArrayValues, ClassData, ClassDesc, Content, ElementId, FieldValue, StreamError};

use crate::value::shared;
use crate::{
    AnnotationReader, ArrayItems, ArrayValue, ClassFields, DecodeError, DecoderContext, DecoderId,
    EnumConstant, ObjectDecoder, ObjectValue, Shared, Value, ValueMap, ValueSet,
};

/// Class data of the class named `class_name` in `element`'s chain.
fn class_data<'a>(
    cx: &DecoderContext<'a>,
    element: ElementId,
    class_name: &str,
) -> Result<&'a ClassData, DecodeError> {
    let arena = cx.arena();
    for (class, data) in &arena.object(element)?.class_data {
        if arena.class_desc(*class)?.name() == Some(class_name) {
            return Ok(data);
        }
    }
    Err(DecodeError::MissingClassData(class_name.to_owned()))
}

fn int_field(data: &ClassData, class: &str, field: &str) -> Result<i32, DecodeError> {
    match data.values.get(field) {
        Some(FieldValue::Int(v)) => Ok(*v),
        Some(other) => Err(DecodeError::UnexpectedValue {
            expected: "int",
            found: Value::from_primitive(*other).map_or("object", |v| v.type_name()),
        }),
        None => Err(DecodeError::MissingField {
            class: class.to_owned(),
            field: field.to_owned(),
        }),
    }
}

fn count(len: i32) -> Result<usize, DecodeError> {
    usize::try_from(len).map_err(|_| StreamError::NegativeLength(len.into()).into())
}

/// Annotation entry as a value; objects also yield their decoder.
fn content_value(
    cx: &mut DecoderContext<'_>,
    content: &Content,
) -> Result<(Option<DecoderId>, Value), DecodeError> {
    match content {
        Content::BlockData(bytes) => Ok((None, Value::BlockData(bytes.as_slice().into()))),
        Content::Null => cx.initial_for(None).map(|(id, v)| (Some(id), v)),
        Content::Element(id) => cx.initial_for(Some(*id)).map(|(id, v)| (Some(id), v)),
    }
}

pub(crate) struct NullDecoder;

impl ObjectDecoder for NullDecoder {
    fn build_initial(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Option<Value>, DecodeError> {
        Ok(None)
    }
}

pub(crate) struct StringDecoder {
    pub(crate) element: ElementId,
}

impl ObjectDecoder for StringDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let s = cx.arena().string(self.element)?;
        Ok(Some(Value::String(Rc::new(s.clone()))))
    }
}

/// `Foo.class`, and class descriptors met where a value is expected.
pub(crate) struct ClassObjectDecoder {
    pub(crate) class_desc: ElementId,
}

impl ObjectDecoder for ClassObjectDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let name = cx.arena().class_name(self.class_desc)?;
        let class = cx.registry().get_class(name)?;
        Ok(Some(Value::Class(Rc::new(class))))
    }
}

/// Primitive arrays are copied at `Initial`; object arrays get their items
/// at `Complete`.
pub(crate) struct ArrayDecoder {
    element: ElementId,
    value: Option<Shared<ArrayValue>>,
}

impl ArrayDecoder {
    pub(crate) fn new(element: ElementId) -> Self {
        Self {
            element,
            value: None,
        }
    }
}

impl ObjectDecoder for ArrayDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let arena = cx.arena();
        let array = arena.array(self.element)?;
        let desc = arena.class_desc(array.class_desc)?;
        let component = match desc {
            ClassDesc::Named(named) => named.descriptor.component(),
            ClassDesc::Proxy(_) => None,
        }
        .ok_or_else(|| StreamError::NotAnArrayClass(desc.display_name()))?;
        let items = match &array.values {
            ArrayValues::Object(items) => ArrayItems::Object(vec![Value::Null; items.len()]),
            primitive => ArrayItems::Primitive(primitive.clone()),
        };
        let value = shared(ArrayValue { component, items });
        self.value = Some(value.clone());
        Ok(Some(Value::Array(value)))
    }

    fn build_complete(
        &mut self,
        cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        let (Some(target), ArrayValues::Object(items)) =
            (&self.value, &cx.arena().array(self.element)?.values)
        else {
            return Ok(Vec::new());
        };
        let mut deps = Vec::with_capacity(items.len());
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let (id, value) = cx.initial_for(*item)?;
            deps.push(id);
            values.push(value);
        }
        target.borrow_mut().items = ArrayItems::Object(values);
        Ok(deps)
    }
}

pub(crate) struct EnumDecoder {
    pub(crate) element: ElementId,
}

impl ObjectDecoder for EnumDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let arena = cx.arena();
        let constant = arena.enum_constant(self.element)?;
        Ok(Some(Value::Enum(Rc::new(EnumConstant {
            class_name: arena.class_name(constant.class_desc)?.to_owned(),
            name: arena.string(constant.constant)?.to_string_lossy(),
        }))))
    }
}

/// Generic decoder: one [`ClassFields`] per class with data. Primitive
/// fields are set at `Initial`, references and annotations at `Complete`.
pub(crate) struct FieldsDecoder {
    element: ElementId,
    value: Option<Shared<ObjectValue>>,
}

impl FieldsDecoder {
    pub(crate) fn new(element: ElementId) -> Self {
        Self {
            element,
            value: None,
        }
    }
}

impl ObjectDecoder for FieldsDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let arena = cx.arena();
        let obj = arena.object(self.element)?;
        let mut classes = IndexMap::with_capacity(obj.class_data.len());
        for (class, data) in &obj.class_data {
            let fields = data
                .values
                .iter()
                .map(|(name, v)| (name.clone(), Value::from_primitive(*v).unwrap_or(Value::Null)))
                .collect();
            classes.insert(
                arena.class_desc(*class)?.display_name(),
                ClassFields {
                    fields,
                    annotation: Vec::new(),
                },
            );
        }
        let value = shared(ObjectValue {
            class_name: arena.class_desc(obj.class_desc)?.display_name(),
            classes,
        });
        self.value = Some(value.clone());
        Ok(Some(Value::Object(value)))
    }

    fn build_complete(
        &mut self,
        cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        let Some(target) = self.value.clone() else {
            return Ok(Vec::new());
        };
        let obj = cx.arena().object(self.element)?;
        let mut deps = Vec::new();
        let mut fields = Vec::new();
        let mut annotations = Vec::with_capacity(obj.class_data.len());
        for (index, data) in obj.class_data.values().enumerate() {
            for (name, field) in &data.values {
                if let FieldValue::Object(id) = field {
                    let (dep, value) = cx.initial_for(*id)?;
                    deps.push(dep);
                    fields.push((index, name, value));
                }
            }
            let mut annotation = Vec::with_capacity(data.annotation.len());
            for content in &data.annotation {
                let (dep, value) = content_value(cx, content)?;
                deps.extend(dep);
                annotation.push(value);
            }
            annotations.push(annotation);
        }

        let mut target = target.borrow_mut();
        for (index, name, value) in fields {
            if let Some((_, class)) = target.classes.get_index_mut(index) {
                class.fields.insert(name.clone(), value);
            }
        }
        for (index, annotation) in annotations.into_iter().enumerate() {
            if let Some((_, class)) = target.classes.get_index_mut(index) {
                class.annotation = annotation;
            }
        }
        Ok(deps)
    }
}

/// `java.lang.Integer` and friends: the leaf class's `value` field.
pub(crate) struct BoxedDecoder {
    pub(crate) element: ElementId,
}

impl ObjectDecoder for BoxedDecoder {
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError> {
        let arena = cx.arena();
        let obj = arena.object(self.element)?;
        let class = arena.class_desc(obj.class_desc)?.display_name();
        let data = obj
            .class_data
            .get(&obj.class_desc)
            .ok_or_else(|| DecodeError::MissingClassData(class.clone()))?;
        let field = data.values.get("value").ok_or(DecodeError::MissingField {
            class,
            field: "value".to_owned(),
        })?;
        Value::from_primitive(*field)
            .map(Some)
            .ok_or(DecodeError::UnexpectedValue {
                expected: "primitive",
                found: "object",
            })
    }
}

/// `java.util.ArrayList`: `size` field, then an annotation holding the
/// capacity and `size` objects.
pub(crate) struct ArrayListDecoder {
    element: ElementId,
    value: Shared<Vec<Value>>,
}

impl ArrayListDecoder {
    pub(crate) fn new(element: ElementId) -> Self {
        Self {
            element,
            value: shared(Vec::new()),
        }
    }
}

impl ObjectDecoder for ArrayListDecoder {
    fn build_initial(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Option<Value>, DecodeError> {
        Ok(Some(Value::List(self.value.clone())))
    }

    fn build_complete(
        &mut self,
        cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        const CLASS: &str = "java.util.ArrayList";
        let data = class_data(cx, self.element, CLASS)?;
        let size = count(int_field(data, CLASS, "size")?)?;
        let mut reader = AnnotationReader::new(&data.annotation);
        reader.read_i32()?;
        let mut deps = Vec::new();
        let mut items = Vec::new();
        for _ in 0..size {
            let (dep, value) = cx.initial_for(reader.read_object()?)?;
            deps.push(dep);
            items.push(value);
        }
        *self.value.borrow_mut() = items;
        Ok(deps)
    }
}

/// `java.util.HashMap` and `java.util.LinkedHashMap`: bucket count, size,
/// then alternating keys and values in the annotation. Keys are made
/// comparable before insertion.
pub(crate) struct HashMapDecoder {
    element: ElementId,
    value: Shared<ValueMap>,
}

impl HashMapDecoder {
    pub(crate) fn new(element: ElementId) -> Self {
        Self {
            element,
            value: shared(ValueMap::new()),
        }
    }
}

impl ObjectDecoder for HashMapDecoder {
    fn build_initial(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Option<Value>, DecodeError> {
        Ok(Some(Value::Map(self.value.clone())))
    }

    fn build_complete(
        &mut self,
        cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        let data = class_data(cx, self.element, "java.util.HashMap")?;
        let mut reader = AnnotationReader::new(&data.annotation);
        let _buckets = reader.read_i32()?;
        let size = count(reader.read_i32()?)?;
        let mut deps = Vec::new();
        let mut entries = Vec::new();
        for _ in 0..size {
            let key_id = cx.decoder_for(reader.read_object()?)?;
            let key = cx.get_comparable(key_id)?;
            let (value_id, value) = cx.initial_for(reader.read_object()?)?;
            deps.extend([key_id, value_id]);
            entries.push((key, value));
        }
        self.value.borrow_mut().extend(entries);
        Ok(deps)
    }
}

/// `java.util.HashSet` and `java.util.LinkedHashSet`: capacity, load
/// factor, size, then the members.
pub(crate) struct HashSetDecoder {
    element: ElementId,
    value: Shared<ValueSet>,
}

impl HashSetDecoder {
    pub(crate) fn new(element: ElementId) -> Self {
        Self {
            element,
            value: shared(ValueSet::new()),
        }
    }
}

impl ObjectDecoder for HashSetDecoder {
    fn build_initial(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Option<Value>, DecodeError> {
        Ok(Some(Value::Set(self.value.clone())))
    }

    fn build_complete(
        &mut self,
        cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        let data = class_data(cx, self.element, "java.util.HashSet")?;
        let mut reader = AnnotationReader::new(&data.annotation);
        let _capacity = reader.read_i32()?;
        let _load_factor = reader.read_f32()?;
        let size = count(reader.read_i32()?)?;
        let mut deps = Vec::with_capacity(size.min(data.annotation.len()));
        let mut members = Vec::with_capacity(deps.capacity());
        for _ in 0..size {
            let id = cx.decoder_for(reader.read_object()?)?;
            members.push(cx.get_comparable(id)?);
            deps.push(id);
        }
        self.value.borrow_mut().extend(members);
        Ok(deps)
    }
}
