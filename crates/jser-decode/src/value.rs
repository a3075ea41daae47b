//! Runtime values produced by the staged decoder.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use jser_stream::{ArrayValues, FieldValue, StreamString, TypeDescriptor};

/// A mutable value with identity, shared by every reference to it.
pub type Shared<T> = Rc<RefCell<T>>;

pub type ValueMap = IndexMap<Value, Value>;
pub type ValueSet = IndexSet<Value>;

/// A class as a value (`Foo.class`), resolved through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassHandle {
    pub name: String,
    pub descriptor: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumConstant {
    pub class_name: String,
    pub name: String,
}

/// Fields and custom-written data of one class in an object's chain.
#[derive(Debug, Clone, Default)]
pub struct ClassFields {
    pub fields: IndexMap<String, Value>,
    pub annotation: Vec<Value>,
}

/// An object decoded field by field, without a dedicated decoder.
#[derive(Debug, Clone, Default)]
pub struct ObjectValue {
    pub class_name: String,
    /// Keyed by class name, root-most class first.
    pub classes: IndexMap<String, ClassFields>,
}

impl ObjectValue {
    /// Looks `name` up from the most-derived class upward.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.classes
            .values()
            .rev()
            .find_map(|class| class.fields.get(name))
    }
}

#[derive(Debug, Clone)]
pub enum ArrayItems {
    /// Primitive elements; never the `Object` variant.
    Primitive(ArrayValues),
    Object(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub component: TypeDescriptor,
    pub items: ArrayItems,
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match &self.items {
            ArrayItems::Primitive(values) => values.len(),
            ArrayItems::Object(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded value.
///
/// Scalars, strings, enum constants and classes compare and hash by
/// content. Arrays, lists, maps, sets and objects compare and hash by
/// identity, so walking a cyclic value never recurses.
///
/// Containers are reference counted, so a cycle keeps itself alive after
/// every outside handle is gone. [`crate::ObjectReader::release`] empties
/// every container a session built, which frees such cycles.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Rc<StreamString>),
    Enum(Rc<EnumConstant>),
    Class(Rc<ClassHandle>),
    BlockData(Rc<[u8]>),
    Array(Shared<ArrayValue>),
    List(Shared<Vec<Value>>),
    Map(Shared<ValueMap>),
    Set(Shared<ValueSet>),
    Object(Shared<ObjectValue>),
}

pub(crate) fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::new(StreamString::new(s)))
    }

    /// The primitive carried by a field value; `None` for references.
    pub fn from_primitive(value: FieldValue) -> Option<Self> {
        Some(match value {
            FieldValue::Byte(v) => Value::Byte(v),
            FieldValue::Char(v) => Value::Char(v),
            FieldValue::Double(v) => Value::Double(v),
            FieldValue::Float(v) => Value::Float(v),
            FieldValue::Int(v) => Value::Int(v),
            FieldValue::Long(v) => Value::Long(v),
            FieldValue::Short(v) => Value::Short(v),
            FieldValue::Boolean(v) => Value::Boolean(v),
            FieldValue::Object(_) => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Class(_) => "class",
            Value::BlockData(_) => "block data",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// String content, lossy on unpaired surrogates.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string_lossy()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Shared<ObjectValue>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Shared<Vec<Value>>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Shared<ValueMap>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Shared<ValueSet>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Shared<ArrayValue>> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Empties a shared container so it no longer keeps other values alive.
    /// Containers borrowed elsewhere are left as they are.
    pub fn clear_links(&self) {
        match self {
            Value::Array(array) => {
                if let Ok(mut array) = array.try_borrow_mut() {
                    if let ArrayItems::Object(items) = &mut array.items {
                        items.clear();
                    }
                }
            }
            Value::List(list) => {
                if let Ok(mut list) = list.try_borrow_mut() {
                    list.clear();
                }
            }
            Value::Map(map) => {
                if let Ok(mut map) = map.try_borrow_mut() {
                    map.clear();
                }
            }
            Value::Set(set) => {
                if let Ok(mut set) = set.try_borrow_mut() {
                    set.clear();
                }
            }
            Value::Object(obj) => {
                if let Ok(mut obj) = obj.try_borrow_mut() {
                    for class in obj.classes.values_mut() {
                        class.fields.clear();
                        class.annotation.clear();
                    }
                }
            }
            _ => {}
        }
    }

    fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Array(v) => Some(Rc::as_ptr(v) as *const ()),
            Value::List(v) => Some(Rc::as_ptr(v) as *const ()),
            Value::Map(v) => Some(Rc::as_ptr(v) as *const ()),
            Value::Set(v) => Some(Rc::as_ptr(v) as *const ()),
            Value::Object(v) => Some(Rc::as_ptr(v) as *const ()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::BlockData(a), Value::BlockData(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        if let Some(ptr) = self.identity() {
            ptr.hash(state);
            return;
        }
        match self {
            Value::Boolean(v) => v.hash(state),
            Value::Byte(v) => v.hash(state),
            Value::Char(v) => v.hash(state),
            Value::Short(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Class(v) => v.hash(state),
            Value::BlockData(v) => v.hash(state),
            _ => {}
        }
    }
}

/// Shared containers print as their type and address only.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(v) => write!(f, "Boolean({v})"),
            Value::Byte(v) => write!(f, "Byte({v})"),
            Value::Char(v) => write!(f, "Char({v:#06x})"),
            Value::Short(v) => write!(f, "Short({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Float(v) => write!(f, "Float({v:?})"),
            Value::Double(v) => write!(f, "Double({v:?})"),
            Value::String(s) => write!(f, "String({:?})", s.to_string_lossy()),
            Value::Enum(e) => write!(f, "Enum({}.{})", e.class_name, e.name),
            Value::Class(c) => write!(f, "Class({})", c.name),
            Value::BlockData(b) => write!(f, "BlockData({} bytes)", b.len()),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(inner) => write!(f, "Object({} @{:p})", inner.class_name, Rc::as_ptr(obj)),
                Err(_) => write!(f, "Object(@{:p})", Rc::as_ptr(obj)),
            },
            other => write!(
                f,
                "{}(@{:p})",
                other.type_name(),
                other.identity().unwrap_or(std::ptr::null())
            ),
        }
    }
}
