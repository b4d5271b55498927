use std::fmt;
use std::sync::Arc;

use crate::concurrency::ChanHandle;
use crate::error::SorrelError;
use crate::value::{ArrayHandle, MapHandle, RefHandle, Value};

/// A host-registered type. Hosts supply these through `Env::define_type` or the
/// package registry; the runtime only needs a name and a zero constructor.
pub trait HostType: Send + Sync {
    fn name(&self) -> &str;
    fn zero(&self) -> Value;
}

/// Runtime type descriptor, produced by `make`/`new` forms and host
/// registration. Composite shapes box their element descriptors.
#[derive(Clone)]
pub enum TypeDesc {
    /// The dynamic "anything" type (`interface`).
    Any,
    Bool,
    Int,
    Float,
    Str,
    Rune,
    Ptr(Box<TypeDesc>),
    Slice(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Chan(Box<TypeDesc>),
    Host(Arc<dyn HostType>),
}

impl TypeDesc {
    pub fn ptr(inner: TypeDesc) -> Self {
        TypeDesc::Ptr(Box::new(inner))
    }

    pub fn slice(inner: TypeDesc) -> Self {
        TypeDesc::Slice(Box::new(inner))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Map(Box::new(key), Box::new(value))
    }

    pub fn chan(inner: TypeDesc) -> Self {
        TypeDesc::Chan(Box::new(inner))
    }

    /// Resolve a primitive type name. Named types beyond these live in the
    /// environment's type namespace.
    pub fn primitive(name: &str) -> Option<TypeDesc> {
        match name {
            "interface" | "any" => Some(TypeDesc::Any),
            "bool" => Some(TypeDesc::Bool),
            "int" | "int64" => Some(TypeDesc::Int),
            "float" | "float64" => Some(TypeDesc::Float),
            "string" => Some(TypeDesc::Str),
            "rune" => Some(TypeDesc::Rune),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TypeDesc::Any => "interface".into(),
            TypeDesc::Bool => "bool".into(),
            TypeDesc::Int => "int".into(),
            TypeDesc::Float => "float".into(),
            TypeDesc::Str => "string".into(),
            TypeDesc::Rune => "rune".into(),
            TypeDesc::Ptr(inner) => format!("*{}", inner.describe()),
            TypeDesc::Slice(inner) => format!("[]{}", inner.describe()),
            TypeDesc::Map(key, value) => {
                format!("map[{}]{}", key.describe(), value.describe())
            }
            TypeDesc::Chan(inner) => format!("chan {}", inner.describe()),
            TypeDesc::Host(host) => host.name().to_string(),
        }
    }

    /// The zero value of this type. `new(T)` wraps it in a reference cell;
    /// `make(T)` and drained channel receives return it bare.
    pub fn zero(&self) -> Value {
        match self {
            TypeDesc::Any => Value::Nil,
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::Int => Value::Int(0),
            TypeDesc::Float => Value::Float(0.0),
            TypeDesc::Str => Value::Str(String::new()),
            TypeDesc::Rune => Value::Rune('\0'),
            TypeDesc::Ptr(inner) => Value::Ref(RefHandle::new(inner.zero())),
            TypeDesc::Slice(inner) => {
                Value::Array(ArrayHandle::typed(im::Vector::new(), (**inner).clone()))
            }
            TypeDesc::Map(key, value) => Value::Map(MapHandle::typed(
                im::HashMap::new(),
                (**key).clone(),
                (**value).clone(),
            )),
            TypeDesc::Chan(inner) => {
                Value::Chan(ChanHandle::new(Some(0), Some((**inner).clone())))
            }
            TypeDesc::Host(host) => host.zero(),
        }
    }

    /// Reify the runtime type of a value, for `make(type name, expr)`.
    pub fn of_value(value: &Value) -> Result<TypeDesc, SorrelError> {
        match value {
            Value::Nil => Ok(TypeDesc::Any),
            Value::Bool(_) => Ok(TypeDesc::Bool),
            Value::Int(_) => Ok(TypeDesc::Int),
            Value::Float(_) => Ok(TypeDesc::Float),
            Value::Str(_) => Ok(TypeDesc::Str),
            Value::Rune(_) => Ok(TypeDesc::Rune),
            Value::Array(handle) => Ok(TypeDesc::slice(
                handle.elem_type().unwrap_or(TypeDesc::Any),
            )),
            Value::Map(handle) => Ok(TypeDesc::map(
                handle.key_type().unwrap_or(TypeDesc::Any),
                handle.value_type().unwrap_or(TypeDesc::Any),
            )),
            Value::Chan(handle) => Ok(TypeDesc::chan(
                handle.elem_type().unwrap_or(TypeDesc::Any),
            )),
            Value::Ref(cell) => Ok(TypeDesc::ptr(TypeDesc::of_value(&cell.load())?)),
            Value::Type(desc) => Ok(desc.clone()),
            other => Err(SorrelError::type_error(format!(
                "cannot reify type of {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Debug for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDesc({})", self.describe())
    }
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeDesc::Any, TypeDesc::Any)
            | (TypeDesc::Bool, TypeDesc::Bool)
            | (TypeDesc::Int, TypeDesc::Int)
            | (TypeDesc::Float, TypeDesc::Float)
            | (TypeDesc::Str, TypeDesc::Str)
            | (TypeDesc::Rune, TypeDesc::Rune) => true,
            (TypeDesc::Ptr(a), TypeDesc::Ptr(b)) => a == b,
            (TypeDesc::Slice(a), TypeDesc::Slice(b)) => a == b,
            (TypeDesc::Map(ak, av), TypeDesc::Map(bk, bv)) => ak == bk && av == bv,
            (TypeDesc::Chan(a), TypeDesc::Chan(b)) => a == b,
            (TypeDesc::Host(a), TypeDesc::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
