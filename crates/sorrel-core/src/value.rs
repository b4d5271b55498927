use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use im::{HashMap, Vector};

use crate::ast::Stmt;
use crate::concurrency::ChanHandle;
use crate::env::Env;
use crate::error::SorrelError;
use crate::types::TypeDesc;

/// Map keys are the hashable mirror of `Value`. Floats key by bit pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    Str(String),
    Int(i64),
    Bool(bool),
    Rune(char),
    Float(u64),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Result<MapKey, SorrelError> {
        match value {
            Value::Str(s) => Ok(MapKey::Str(s.clone())),
            Value::Int(n) => Ok(MapKey::Int(*n)),
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Rune(r) => Ok(MapKey::Rune(*r)),
            Value::Float(f) => Ok(MapKey::Float(f.to_bits())),
            other => Err(SorrelError::type_error(format!(
                "type {} cannot be used as map key",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Str(s) => Value::Str(s.clone()),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Rune(r) => Value::Rune(*r),
            MapKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
        }
    }
}

/// Reference-like array. Cloning the handle shares the backing store; the
/// optional element type makes writes convert (and fail) like a typed slice.
#[derive(Clone)]
pub struct ArrayHandle {
    items: Arc<Mutex<Vector<Value>>>,
    elem: Option<Arc<TypeDesc>>,
}

impl ArrayHandle {
    pub fn new(items: Vector<Value>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            elem: None,
        }
    }

    pub fn typed(items: Vector<Value>, elem: TypeDesc) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            elem: Some(Arc::new(elem)),
        }
    }

    pub fn elem_type(&self) -> Option<TypeDesc> {
        self.elem.as_deref().cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vector<Value> {
        self.items.lock().unwrap().clone()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.lock().unwrap().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut guard = self.items.lock().unwrap();
        guard.set(index, value);
    }

    pub fn push(&self, value: Value) {
        self.items.lock().unwrap().push_back(value);
    }

    /// Swap the whole backing store; every alias observes the new contents.
    pub fn replace(&self, items: Vector<Value>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn ptr_eq(&self, other: &ArrayHandle) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

/// Reference-like map over `im::HashMap`, optionally key/value typed.
#[derive(Clone)]
pub struct MapHandle {
    entries: Arc<Mutex<HashMap<MapKey, Value>>>,
    key: Option<Arc<TypeDesc>>,
    value: Option<Arc<TypeDesc>>,
}

impl MapHandle {
    pub fn new(entries: HashMap<MapKey, Value>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            key: None,
            value: None,
        }
    }

    pub fn typed(entries: HashMap<MapKey, Value>, key: TypeDesc, value: TypeDesc) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            key: Some(Arc::new(key)),
            value: Some(Arc::new(value)),
        }
    }

    pub fn key_type(&self) -> Option<TypeDesc> {
        self.key.as_deref().cloned()
    }

    pub fn value_type(&self) -> Option<TypeDesc> {
        self.value.as_deref().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<MapKey, Value> {
        self.entries.lock().unwrap().clone()
    }

    pub fn get(&self, key: &MapKey) -> Option<Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: MapKey, value: Value) {
        self.entries.lock().unwrap().insert(key, value);
    }

    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &MapKey) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn keys(&self) -> Vec<MapKey> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &MapHandle) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

/// Shared mutable cell backing `new(T)`, `make(*T)` and address-of.
#[derive(Clone)]
pub struct RefHandle {
    cell: Arc<RwLock<Value>>,
}

impl RefHandle {
    pub fn new(value: Value) -> Self {
        Self {
            cell: Arc::new(RwLock::new(value)),
        }
    }

    pub fn load(&self) -> Value {
        self.cell.read().unwrap().clone()
    }

    pub fn store(&self, value: Value) {
        *self.cell.write().unwrap() = value;
    }

    pub fn ptr_eq(&self, other: &RefHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// Accepted argument counts of a host trampoline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FnArity {
    pub min: usize,
    pub max: Option<usize>,
}

impl FnArity {
    pub fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub fn at_least(n: usize) -> Self {
        Self { min: n, max: None }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl fmt::Display for FnArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}+", self.min),
        }
    }
}

type NativeFnImpl = dyn Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync;

/// A host callable: `(name, arity, invoker)` trampoline plus an optional
/// declared parameter signature the bridge converts arguments toward. The
/// final declared parameter of a variadic trampoline absorbs the tail.
pub struct NativeFn {
    pub name: Option<String>,
    pub arity: FnArity,
    pub params: Option<Vec<TypeDesc>>,
    pub variadic_elem: Option<TypeDesc>,
    func: Box<NativeFnImpl>,
}

impl NativeFn {
    pub fn new(
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: None,
            arity,
            params: None,
            variadic_elem: None,
            func: Box::new(func),
        }
    }

    pub fn with_name(
        arity: FnArity,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Some(name.into()),
            arity,
            params: None,
            variadic_elem: None,
            func: Box::new(func),
        }
    }

    pub fn with_params(mut self, params: Vec<TypeDesc>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_variadic(mut self, elem: TypeDesc) -> Self {
        self.variadic_elem = Some(elem);
        self
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, SorrelError> {
        (self.func)(args)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<native>")
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({}, arity {})", self.display_name(), self.arity)
    }
}

/// A script-defined function. Captures its defining scope by reference.
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Vec<Stmt>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closure({}, {} params)",
            self.name.as_deref().unwrap_or("<anon>"),
            self.params.len()
        )
    }
}

/// An opaque host object. Rust has no runtime reflection, so hosts expose
/// members and methods explicitly; a member that is callable is returned as a
/// bound `Value::Native`.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &str;

    fn get(&self, name: &str) -> Option<Value>;

    fn set(&self, name: &str, _value: Value) -> Result<(), SorrelError> {
        Err(SorrelError::type_error(format!(
            "type {} does not support member assignment",
            self.type_name()
        )))
    }
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Rune(char),
    Array(ArrayHandle),
    Map(MapHandle),
    Chan(ChanHandle),
    /// Script closure.
    Func(Arc<Closure>),
    /// Host trampoline.
    Native(Arc<NativeFn>),
    /// Reified type descriptor.
    Type(TypeDesc),
    /// Shared mutable cell (`new`, `make(*T)`, address-of).
    Ref(RefHandle),
    /// Module namespace exposed as a value.
    Module(Env),
    /// Opaque host object.
    Host(Arc<dyn HostObject>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Rune(_) => "rune",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Chan(_) => "chan",
            Value::Func(_) | Value::Native(_) => "func",
            Value::Type(_) => "type",
            Value::Ref(_) => "ref",
            Value::Module(_) => "module",
            Value::Host(_) => "object",
        }
    }

    /// The truthiness rule: nil, false, zero numerics, and empty
    /// strings/arrays/maps are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Rune(r) => *r != '\0',
            Value::Array(handle) => !handle.is_empty(),
            Value::Map(handle) => !handle.is_empty(),
            _ => true,
        }
    }

    pub fn native_fn(
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Value::Native(Arc::new(NativeFn::new(arity, func)))
    }

    pub fn native_fn_with_name(
        name: impl Into<String>,
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Value::Native(Arc::new(NativeFn::with_name(arity, name, func)))
    }

    pub fn array_from(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(ArrayHandle::new(items.into_iter().collect()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // Numeric comparison is type tolerant.
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Rune(a), Value::Rune(b)) => a == b,
            (Value::Rune(a), Value::Int(b)) | (Value::Int(b), Value::Rune(a)) => {
                *a as i64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.ptr_eq(b) || a.snapshot() == b.snapshot()
            }
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Chan(a), Value::Chan(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Module(a), Value::Module(b)) => a.ptr_eq(b),
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Rune(r) => write!(f, "{}", r),
            Value::Array(handle) => {
                write!(f, "[")?;
                for (i, item) in handle.snapshot().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(handle) => {
                let mut entries: Vec<(MapKey, Value)> =
                    handle.snapshot().into_iter().collect();
                entries.sort_by_key(|(k, _)| format!("{}", k.to_value()));
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key.to_value(), value)?;
                }
                write!(f, "}}")
            }
            Value::Chan(handle) => write!(f, "{}", handle),
            Value::Func(closure) => {
                write!(f, "func {}", closure.name.as_deref().unwrap_or("<anon>"))
            }
            Value::Native(native) => write!(f, "func {}", native.display_name()),
            Value::Type(desc) => write!(f, "type {}", desc.describe()),
            Value::Ref(cell) => write!(f, "&{}", cell.load()),
            Value::Module(_) => write!(f, "<module>"),
            Value::Host(host) => write!(f, "<{}>", host.type_name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<char> for Value {
    fn from(r: char) -> Self {
        Value::Rune(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array_from(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_classes() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::array_from([]).is_truthy());

        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(Value::array_from([Value::Nil]).is_truthy());
    }

    #[test]
    fn double_negation_is_idempotent() {
        for value in [
            Value::Nil,
            Value::Bool(true),
            Value::Int(3),
            Value::Str("a".into()),
            Value::array_from([]),
        ] {
            let truthy = value.is_truthy();
            assert_eq!(!!truthy, truthy);
        }
    }

    #[test]
    fn numeric_equality_is_tolerant() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Rune('a'), Value::Int('a' as i64));
        assert_ne!(Value::Int(1), Value::Str("1".into()));
        assert_ne!(Value::Nil, Value::Bool(false));
    }

    #[test]
    fn arrays_compare_by_content_or_identity() {
        let a = Value::array_from([Value::Int(1), Value::Int(2)]);
        let b = Value::array_from([Value::Int(1), Value::Int(2)]);
        assert_eq!(a, b);

        let handle = ArrayHandle::new([Value::Int(1)].into_iter().collect());
        assert_eq!(Value::Array(handle.clone()), Value::Array(handle));
    }

    #[test]
    fn shared_backing_store() {
        let a = ArrayHandle::new([Value::Int(1)].into_iter().collect());
        let b = a.clone();
        b.set(0, Value::Int(9));
        assert_eq!(a.get(0), Some(Value::Int(9)));
    }

    #[test]
    fn map_key_round_trip() {
        for value in [
            Value::Str("k".into()),
            Value::Int(2),
            Value::Bool(true),
            Value::Rune('x'),
            Value::Float(1.5),
        ] {
            let key = MapKey::from_value(&value).unwrap();
            assert_eq!(key.to_value(), value);
        }
        assert!(MapKey::from_value(&Value::Nil).is_err());
    }
}
