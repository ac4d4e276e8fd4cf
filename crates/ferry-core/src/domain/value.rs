//! Value - context 内で扱う値のモデル
//!
//! プリミティブ（Undefined, Null, Bool, Number, String）は値として、
//! Buffer / Array / Object は参照として振る舞います（`clone()` は同じ実体を指す）。
//! Function / Handle は context に束縛された「生きている」値で、境界を越えて送れません。

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SerializationError;

/// Deepest nesting of arrays and objects that can cross a context boundary.
///
/// `to_json` shares the limit; `Debug` elides anything deeper as `[...]`.
pub const MAX_DEPTH: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable binary payload (the ArrayBuffer of this model).
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(Mutex::new(bytes.into())))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        lock(&self.0).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// Ordered list of values with reference identity.
#[derive(Clone, Default)]
pub struct Array(Arc<Mutex<Vec<Value>>>);

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(Mutex::new(items)))
    }

    pub fn push(&self, value: Value) {
        lock(&self.0).push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.0).get(index).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shallow copy of the items. The lock is released before the caller
    /// touches nested values, so walking a cyclic graph cannot self-deadlock.
    pub fn to_vec(&self) -> Vec<Value> {
        lock(&self.0).clone()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// String-keyed map of values with reference identity.
#[derive(Clone, Default)]
pub struct Object(Arc<Mutex<BTreeMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        lock(&self.0).insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.0).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shallow copy of the entries in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        lock(&self.0)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

// 入れ子を平らにほどいてから手放す（深い値でも drop が再帰しない）
impl Drop for Array {
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) == 1 {
            let items = std::mem::take(&mut *lock(&self.0));
            drop_flat(items);
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) == 1 {
            let entries = std::mem::take(&mut *lock(&self.0));
            drop_flat(entries.into_values().collect());
        }
    }
}

fn drop_flat(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match &value {
            Value::Array(a) if Arc::strong_count(&a.0) == 1 => {
                pending.append(&mut *lock(&a.0));
            }
            Value::Object(o) if Arc::strong_count(&o.0) == 1 => {
                let entries = std::mem::take(&mut *lock(&o.0));
                pending.extend(entries.into_values());
            }
            _ => {}
        }
    }
}

type Callable = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A live callback. Never transportable.
#[derive(Clone)]
pub struct Function(Arc<Callable>);

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// A live resource handle (a worker, a port, a socket...). Never transportable.
#[derive(Clone)]
pub struct Handle {
    kind: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Handle {
    pub fn new(kind: &'static str, inner: impl Any + Send + Sync) -> Self {
        Self {
            kind,
            inner: Arc::new(inner),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

/// A value living inside one context.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Buffer(Buffer),
    Array(Array),
    Object(Object),
    Function(Function),
    Handle(Handle),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Buffer(_) => "buffer",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Handle(_) => "handle",
        }
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        let object = Object::new();
        for (k, v) in entries {
            object.insert(k, v);
        }
        Value::Object(object)
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(Array::new(items.into_iter().collect()))
    }

    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Buffer(Buffer::new(bytes))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Field lookup on objects; `None` for every other kind.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Identity of reference values. Primitives never share identity.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self.ref_addr(), other.ref_addr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn ref_addr(&self) -> Option<usize> {
        match self {
            Value::Buffer(b) => Some(b.addr()),
            Value::Array(a) => Some(a.addr()),
            Value::Object(o) => Some(o.addr()),
            Value::Function(f) => Some(f.addr()),
            Value::Handle(h) => Some(h.addr()),
            _ => None,
        }
    }

    /// Structural equality. Cycle-safe; `NaN` equals `NaN`.
    pub fn deep_eq(&self, other: &Value) -> bool {
        deep_eq(self, other)
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// JSON view, following `JSON.stringify` conventions: non-finite numbers
    /// become `null`, `undefined` fields are omitted. Cycles and live values fail.
    pub fn to_json(&self) -> Result<serde_json::Value, SerializationError> {
        to_json(self, &mut Vec::new())
    }
}

/// 明示的なスタックで比較する（深い入れ子でも call stack を使わない）
fn deep_eq(a: &Value, b: &Value) -> bool {
    // 比較中・比較済みの参照の組は等しいとみなす（循環対策）
    let mut seen = HashSet::new();
    let mut pending = vec![(a.clone(), b.clone())];
    while let Some((a, b)) = pending.pop() {
        let equal = match (&a, &b) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Buffer(x), Value::Buffer(y)) => x.addr() == y.addr() || x.to_vec() == y.to_vec(),
            (Value::Array(x), Value::Array(y)) => {
                if x.addr() == y.addr() || !seen.insert((x.addr(), y.addr())) {
                    continue;
                }
                let (xs, ys) = (x.to_vec(), y.to_vec());
                let same_len = xs.len() == ys.len();
                pending.extend(xs.into_iter().zip(ys));
                same_len
            }
            (Value::Object(x), Value::Object(y)) => {
                if x.addr() == y.addr() || !seen.insert((x.addr(), y.addr())) {
                    continue;
                }
                let (xs, ys) = (x.entries(), y.entries());
                xs.len() == ys.len()
                    && xs.into_iter().zip(ys).all(|((kl, vl), (kr, vr))| {
                        pending.push((vl, vr));
                        kl == kr
                    })
            }
            (Value::Function(x), Value::Function(y)) => x.addr() == y.addr(),
            (Value::Handle(x), Value::Handle(y)) => x.addr() == y.addr(),
            _ => false,
        };
        if !equal {
            return false;
        }
    }
    true
}

fn to_json(value: &Value, stack: &mut Vec<usize>) -> Result<serde_json::Value, SerializationError> {
    let json = match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Buffer(b) => serde_json::Value::Array(b.to_vec().into_iter().map(Into::into).collect()),
        Value::Array(a) => {
            enter(stack, a.addr())?;
            let items = a
                .to_vec()
                .iter()
                .map(|v| to_json(v, stack))
                .collect::<Result<Vec<_>, _>>()?;
            stack.pop();
            serde_json::Value::Array(items)
        }
        Value::Object(o) => {
            enter(stack, o.addr())?;
            let mut map = serde_json::Map::new();
            for (k, v) in o.entries() {
                if matches!(v, Value::Undefined) {
                    continue;
                }
                map.insert(k, to_json(&v, stack)?);
            }
            stack.pop();
            serde_json::Value::Object(map)
        }
        Value::Function(_) | Value::Handle(_) => {
            return Err(SerializationError::Unsupported { kind: value.kind() });
        }
    };
    Ok(json)
}

fn enter(stack: &mut Vec<usize>, addr: usize) -> Result<(), SerializationError> {
    if stack.contains(&addr) {
        return Err(SerializationError::Unsupported { kind: "cyclic structure" });
    }
    if stack.len() >= MAX_DEPTH {
        return Err(SerializationError::TooDeep { limit: MAX_DEPTH });
    }
    stack.push(addr);
    Ok(())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

/// Debug adaptor that prints revisited references as `[Circular]`.
struct Show<'a> {
    value: &'a Value,
    stack: &'a RefCell<Vec<usize>>,
}

impl fmt::Debug for Show<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(addr) = self.value.ref_addr() {
            let depth = {
                let stack = self.stack.borrow();
                if stack.contains(&addr) {
                    return f.write_str("[Circular]");
                }
                stack.len()
            };
            if depth >= MAX_DEPTH {
                return f.write_str("[...]");
            }
            self.stack.borrow_mut().push(addr);
        }
        let result = match self.value {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Buffer(b) => f.debug_tuple("Buffer").field(&b.to_vec()).finish(),
            Value::Array(a) => {
                let items = a.to_vec();
                f.debug_list()
                    .entries(items.iter().map(|v| Show { value: v, stack: self.stack }))
                    .finish()
            }
            Value::Object(o) => {
                let entries = o.entries();
                f.debug_map()
                    .entries(
                        entries
                            .iter()
                            .map(|(k, v)| (k, Show { value: v, stack: self.stack })),
                    )
                    .finish()
            }
            Value::Function(_) => f.write_str("[Function]"),
            Value::Handle(h) => write!(f, "[Handle {}]", h.kind()),
        };
        if self.value.ref_addr().is_some() {
            self.stack.borrow_mut().pop();
        }
        result
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = RefCell::new(Vec::new());
        Show { value: self, stack: &stack }.fmt(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::new(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clone_aliases_reference_values() {
        let v = Value::object([("a", Value::from(1))]);
        let alias = v.clone();
        v.as_object().unwrap().insert("b", Value::from(2));

        assert!(v.same_ref(&alias));
        assert_eq!(alias.get("b"), Some(Value::from(2)));
    }

    #[test]
    fn primitives_never_share_identity() {
        assert!(!Value::from(1).same_ref(&Value::from(1)));
        assert!(!Value::Null.same_ref(&Value::Null));
    }

    #[test]
    fn deep_eq_is_structural() {
        let a = Value::from(json!({"ping": 1, "list": [1, "two", null]}));
        let b = Value::from(json!({"ping": 1, "list": [1, "two", null]}));
        let c = Value::from(json!({"ping": 2, "list": [1, "two", null]}));

        assert!(!a.same_ref(&b));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nan_equals_nan() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn deep_eq_handles_cycles() {
        let make = || {
            let arr = Array::default();
            arr.push(Value::from("x"));
            arr.push(Value::Array(arr.clone()));
            Value::Array(arr)
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = Function::new(|_| Value::Undefined);
        let g = Function::new(|_| Value::Undefined);
        assert_eq!(Value::Function(f.clone()), Value::Function(f));
        assert_ne!(
            Value::Function(g),
            Value::Function(Function::new(|_| Value::Undefined))
        );
    }

    #[test]
    fn debug_marks_cycles() {
        let obj = Object::new();
        obj.insert("self", Value::Object(obj.clone()));
        let printed = format!("{:?}", Value::Object(obj));
        assert!(printed.contains("[Circular]"));
    }

    #[test]
    fn to_json_follows_stringify_rules() {
        let v = Value::object([
            ("n", Value::Number(f64::INFINITY)),
            ("u", Value::Undefined),
            ("echo", Value::Bool(true)),
        ]);
        assert_eq!(v.to_json().unwrap(), json!({"n": null, "echo": true}));
    }

    #[test]
    fn to_json_rejects_cycles_and_live_values() {
        let arr = Array::default();
        arr.push(Value::Array(arr.clone()));
        assert!(Value::Array(arr).to_json().is_err());

        let f = Value::Function(Function::new(|_| Value::Null));
        assert!(matches!(
            f.to_json(),
            Err(SerializationError::Unsupported { kind: "function" })
        ));
    }

    #[test]
    fn handles_expose_their_payload() {
        let h = Handle::new("port", 42u32);
        assert_eq!(h.kind(), "port");
        assert_eq!(h.downcast_ref::<u32>(), Some(&42));
    }
}
