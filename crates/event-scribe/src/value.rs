use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// Field map of an object node. Keys keep the order the host inserted them
/// in, and that is the order they are written in.
pub type Map = IndexMap<String, Value>;

/// A structured event as produced by the host process.
///
/// Scalars are stored inline. Arrays and objects are shared, mutable nodes:
/// cloning a `Value` clones the *handle*, not the node, so several holders
/// can observe the same node and a node may (directly or indirectly)
/// contain itself. Node identity is pointer identity, see
/// [`node_id`](Self::node_id).
///
/// Values are deliberately `!Send`; an event lives on the thread that
/// dispatches it; only its serialized line crosses to the writer task.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Map>>),
}

impl Value {
    /// A new, empty object node.
    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(Map::new())))
    }

    /// A new, empty array node.
    pub fn array() -> Self {
        Value::Array(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Look up `key` on an object node, returning a handle to the field.
    ///
    /// Returns `None` for missing keys and for non-object values.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(node) => node.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Set `key` on an object node, returning the previous value. A new key
    /// goes last; an existing key keeps its position.
    ///
    /// Has no effect (and returns `None`) on non-object values.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        match self {
            Value::Object(node) => node.borrow_mut().insert(key.into(), value.into()),
            _ => None,
        }
    }

    /// Remove `key` from an object node, returning the removed value. The
    /// remaining keys keep their order.
    pub fn remove(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(node) => node.borrow_mut().shift_remove(key),
            _ => None,
        }
    }

    /// Append to an array node. Returns `false` for non-array values.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        match self {
            Value::Array(node) => {
                node.borrow_mut().push(value.into());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of an array node's element handles, in order.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(node) => Some(node.borrow().clone()),
            _ => None,
        }
    }

    /// Identity of the underlying node for arrays and objects.
    pub fn node_id(&self) -> Option<usize> {
        match self {
            Value::Array(node) => Some(Rc::as_ptr(node) as *const () as usize),
            Value::Object(node) => Some(Rc::as_ptr(node) as *const () as usize),
            _ => None,
        }
    }

    /// `true` when both values are handles to the same node.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self.node_id(), other.node_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    // Derived Debug would recurse forever on cyclic graphs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::serialize::serialize(self))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(Rc::new(RefCell::new(
                items.into_iter().map(Value::from).collect(),
            ))),
            serde_json::Value::Object(fields) => Value::Object(Rc::new(RefCell::new(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ))),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON representation and become `null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
