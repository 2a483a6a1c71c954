//! Cycle-safe single-line JSON encoding of [`Value`] graphs.
//!
//! The traversal keeps the identities of the composite nodes on the current
//! path. A node reached again while it is still on that path is a
//! back-reference and is written as [`CIRCULAR_PLACEHOLDER`]. Nodes leave
//! the path when their encoding finishes, so a node shared by two siblings
//! is written in full both times.
//!
//! Composites nested deeper than [`MAX_DEPTH`] are written as
//! [`DEPTH_PLACEHOLDER`] so an acyclic but very deep event cannot exhaust
//! the stack of the thread that delivers it.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::value::Value;

/// Written in place of a reference back to a node on the current path.
pub const CIRCULAR_PLACEHOLDER: &str = "[Circular ~]";

/// Written in place of a composite nested deeper than [`MAX_DEPTH`].
pub const DEPTH_PLACEHOLDER: &str = "[Truncated ~]";

/// Deepest composite nesting written in full. Truncated lines stay within
/// the recursion limit `serde_json` applies when reading them back.
pub const MAX_DEPTH: usize = 100;

/// Terminator appended to every persisted line.
#[cfg(windows)]
pub const LINE_DELIMITER: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_DELIMITER: &str = "\n";

/// Encode `value` as compact JSON. Never fails.
pub fn serialize(value: &Value) -> String {
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            // Unreachable with string keys and serde_json numbers, but a
            // handler must not fail on bad input.
            warn!(%err, "event could not be encoded; writing null");
            "null".to_owned()
        }
    }
}

/// [`serialize`] followed by [`LINE_DELIMITER`].
pub fn to_line(value: &Value) -> String {
    let mut line = serialize(value);
    line.push_str(LINE_DELIMITER);
    line
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Fresh walk state per top-level call.
        let walk = Walk::default();
        Tracked {
            value: self,
            walk: &walk,
            depth: 0,
        }
        .serialize(serializer)
    }
}

/// State shared by every node of one encoding call.
#[derive(Default)]
struct Walk {
    path: RefCell<HashSet<usize>>,
    truncated: Cell<bool>,
}

impl Walk {
    fn truncate(&self, depth: usize) {
        if !self.truncated.replace(true) {
            warn!(depth, max_depth = MAX_DEPTH, "event nested too deeply; truncating");
        }
    }
}

struct Tracked<'a> {
    value: &'a Value,
    walk: &'a Walk,
    depth: usize,
}

impl<'a> Tracked<'a> {
    fn child<'b>(&'b self, value: &'b Value) -> Tracked<'b> {
        Tracked {
            value,
            walk: self.walk,
            depth: self.depth + 1,
        }
    }

    /// Placeholder to write instead of this composite, if any. Otherwise the
    /// returned guard keeps the node on the path until it is dropped.
    fn enter(&self) -> Result<OnPath<'a>, &'static str> {
        let id = self.value.node_id().ok_or(CIRCULAR_PLACEHOLDER)?;
        let guard = OnPath::enter(&self.walk.path, id).ok_or(CIRCULAR_PLACEHOLDER)?;
        if self.depth >= MAX_DEPTH {
            self.walk.truncate(self.depth);
            return Err(DEPTH_PLACEHOLDER);
        }
        Ok(guard)
    }
}

/// Marks a node as on-path for as long as it lives.
struct OnPath<'a> {
    path: &'a RefCell<HashSet<usize>>,
    id: usize,
}

impl<'a> OnPath<'a> {
    /// `None` when the node is already on the path.
    fn enter(path: &'a RefCell<HashSet<usize>>, id: usize) -> Option<Self> {
        path.borrow_mut().insert(id).then_some(Self { path, id })
    }
}

impl Drop for OnPath<'_> {
    fn drop(&mut self) {
        self.path.borrow_mut().remove(&self.id);
    }
}

impl Serialize for Tracked<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(node) => {
                let _guard = match self.enter() {
                    Ok(guard) => guard,
                    Err(placeholder) => return serializer.serialize_str(placeholder),
                };
                let items = node.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            Value::Object(node) => {
                let _guard = match self.enter() {
                    Ok(guard) => guard,
                    Err(placeholder) => return serializer.serialize_str(placeholder),
                };
                let fields = node.borrow();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, field) in fields.iter() {
                    map.serialize_entry(key, &self.child(field))?;
                }
                map.end()
            }
        }
    }
}
