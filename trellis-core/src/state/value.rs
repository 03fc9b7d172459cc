//! Plain Data
//!
//! Targets are the caller-owned aggregates that wrappers intercept. A target
//! is either a record (an insertion-ordered map of named fields) or a
//! sequence (a growable list). The shape is fixed when the target is built,
//! which lets wrappers decide up front which operations are legal.
//!
//! Targets are shared handles: cloning a [`Target`] clones the handle, not
//! the data. Two handles are the same target iff [`Target::ptr_eq`] holds.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Process-unique identity of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The two kinds of aggregate a target can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Record,
    Sequence,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Record => f.write_str("record"),
            Shape::Sequence => f.write_str("sequence"),
        }
    }
}

/// The storage behind a target.
#[derive(Debug, Clone)]
pub enum Aggregate {
    Record(IndexMap<Rc<str>, Value>),
    Sequence(Vec<Value>),
}

impl Aggregate {
    pub fn shape(&self) -> Shape {
        match self {
            Aggregate::Record(_) => Shape::Record,
            Aggregate::Sequence(_) => Shape::Sequence,
        }
    }
}

/// A value stored in a field or sequence slot.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(Target),
}

impl Value {
    /// Whether writing `other` over `self` is a no-op.
    ///
    /// Primitives compare by value, objects by identity. A float `NaN`
    /// matches another `NaN`, so rewriting one is not a change.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
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

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(t) => Some(t),
            _ => None,
        }
    }

    /// Build a value from JSON, allocating fresh targets for arrays and objects.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => Value::Object(Target::sequence(
                items.into_iter().map(Value::from_json).collect(),
            )),
            serde_json::Value::Object(fields) => Value::Object(Target::record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    fn to_json_guarded(&self, visiting: &mut HashSet<TargetId>) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(t) => t.to_json_guarded(visiting)?,
        })
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
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Object(t)
    }
}

impl From<&Target> for Value {
    fn from(t: &Target) -> Self {
        Value::Object(t.clone())
    }
}

pub(crate) struct TargetInner {
    id: TargetId,
    shape: Shape,
    data: RefCell<Aggregate>,
}

/// Shared handle to a caller-owned aggregate.
#[derive(Clone)]
pub struct Target(Rc<TargetInner>);

impl Target {
    /// Wrap an aggregate in a fresh target.
    pub fn new(data: Aggregate) -> Self {
        Self(Rc::new(TargetInner {
            id: TargetId::next(),
            shape: data.shape(),
            data: RefCell::new(data),
        }))
    }

    /// Create a record from `(name, value)` pairs, keeping their order.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<Rc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Aggregate::Record(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Create a sequence.
    pub fn sequence(items: Vec<Value>) -> Self {
        Self::new(Aggregate::Sequence(items))
    }

    /// Build a target from a JSON object or array.
    ///
    /// Returns `None` for JSON scalars, which have no aggregate to wrap.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from_json(json) {
            Value::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn shape(&self) -> Shape {
        self.0.shape
    }

    /// Whether both handles point at the same target.
    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Raw, untracked access to the data.
    pub fn data(&self) -> Ref<'_, Aggregate> {
        self.0.data.borrow()
    }

    /// Raw, untracked mutable access. Writes made here bypass every wrapper
    /// and notify nobody. Callers must not change the aggregate's shape.
    pub(crate) fn data_mut(&self) -> RefMut<'_, Aggregate> {
        self.0.data.borrow_mut()
    }

    pub(crate) fn downgrade(&self) -> Weak<TargetInner> {
        Rc::downgrade(&self.0)
    }

    /// Snapshot the target as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.to_json_guarded(&mut HashSet::new())
    }

    fn to_json_guarded(&self, visiting: &mut HashSet<TargetId>) -> Result<serde_json::Value> {
        if !visiting.insert(self.id()) {
            return Err(Error::Cycle);
        }
        let json = match &*self.data() {
            Aggregate::Record(fields) => {
                let mut map = serde_json::Map::with_capacity(fields.len());
                for (k, v) in fields {
                    map.insert(k.to_string(), v.to_json_guarded(visiting)?);
                }
                serde_json::Value::Object(map)
            }
            Aggregate::Sequence(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json_guarded(visiting))
                    .collect::<Result<_>>()?,
            ),
        };
        visiting.remove(&self.id());
        Ok(json)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    // Only the identity: a target may contain itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_ids_are_unique() {
        let a = Target::sequence(vec![]);
        let b = Target::sequence(vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn same_as_uses_identity_for_objects() {
        let a = Target::record::<&str, _>([]);
        let b = Target::record::<&str, _>([]);
        assert!(Value::from(&a).same_as(&Value::from(&a)));
        assert!(!Value::from(&a).same_as(&Value::from(&b)));
    }

    #[test]
    fn same_as_treats_nan_as_unchanged() {
        assert!(Value::Float(f64::NAN).same_as(&Value::Float(f64::NAN)));
        assert!(!Value::Int(1).same_as(&Value::Float(1.0)));
        assert!(Value::from("x").same_as(&Value::from(String::from("x"))));
    }

    #[test]
    fn json_roundtrip_keeps_field_order() {
        let source = json!({ "b": 1, "a": [true, null, "s"], "c": { "d": 2.5 } });
        let target = Target::from_json(source.clone()).unwrap();
        assert_eq!(target.shape(), Shape::Record);

        let keys: Vec<String> = match &*target.data() {
            Aggregate::Record(fields) => fields.keys().map(|k| k.to_string()).collect(),
            Aggregate::Sequence(_) => unreachable!(),
        };
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(target.to_json().unwrap(), source);
    }

    #[test]
    fn json_scalar_is_not_a_target() {
        assert!(Target::from_json(json!(3)).is_none());
    }

    #[test]
    fn snapshot_of_self_containing_target_fails() {
        let target = Target::record([("name", Value::from("loop"))]);
        if let Aggregate::Record(fields) = &mut *target.data_mut() {
            fields.insert("me".into(), Value::from(&target));
        }
        assert!(matches!(target.to_json(), Err(Error::Cycle)));
    }

    #[test]
    fn shared_child_is_not_a_cycle() {
        let child = Target::sequence(vec![Value::from(1)]);
        let parent = Target::record([("x", Value::from(&child)), ("y", Value::from(&child))]);
        assert_eq!(parent.to_json().unwrap(), json!({ "x": [1], "y": [1] }));
    }
}
