//! Interception Layer
//!
//! A [`Wrapper`] is the tracked façade over one target. Reads record a
//! dependency edge for whichever subscriber is evaluating; writes that change
//! a value trigger every subscriber of that property. Nested aggregates come
//! back wrapped, and the runtime hands out the same wrapper for a target for
//! as long as any handle to it is alive.
//!
//! Mutating sequence operations run with tracking suspended, then notify the
//! operation key, the length, every slot whose content changed, and the
//! property of the parent the sequence was reached through.

use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::reactive::{Runtime, RuntimeInner};

use super::key::{Access, PropKey, SequenceCall, SequenceOp};
use super::value::{Aggregate, Shape, Target, TargetId, Value};

pub(crate) struct WrapperInner {
    target: Target,
    runtime: Weak<RuntimeInner>,
}

impl WrapperInner {
    pub(crate) fn new(target: Target, runtime: Weak<RuntimeInner>) -> Self {
        Self { target, runtime }
    }

    #[cfg(test)]
    pub(crate) fn detached(target: Target) -> Self {
        Self::new(target, Weak::new())
    }
}

/// Tracked handle to a target.
///
/// Cloning is cheap and yields the same wrapper; equality is identity.
#[derive(Clone)]
pub struct Wrapper(Rc<WrapperInner>);

/// Result of a tracked read.
#[derive(Debug, Clone)]
pub enum Tracked {
    Scalar(Value),
    Object(Wrapper),
}

impl Tracked {
    pub fn is_null(&self) -> bool {
        matches!(self, Tracked::Scalar(Value::Null))
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.scalar().and_then(Value::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.scalar().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.scalar().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.scalar().and_then(Value::as_str)
    }

    pub fn as_wrapper(&self) -> Option<&Wrapper> {
        match self {
            Tracked::Object(w) => Some(w),
            Tracked::Scalar(_) => None,
        }
    }

    pub fn into_wrapper(self) -> Option<Wrapper> {
        match self {
            Tracked::Object(w) => Some(w),
            Tracked::Scalar(_) => None,
        }
    }

    /// The plain value, unwrapping nested wrappers back to their target.
    pub fn into_value(self) -> Value {
        match self {
            Tracked::Scalar(v) => v,
            Tracked::Object(w) => Value::Object(w.target().clone()),
        }
    }

    fn scalar(&self) -> Option<&Value> {
        match self {
            Tracked::Scalar(v) => Some(v),
            Tracked::Object(_) => None,
        }
    }
}

/// What an [`Access`] produced.
#[derive(Debug)]
pub enum Outcome {
    Read(Tracked),
    /// Whether the write changed the stored value.
    Written(bool),
    /// Whether the key existed.
    Deleted(bool),
    /// Items removed by the operation.
    Called(Vec<Value>),
}

impl Wrapper {
    pub(crate) fn from_inner(inner: Rc<WrapperInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn inner(&self) -> &Rc<WrapperInner> {
        &self.0
    }

    /// The wrapped target. Reads through it are untracked.
    pub fn target(&self) -> &Target {
        &self.0.target
    }

    pub fn id(&self) -> TargetId {
        self.0.target.id()
    }

    pub fn shape(&self) -> Shape {
        self.0.target.shape()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Wrapper) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn runtime(&self) -> Result<Runtime> {
        self.0
            .runtime
            .upgrade()
            .map(Runtime::from_inner)
            .ok_or(Error::RuntimeDropped)
    }

    fn expect_shape(&self, expected: Shape) -> Result<()> {
        let found = self.shape();
        if found == expected {
            Ok(())
        } else {
            Err(Error::ShapeMismatch { expected, found })
        }
    }

    /// Perform one interception.
    pub fn apply(&self, access: Access) -> Result<Outcome> {
        match access {
            Access::Read(key) => self.get(key).map(Outcome::Read),
            Access::Write(key, value) => self.set(key, value).map(Outcome::Written),
            Access::Delete(key) => self.delete(key).map(Outcome::Deleted),
            Access::Call(call) => self.call(call).map(Outcome::Called),
        }
    }

    /// Tracked read of one property.
    ///
    /// Missing fields and slots past the end read as `Null`. Nested targets
    /// come back wrapped and linked to this target through `key`.
    pub fn get(&self, key: impl Into<PropKey>) -> Result<Tracked> {
        let key = key.into();
        key.check_plain(self.shape())?;
        let runtime = self.runtime()?;
        runtime.track(self.id(), &key);

        let value = {
            let data = self.target().data();
            match (&*data, &key) {
                (Aggregate::Record(fields), PropKey::Field(name)) => {
                    fields.get(name).cloned().unwrap_or(Value::Null)
                }
                (Aggregate::Sequence(items), PropKey::Index(i)) => {
                    items.get(*i).cloned().unwrap_or(Value::Null)
                }
                (Aggregate::Sequence(items), PropKey::Length) => Value::Int(items.len() as i64),
                _ => Value::Null,
            }
        };

        Ok(match value {
            Value::Object(child) => Tracked::Object(runtime.wrap_nested(&child, self.id(), key)),
            scalar => Tracked::Scalar(scalar),
        })
    }

    /// Tracked presence check.
    pub fn has(&self, key: impl Into<PropKey>) -> Result<bool> {
        let key = key.into();
        key.check_plain(self.shape())?;
        let runtime = self.runtime()?;

        let data = self.target().data();
        Ok(match (&*data, &key) {
            (Aggregate::Record(fields), PropKey::Field(name)) => {
                runtime.track(self.id(), &key);
                fields.contains_key(name)
            }
            (Aggregate::Sequence(items), PropKey::Index(i)) => {
                runtime.track(self.id(), &PropKey::Length);
                *i < items.len()
            }
            _ => true,
        })
    }

    /// Write one property, triggering its subscribers if the value changed.
    ///
    /// Writing a slot past the end of a sequence pads it with `Null`. A write
    /// further out than `max_index_gap` is refused with
    /// [`Error::RangeOutOfBounds`] and leaves the sequence untouched.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        let value = value.into();
        key.check_plain(self.shape())?;
        if key == PropKey::Length {
            return Err(Error::InvalidKey {
                key,
                shape: self.shape(),
            });
        }
        let runtime = self.runtime()?;

        let mut triggers: SmallVec<[PropKey; 2]> = SmallVec::new();
        {
            let mut data = self.target().data_mut();
            match (&mut *data, &key) {
                (Aggregate::Record(fields), PropKey::Field(name)) => {
                    match fields.get_mut(name) {
                        Some(slot) => {
                            let old = std::mem::replace(slot, value.clone());
                            if !old.same_as(&value) {
                                triggers.push(key.clone());
                            }
                        }
                        None => {
                            fields.insert(name.clone(), value);
                            triggers.push(key.clone());
                            triggers.push(PropKey::Keys);
                        }
                    }
                }
                (Aggregate::Sequence(items), PropKey::Index(i)) => {
                    let i = *i;
                    if i < items.len() {
                        let old = std::mem::replace(&mut items[i], value.clone());
                        if !old.same_as(&value) {
                            triggers.push(key.clone());
                        }
                    } else {
                        let len = items.len();
                        if i - len > runtime.config().max_index_gap {
                            return Err(Error::RangeOutOfBounds {
                                start: len,
                                end: i.saturating_add(1),
                                len,
                            });
                        }
                        items.resize(i, Value::Null);
                        items.push(value);
                        triggers.push(key.clone());
                        triggers.push(PropKey::Length);
                    }
                }
                _ => {}
            }
        }

        let changed = !triggers.is_empty();
        for key in triggers {
            runtime.trigger(self.id(), key);
        }
        Ok(changed)
    }

    /// Remove a record field, triggering the field and the key set.
    pub fn delete(&self, key: impl Into<PropKey>) -> Result<bool> {
        let key = key.into();
        self.expect_shape(Shape::Record)?;
        key.check_plain(Shape::Record)?;
        let runtime = self.runtime()?;

        let removed = match (&mut *self.target().data_mut(), &key) {
            (Aggregate::Record(fields), PropKey::Field(name)) => {
                fields.shift_remove(name).is_some()
            }
            _ => false,
        };
        if removed {
            runtime.trigger(self.id(), key);
            runtime.trigger(self.id(), PropKey::Keys);
        }
        Ok(removed)
    }

    /// Tracked enumeration of a record's field names, in insertion order.
    pub fn keys(&self) -> Result<Vec<Rc<str>>> {
        self.expect_shape(Shape::Record)?;
        let runtime = self.runtime()?;
        runtime.track(self.id(), &PropKey::Keys);
        Ok(match &*self.target().data() {
            Aggregate::Record(fields) => fields.keys().cloned().collect(),
            Aggregate::Sequence(_) => Vec::new(),
        })
    }

    /// Tracked size: the length of a sequence or the field count of a record.
    pub fn len(&self) -> Result<usize> {
        let runtime = self.runtime()?;
        Ok(match &*self.target().data() {
            Aggregate::Record(fields) => {
                runtime.track(self.id(), &PropKey::Keys);
                fields.len()
            }
            Aggregate::Sequence(items) => {
                runtime.track(self.id(), &PropKey::Length);
                items.len()
            }
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Tracked read of every slot of a sequence.
    pub fn items(&self) -> Result<Vec<Tracked>> {
        self.expect_shape(Shape::Sequence)?;
        let len = self.len()?;
        (0..len).map(|i| self.get(i)).collect()
    }

    /// Append one item, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.call(SequenceCall::Push(vec![value.into()]))?;
        Ok(self.raw_len())
    }

    /// Append several items, returning the new length.
    pub fn extend<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.call(SequenceCall::Push(values.into_iter().map(Into::into).collect()))?;
        Ok(self.raw_len())
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        Ok(self.call(SequenceCall::Pop)?.pop())
    }

    pub fn shift(&self) -> Result<Option<Value>> {
        Ok(self.call(SequenceCall::Shift)?.pop())
    }

    /// Insert items at the front, returning the new length.
    pub fn unshift<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.call(SequenceCall::Unshift(
            values.into_iter().map(Into::into).collect(),
        ))?;
        Ok(self.raw_len())
    }

    /// Replace `delete` items starting at `start`, returning the removed ones.
    pub fn splice<I>(&self, start: usize, delete: usize, insert: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.call(SequenceCall::Splice {
            start,
            delete,
            insert: insert.into_iter().map(Into::into).collect(),
        })
    }

    /// Reorder in place. Reads the comparator makes are not tracked.
    pub fn sort_by<F>(&self, cmp: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> Ordering + 'static,
    {
        self.call(SequenceCall::Sort(Box::new(cmp))).map(drop)
    }

    pub fn reverse(&self) -> Result<()> {
        self.call(SequenceCall::Reverse).map(drop)
    }

    /// Subscribe the running observer to one mutating operation, without
    /// reading anything. It is notified each time `op` runs on this sequence.
    pub fn track_op(&self, op: SequenceOp) -> Result<()> {
        self.expect_shape(Shape::Sequence)?;
        self.runtime()?.track(self.id(), &PropKey::Op(op));
        Ok(())
    }

    /// Run an instrumented sequence operation.
    pub fn call(&self, call: SequenceCall) -> Result<Vec<Value>> {
        self.expect_shape(Shape::Sequence)?;
        let runtime = self.runtime()?;
        let op = call.op();

        // The items are taken out while the operation runs so a comparator
        // reading this same sequence sees it empty instead of re-borrowing.
        let mut items = match &mut *self.target().data_mut() {
            Aggregate::Sequence(items) => std::mem::take(items),
            Aggregate::Record(_) => Vec::new(),
        };
        let (result, changed_slots): (_, Vec<usize>) = match op {
            // Only the tail moves
            SequenceOp::Push | SequenceOp::Pop => {
                let old_len = items.len();
                let result = runtime.untracked(|| call.apply(&mut items));
                let new_len = items.len();
                (result, (old_len.min(new_len)..old_len.max(new_len)).collect())
            }
            _ => {
                let before = items.clone();
                let result = runtime.untracked(|| call.apply(&mut items));
                let changed = (0..before.len().max(items.len()))
                    .filter(|&i| match (before.get(i), items.get(i)) {
                        (Some(old), Some(new)) => !old.same_as(new),
                        _ => true,
                    })
                    .collect();
                (result, changed)
            }
        };
        if let Aggregate::Sequence(slot) = &mut *self.target().data_mut() {
            *slot = items;
        }
        let removed = result?;

        runtime.trigger(self.id(), PropKey::Op(op));
        runtime.trigger(self.id(), PropKey::Length);
        for i in changed_slots {
            runtime.trigger(self.id(), PropKey::Index(i));
        }
        if let Some(link) = runtime.parent_of(self.id()) {
            runtime.trigger(link.parent, link.key);
        }
        Ok(removed)
    }

    fn raw_len(&self) -> usize {
        match &*self.target().data() {
            Aggregate::Sequence(items) => items.len(),
            Aggregate::Record(fields) => fields.len(),
        }
    }

    /// Untracked JSON snapshot of the target.
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        self.target().to_json()
    }
}

impl PartialEq for Wrapper {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Wrapper {}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("target", &self.id())
            .field("shape", &self.shape())
            .finish()
    }
}
