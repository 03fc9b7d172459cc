//! Property Keys and Accesses
//!
//! A dependency edge is keyed by `(target, PropKey)`. Besides named fields and
//! sequence slots there are three pseudo-properties: the sequence length, the
//! record key set, and one key per mutating sequence operation.
//!
//! [`Access`] is the tagged form of every interception a wrapper performs.
//! Which accesses are legal follows from the target's [`Shape`] alone.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};

use super::value::{Shape, Value};

/// The mutating operations a wrapped sequence instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceOp {
    /// Append at the end.
    Push,
    /// Remove the last item.
    Pop,
    /// Remove the first item.
    Shift,
    /// Insert at the front.
    Unshift,
    /// Replace a range.
    Splice,
    /// Reorder in place.
    Sort,
    Reverse,
}

impl SequenceOp {
    pub fn name(&self) -> &'static str {
        match self {
            SequenceOp::Push => "push",
            SequenceOp::Pop => "pop",
            SequenceOp::Shift => "shift",
            SequenceOp::Unshift => "unshift",
            SequenceOp::Splice => "splice",
            SequenceOp::Sort => "sort",
            SequenceOp::Reverse => "reverse",
        }
    }
}

/// A property of a target that readers can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// A named record field.
    Field(Rc<str>),
    /// A sequence slot.
    Index(usize),
    /// The sequence length.
    Length,
    /// The record key set, read by enumeration.
    Keys,
    /// Notified after the given mutating operation ran.
    Op(SequenceOp),
}

impl PropKey {
    /// Check that the key can be read, written or deleted on a target of the
    /// given shape. Pseudo-keys other than `Length` have dedicated accessors.
    pub(crate) fn check_plain(&self, shape: Shape) -> Result<()> {
        let ok = match (self, shape) {
            (PropKey::Field(_), Shape::Record) => true,
            (PropKey::Index(_) | PropKey::Length, Shape::Sequence) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidKey {
                key: self.clone(),
                shape,
            })
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Field(name) => f.write_str(name),
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Length => f.write_str("length"),
            PropKey::Keys => f.write_str("<keys>"),
            PropKey::Op(op) => write!(f, "<{}>", op.name()),
        }
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Field(name.into())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Field(name.into())
    }
}

impl From<Rc<str>> for PropKey {
    fn from(name: Rc<str>) -> Self {
        PropKey::Field(name)
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

/// Comparator passed to [`SequenceCall::Sort`].
pub type Comparator = Box<dyn FnMut(&Value, &Value) -> Ordering>;

/// A mutating sequence operation with its arguments.
pub enum SequenceCall {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    Splice {
        start: usize,
        delete: usize,
        insert: Vec<Value>,
    },
    Sort(Comparator),
    Reverse,
}

impl SequenceCall {
    pub fn op(&self) -> SequenceOp {
        match self {
            SequenceCall::Push(_) => SequenceOp::Push,
            SequenceCall::Pop => SequenceOp::Pop,
            SequenceCall::Shift => SequenceOp::Shift,
            SequenceCall::Unshift(_) => SequenceOp::Unshift,
            SequenceCall::Splice { .. } => SequenceOp::Splice,
            SequenceCall::Sort(_) => SequenceOp::Sort,
            SequenceCall::Reverse => SequenceOp::Reverse,
        }
    }

    /// Run the native operation on the raw items, returning whatever it
    /// removed.
    pub(crate) fn apply(self, items: &mut Vec<Value>) -> Result<Vec<Value>> {
        Ok(match self {
            SequenceCall::Push(values) => {
                items.extend(values);
                Vec::new()
            }
            SequenceCall::Pop => items.pop().into_iter().collect(),
            SequenceCall::Shift => {
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![items.remove(0)]
                }
            }
            SequenceCall::Unshift(values) => {
                items.splice(0..0, values);
                Vec::new()
            }
            SequenceCall::Splice {
                start,
                delete,
                insert,
            } => {
                let end = start.saturating_add(delete);
                if start > items.len() || end > items.len() {
                    return Err(Error::RangeOutOfBounds {
                        start,
                        end,
                        len: items.len(),
                    });
                }
                items.splice(start..end, insert).collect()
            }
            SequenceCall::Sort(mut cmp) => {
                items.sort_by(|a, b| cmp(a, b));
                Vec::new()
            }
            SequenceCall::Reverse => {
                items.reverse();
                Vec::new()
            }
        })
    }
}

impl fmt::Debug for SequenceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op().name())
    }
}

/// One interception on a wrapper.
#[derive(Debug)]
pub enum Access {
    Read(PropKey),
    Write(PropKey, Value),
    Delete(PropKey),
    Call(SequenceCall),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(items: &[Value]) -> Vec<i64> {
        items.iter().filter_map(Value::as_i64).collect()
    }

    #[test]
    fn plain_keys_follow_shape() {
        assert!(PropKey::from("a").check_plain(Shape::Record).is_ok());
        assert!(PropKey::from(0).check_plain(Shape::Sequence).is_ok());
        assert!(PropKey::Length.check_plain(Shape::Sequence).is_ok());

        assert!(PropKey::from("a").check_plain(Shape::Sequence).is_err());
        assert!(PropKey::Length.check_plain(Shape::Record).is_err());
        assert!(PropKey::Keys.check_plain(Shape::Record).is_err());
        assert!(PropKey::Op(SequenceOp::Push).check_plain(Shape::Sequence).is_err());
    }

    #[test]
    fn shift_and_pop_return_removed_items() {
        let mut items = vec![Value::from(1), Value::from(2), Value::from(3)];

        let removed = SequenceCall::Shift.apply(&mut items).unwrap();
        assert_eq!(ints(&removed), [1]);

        let removed = SequenceCall::Pop.apply(&mut items).unwrap();
        assert_eq!(ints(&removed), [3]);
        assert_eq!(ints(&items), [2]);
    }

    #[test]
    fn shift_on_empty_removes_nothing() {
        let mut items = Vec::new();
        assert!(SequenceCall::Shift.apply(&mut items).unwrap().is_empty());
    }

    #[test]
    fn splice_replaces_range() {
        let mut items: Vec<Value> = (1..=5).map(Value::from).collect();
        let removed = SequenceCall::Splice {
            start: 1,
            delete: 2,
            insert: vec![Value::from(9)],
        }
        .apply(&mut items)
        .unwrap();

        assert_eq!(ints(&removed), [2, 3]);
        assert_eq!(ints(&items), [1, 9, 4, 5]);
    }

    #[test]
    fn splice_out_of_bounds_is_an_error() {
        let mut items = vec![Value::from(1)];
        let result = SequenceCall::Splice {
            start: 0,
            delete: 3,
            insert: Vec::new(),
        }
        .apply(&mut items);
        assert!(matches!(
            result,
            Err(Error::RangeOutOfBounds { start: 0, end: 3, len: 1 })
        ));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn unshift_keeps_argument_order() {
        let mut items = vec![Value::from(3)];
        SequenceCall::Unshift(vec![Value::from(1), Value::from(2)])
            .apply(&mut items)
            .unwrap();
        assert_eq!(ints(&items), [1, 2, 3]);
    }

    #[test]
    fn sort_uses_comparator() {
        let mut items: Vec<Value> = [3, 1, 2].into_iter().map(Value::from).collect();
        SequenceCall::Sort(Box::new(|a, b| b.as_i64().cmp(&a.as_i64())))
            .apply(&mut items)
            .unwrap();
        assert_eq!(ints(&items), [3, 2, 1]);
    }
}
