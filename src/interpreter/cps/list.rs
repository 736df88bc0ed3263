use std::rc::Rc;

use crate::interpreter::cps::value::{Pair, Value};
use crate::interpreter::cps::RuntimeError;
use crate::reader::Position;
use crate::runtime_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    /// Ends in the empty list; carries the number of pairs.
    Proper(usize),
    /// Ends in something other than the empty list.
    Improper,
    Circular,
}

pub fn from_vec(values: Vec<Value>) -> Value { from_vec_with_tail(values, Value::EmptyList, None) }

/// Builds `(v0 v1 ... . tail)`; the head pair remembers `position`.
pub fn from_vec_with_tail(values: Vec<Value>, tail: Value, position: Option<Position>) -> Value {
    let count = values.len();
    values.into_iter().enumerate().rev().fold(tail, |acc, (i, val)| {
        let position = if i == 0 && count > 0 { position } else { None };
        Value::Pair(Rc::new(Pair::with_position(val, acc, position)))
    })
}

// Floyd's tortoise and hare over the cdr chain.
pub fn shape(value: &Value) -> ListShape {
    let mut slow = value.clone();
    let mut fast = value.clone();
    let mut len = 0;
    loop {
        for _ in 0..2 {
            fast = match fast {
                Value::EmptyList => return ListShape::Proper(len),
                Value::Pair(ref pair) => {
                    len += 1;
                    pair.cdr()
                }
                _ => return ListShape::Improper,
            };
        }
        slow = match slow {
            Value::Pair(ref pair) => pair.cdr(),
            other => other,
        };
        if let (Value::Pair(a), Value::Pair(b)) = (&slow, &fast) {
            if Rc::ptr_eq(a, b) {
                return ListShape::Circular;
            }
        }
    }
}

pub fn is_proper(value: &Value) -> bool { matches!(shape(value), ListShape::Proper(_)) }

/// Iterates the cars of a cdr chain until it stops being a pair.
/// Check the shape first when the chain may be circular.
pub struct ListIterator {
    current: Value,
}

impl Iterator for ListIterator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let (car, cdr) = match self.current {
            Value::Pair(ref pair) => (pair.car(), pair.cdr()),
            _ => return None,
        };
        self.current = cdr;
        Some(car)
    }
}

pub fn iter(value: &Value) -> ListIterator { ListIterator { current: value.clone() } }

/// The elements of a proper list, or a `TypeError` naming `who`.
pub fn to_vec(who: &str, value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match shape(value) {
        ListShape::Proper(len) => {
            let mut out = Vec::with_capacity(len);
            out.extend(iter(value));
            Ok(out)
        }
        _ => runtime_error!(TypeError, "{}: argument must be a proper list, but was given {}", who, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(ns: &[i64]) -> Value { from_vec(ns.iter().map(|n| Value::integer(*n)).collect()) }

    #[test]
    fn test_shapes() {
        assert_eq!(shape(&Value::EmptyList), ListShape::Proper(0));
        assert_eq!(shape(&ints(&[1, 2, 3])), ListShape::Proper(3));
        assert_eq!(shape(&ints(&[1, 2, 3, 4])), ListShape::Proper(4));
        assert_eq!(shape(&Value::cons(Value::integer(1), Value::integer(2))), ListShape::Improper);
        assert_eq!(shape(&Value::integer(1)), ListShape::Improper);
    }

    #[test]
    fn test_circular() {
        for len in 1..6 {
            let list = ints(&vec![0; len]);
            let mut last = list.clone();
            while let Value::Pair(ref pair) = last {
                let next = pair.cdr();
                if next == Value::EmptyList {
                    break;
                }
                last = next;
            }
            let Value::Pair(ref tail) = last else { panic!("expected a pair") };
            tail.set_cdr(list.clone());
            assert_eq!(shape(&list), ListShape::Circular, "cycle of length {}", len);
            assert!(to_vec("length", &list).is_err());
            tail.set_cdr(Value::EmptyList);
        }
    }

    #[test]
    fn test_tail_and_position() {
        let pos = Position { line: 2, column: 4 };
        let list = from_vec_with_tail(vec![Value::integer(1), Value::integer(2)], Value::integer(3), Some(pos));
        assert_eq!(list.to_string(), "(1 2 . 3)");
        let Value::Pair(ref head) = list else { panic!("expected a pair") };
        assert_eq!(head.position(), Some(pos));
        assert_eq!(from_vec_with_tail(vec![], Value::integer(3), Some(pos)), Value::integer(3));
    }

    #[test]
    fn test_to_vec() {
        assert_eq!(to_vec("length", &ints(&[4, 5])).unwrap(), vec![Value::integer(4), Value::integer(5)]);
        assert_eq!(to_vec("length", &Value::EmptyList).unwrap(), vec![]);
        assert!(to_vec("length", &Value::cons(Value::integer(1), Value::integer(2))).is_err());
    }
}
