use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::cps::value::{Symbol, Value};
use crate::interpreter::cps::{ErrorKind, Procedure, RuntimeError, PRIMITIVES};

/// One frame of bindings plus a link to the enclosing scope.
///
/// Frames are shared: a closure holds the `Rc` of the frame that was innermost
/// when it was created, so later `define`s into that frame (or any frame
/// above it) are visible through the closure, while frames pushed later by
/// the creator are not.
pub struct Env {
    pub parent: Option<Rc<RefCell<Env>>>,
    pub values: HashMap<String, Value>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.parent {
            Some(ref parent) => write!(f, "<Env {} {:?}>", self.values.len(), parent.borrow()),
            None => write!(f, "<Env global>"),
        }
    }
}

impl Env {
    /// The global frame with every primitive and the boolean literals bound.
    pub fn new_root() -> Rc<RefCell<Env>> {
        let mut env = Env {
            parent: None,
            values: HashMap::new(),
        };
        for (name, f) in PRIMITIVES.entries() {
            env.define(name.to_string(), Value::Procedure(Procedure::Primitive(*f)));
        }
        env.define("#t".to_string(), Value::Boolean(true));
        env.define("#f".to_string(), Value::Boolean(false));
        Rc::new(RefCell::new(env))
    }

    pub fn new_child(parent: Rc<RefCell<Env>>) -> Rc<RefCell<Env>> { Env::extend(parent, HashMap::new()) }

    /// Push `frame` on top of `parent`'s chain.
    pub fn extend(parent: Rc<RefCell<Env>>, frame: HashMap<String, Value>) -> Rc<RefCell<Env>> {
        Rc::new(RefCell::new(Env {
            parent: Some(parent),
            values: frame,
        }))
    }

    // Binds in this frame only; an existing binding here is overwritten.
    pub fn define(&mut self, key: String, value: Value) { self.values.insert(key, value); }

    // Set a variable at the nearest level that has it; no implicit define.
    pub fn set(&mut self, symbol: &Symbol, value: Value) -> Result<(), RuntimeError> {
        match self.values.get_mut(symbol.name()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => match self.parent {
                Some(ref parent) => parent.borrow_mut().set(symbol, value),
                None => Err(unbound(symbol)),
            },
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            Some(val) => Some(val.clone()),
            None => match self.parent {
                Some(ref parent) => parent.borrow().get(key),
                None => None,
            },
        }
    }

    /// Like `get`, but unbound and unassigned names are errors.
    pub fn lookup(&self, symbol: &Symbol) -> Result<Value, RuntimeError> {
        match self.get(symbol.name()) {
            Some(Value::Unassigned) => {
                Err(RuntimeError::new(ErrorKind::UnassignedVariable(symbol.name().to_string())).at(symbol.position()))
            }
            Some(val) => Ok(val),
            None => Err(unbound(symbol)),
        }
    }

    /// Every name visible from this frame, innermost first.
    pub fn identifiers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        if let Some(ref parent) = self.parent {
            names.extend(parent.borrow().identifiers());
        }
        names
    }
}

fn unbound(symbol: &Symbol) -> RuntimeError {
    RuntimeError::new(ErrorKind::UnboundVariable(symbol.name().to_string())).at(symbol.position())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol { Symbol::new(name) }

    #[test]
    fn test_root_has_primitives() {
        let env = Env::new_root();
        assert!(matches!(env.borrow().get("car"), Some(Value::Procedure(_))));
        assert!(matches!(env.borrow().get("call-with-current-continuation"), Some(Value::Procedure(_))));
        assert_eq!(env.borrow().get("#t"), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_define_overwrites_innermost() {
        let root = Env::new_root();
        let child = Env::new_child(root.clone());
        root.borrow_mut().define("x".into(), Value::integer(1));
        child.borrow_mut().define("x".into(), Value::integer(2));
        child.borrow_mut().define("x".into(), Value::integer(3));
        assert_eq!(child.borrow().lookup(&sym("x")).unwrap(), Value::integer(3));
        assert_eq!(root.borrow().lookup(&sym("x")).unwrap(), Value::integer(1));
    }

    #[test]
    fn test_set_mutates_nearest() {
        let root = Env::new_root();
        root.borrow_mut().define("x".into(), Value::integer(1));
        let child = Env::new_child(root.clone());
        child.borrow_mut().set(&sym("x"), Value::integer(5)).unwrap();
        assert_eq!(root.borrow().lookup(&sym("x")).unwrap(), Value::integer(5));
        assert!(child.borrow().values.is_empty());

        let err = child.borrow_mut().set(&sym("nope"), Value::integer(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnboundVariable("nope".to_string()));
        assert!(root.borrow().get("nope").is_none());
    }

    #[test]
    fn test_unbound_vs_unassigned() {
        let root = Env::new_root();
        let frame = HashMap::from([("pending".to_string(), Value::Unassigned)]);
        let env = Env::extend(root, frame);
        let err = env.borrow().lookup(&sym("pending")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnassignedVariable("pending".to_string()));
        let err = env.borrow().lookup(&sym("missing")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnboundVariable("missing".to_string()));

        env.borrow_mut().define("pending".into(), Value::integer(7));
        assert_eq!(env.borrow().lookup(&sym("pending")).unwrap(), Value::integer(7));
    }

    #[test]
    fn test_shared_frames() {
        let root = Env::new_root();
        let scope = Env::new_child(root.clone());
        // what a closure created in `scope` would capture
        let captured = scope.clone();
        let later = Env::new_child(scope.clone());
        later.borrow_mut().define("hidden".into(), Value::integer(1));
        scope.borrow_mut().define("visible".into(), Value::integer(2));

        assert!(captured.borrow().get("hidden").is_none());
        assert_eq!(captured.borrow().get("visible"), Some(Value::integer(2)));
    }

    #[test]
    fn test_lookup_reports_position() {
        let root = Env::new_root();
        let pos = crate::reader::Position { line: 4, column: 2 };
        let err = root.borrow().lookup(&Symbol::with_position("zzz", pos)).unwrap_err();
        assert_eq!(err.position, Some(pos));
    }
}
