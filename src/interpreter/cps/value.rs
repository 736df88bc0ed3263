use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::interpreter::cps::list::{self, ListShape};
use crate::interpreter::cps::{Arity, Cont, Env, Primitive, RuntimeError, SpecialForm};
use crate::reader::Position;
use crate::runtime_error;

/// A shared, immutable run of expressions: combination parts and bodies.
pub type Exprs = Rc<[Value]>;

#[derive(Clone)]
pub struct Symbol {
    name: Rc<str>,
    position: Option<Position>,
}

impl Symbol {
    pub fn new(name: &str) -> Symbol { Symbol { name: name.into(), position: None } }

    pub fn with_position(name: &str, position: Position) -> Symbol {
        Symbol {
            name: name.into(),
            position: Some(position),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn position(&self) -> Option<Position> { self.position }
}

// symbols are identified by name, never by where they were read
impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool { self.name == other.name }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.name) }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.name) }
}

/// A mutable cons cell.
pub struct Pair {
    car: RefCell<Value>,
    cdr: RefCell<Value>,
    position: Option<Position>,
}

impl Pair {
    pub fn new(car: Value, cdr: Value) -> Pair { Pair::with_position(car, cdr, None) }

    pub fn with_position(car: Value, cdr: Value, position: Option<Position>) -> Pair {
        Pair {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
            position,
        }
    }

    pub fn car(&self) -> Value { self.car.borrow().clone() }

    pub fn cdr(&self) -> Value { self.cdr.borrow().clone() }

    pub fn set_car(&self, val: Value) { *self.car.borrow_mut() = val; }

    pub fn set_cdr(&self, val: Value) { *self.cdr.borrow_mut() = val; }

    /// Where the list starting at this pair was read, if it came from source.
    pub fn position(&self) -> Option<Position> { self.position }
}

// Unlink the cdr chain iteratively so long lists don't recurse on drop.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut next = std::mem::replace(self.cdr.get_mut(), Value::EmptyList);
        while let Value::Pair(pair) = next {
            match Rc::try_unwrap(pair) {
                Ok(mut pair) => next = std::mem::replace(pair.cdr.get_mut(), Value::EmptyList),
                Err(_) => break,
            }
        }
    }
}

/// An application node: `exprs[0]` is the operator.
pub struct Combination {
    pub exprs: Exprs,
    pub position: Option<Position>,
}

impl Combination {
    pub fn operands(&self) -> &[Value] { self.exprs.get(1..).unwrap_or(&[]) }
}

pub struct Lambda {
    pub name: Option<Rc<str>>,
    pub formals: Vec<Symbol>,
    /// The last formal collects surplus arguments.
    pub dotted: bool,
    pub body: Exprs,
}

impl Lambda {
    pub fn arity(&self) -> Arity {
        if self.dotted {
            Arity::at_least(self.formals.len() - 1)
        } else {
            Arity::exactly(self.formals.len())
        }
    }
}

pub struct Closure {
    pub lambda: Rc<Lambda>,
    pub env: Rc<RefCell<Env>>,
}

#[derive(Clone)]
pub enum Procedure {
    Primitive(Primitive),
    Closure(Rc<Closure>),
    Continuation(Rc<Cont>),
}

impl Procedure {
    pub fn arity(&self) -> Arity {
        match self {
            Procedure::Primitive(f) => f.arity(),
            Procedure::Closure(closure) => closure.lambda.arity(),
            Procedure::Continuation(_) => Arity::between(0, 1),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Procedure::Primitive(f) => f.name().to_string(),
            Procedure::Closure(closure) => match closure.lambda.name {
                Some(ref name) => name.to_string(),
                None => "anonymous".to_string(),
            },
            Procedure::Continuation(_) => "continuation".to_string(),
        }
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(a), Procedure::Primitive(b)) => a == b,
            (Procedure::Closure(a), Procedure::Closure(b)) => Rc::ptr_eq(a, b),
            (Procedure::Continuation(a), Procedure::Continuation(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Source syntax and runtime data share this one type.
#[derive(Clone)]
pub enum Value {
    Symbol(Symbol),
    Integer(BigInt),
    Double(f64),
    Boolean(bool),
    String(Rc<str>),
    EmptyList,
    Unassigned,
    Pair(Rc<Pair>),
    Combination(Rc<Combination>),
    SpecialForm(Rc<SpecialForm>),
    Procedure(Procedure),
}

impl Value {
    pub fn from_vec(values: Vec<Value>) -> Value { list::from_vec(values) }

    pub fn cons(car: Value, cdr: Value) -> Value { Value::Pair(Rc::new(Pair::new(car, cdr))) }

    pub fn symbol(name: &str) -> Value { Value::Symbol(Symbol::new(name)) }

    pub fn integer<T: Into<BigInt>>(n: T) -> Value { Value::Integer(n.into()) }

    pub fn string(s: &str) -> Value { Value::String(s.into()) }

    /// Only `#f` is false.
    pub fn is_true(&self) -> bool { !matches!(self, Value::Boolean(false)) }

    pub fn is_number(&self) -> bool { matches!(self, Value::Integer(_) | Value::Double(_)) }

    pub fn is_procedure(&self) -> bool { matches!(self, Value::Procedure(_)) }

    pub fn into_integer(self) -> Result<BigInt, RuntimeError> {
        match self {
            Value::Integer(n) => Ok(n),
            _ => runtime_error!(TypeError, "Argument must be an integer, but was given {}", self),
        }
    }

    /// Identity for pairs, procedures and syntax nodes; value equality for atoms.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Combination(a), Value::Combination(b)) => Rc::ptr_eq(a, b),
            (Value::SpecialForm(a), Value::SpecialForm(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::EmptyList, Value::EmptyList) => true,
            (Value::Unassigned, Value::Unassigned) => true,
            (Value::Pair(_), Value::Pair(_)) => pairs_equal(self, other),
            (Value::Combination(a), Value::Combination(b)) => Rc::ptr_eq(a, b),
            (Value::SpecialForm(a), Value::SpecialForm(b)) => Rc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => a == b,
            _ => false,
        }
    }
}

// Walks the cdr chains side by side; cars compare recursively.
fn pairs_equal(a: &Value, b: &Value) -> bool {
    let (mut a, mut b) = (a.clone(), b.clone());
    loop {
        let (next_a, next_b) = match (&a, &b) {
            (Value::Pair(x), Value::Pair(y)) => {
                if Rc::ptr_eq(x, y) {
                    return true;
                }
                if x.car() != y.car() {
                    return false;
                }
                (x.cdr(), y.cdr())
            }
            _ => return a == b,
        };
        a = next_a;
        b = next_b;
    }
}

pub fn format_double(x: f64) -> String {
    if x.is_nan() {
        "+nan.0".to_string()
    } else if x.is_infinite() {
        (if x > 0.0 { "+inf.0" } else { "-inf.0" }).to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

struct Printer {
    // pairs currently being printed, to cut car-cycles short
    open: Vec<*const Pair>,
    quoted: bool,
}

impl Printer {
    fn write(&mut self, f: &mut fmt::Formatter, value: &Value) -> fmt::Result {
        match value {
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Double(x) => write!(f, "{}", format_double(*x)),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::String(s) if self.quoted => write!(f, "{:?}", s),
            Value::String(s) => write!(f, "{}", s),
            Value::EmptyList => write!(f, "()"),
            Value::Unassigned => write!(f, "#[unassigned]"),
            Value::Pair(pair) => self.write_pair(f, pair),
            Value::Combination(c) => {
                write!(f, "(")?;
                for (i, expr) in c.exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    self.write(f, expr)?;
                }
                write!(f, ")")
            }
            Value::SpecialForm(form) => write!(f, "#[special-form {}]", form.keyword()),
            Value::Procedure(Procedure::Primitive(p)) => write!(f, "#[primitive-procedure {}]", p.name()),
            Value::Procedure(Procedure::Closure(closure)) => match closure.lambda.name {
                Some(ref name) => write!(f, "#[compound-procedure {}]", name),
                None => write!(f, "#[compound-procedure anonymous]"),
            },
            Value::Procedure(Procedure::Continuation(_)) => write!(f, "#[continuation]"),
        }
    }

    fn write_pair(&mut self, f: &mut fmt::Formatter, pair: &Rc<Pair>) -> fmt::Result {
        let head = Value::Pair(pair.clone());
        if list::shape(&head) == ListShape::Circular || self.open.contains(&Rc::as_ptr(pair)) {
            return write!(f, "#[circular list]");
        }
        self.open.push(Rc::as_ptr(pair));
        write!(f, "(")?;
        let mut current = head;
        let mut first = true;
        loop {
            match current {
                Value::Pair(ref p) => {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    self.write(f, &p.car())?;
                    let next = p.cdr();
                    current = next;
                }
                Value::EmptyList => break,
                ref tail => {
                    write!(f, " . ")?;
                    self.write(f, tail)?;
                    break;
                }
            }
        }
        self.open.pop();
        write!(f, ")")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { Printer { open: vec![], quoted: false }.write(f, self) }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { Printer { open: vec![], quoted: true }.write(f, self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(ns: &[i64]) -> Value { Value::from_vec(ns.iter().map(|n| Value::integer(*n)).collect()) }

    #[test]
    fn test_truthiness() {
        assert!(Value::integer(0).is_true());
        assert!(Value::EmptyList.is_true());
        assert!(Value::Boolean(true).is_true());
        assert!(!Value::Boolean(false).is_true());
    }

    #[test]
    fn test_display() {
        assert_eq!(ints(&[1, 2, 3]).to_string(), "(1 2 3)");
        assert_eq!(Value::cons(Value::integer(1), Value::integer(2)).to_string(), "(1 . 2)");
        assert_eq!(Value::Double(3.0).to_string(), "3.0");
        assert_eq!(Value::Double(3.5).to_string(), "3.5");
        assert_eq!(Value::Double(f64::INFINITY).to_string(), "+inf.0");
        assert_eq!(Value::string("hi").to_string(), "hi");
        assert_eq!(format!("{:?}", Value::string("hi")), "\"hi\"");
        assert_eq!(Value::EmptyList.to_string(), "()");
        assert_eq!(Value::from_vec(vec![ints(&[1]), Value::EmptyList]).to_string(), "((1) ())");
    }

    #[test]
    fn test_display_circular() {
        let list = ints(&[1, 2]);
        let Value::Pair(ref head) = list else { panic!("expected a pair") };
        let Value::Pair(second) = head.cdr() else { panic!("expected a pair") };
        second.set_cdr(list.clone());
        assert_eq!(list.to_string(), "#[circular list]");
        head.set_car(list.clone());
        second.set_cdr(Value::EmptyList);
        assert_eq!(list.to_string(), "(#[circular list] 2)");
        // break the cycle so the test doesn't leak
        head.set_car(Value::EmptyList);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(ints(&[1, 2, 3]), ints(&[1, 2, 3]));
        assert_ne!(ints(&[1, 2, 3]), ints(&[1, 2]));
        assert_ne!(Value::integer(2), Value::Double(2.0));
        assert_eq!(Value::symbol("a"), Value::Symbol(Symbol::with_position("a", Position { line: 1, column: 1 })));
    }

    #[test]
    fn test_eq_is_identity_for_pairs() {
        let a = ints(&[1]);
        assert!(a.is_eq(&a.clone()));
        assert!(!a.is_eq(&ints(&[1])));
        assert!(Value::integer(5).is_eq(&Value::integer(5)));
    }

    #[test]
    fn test_long_list_drop() {
        let list = Value::from_vec((0..200_000).map(Value::integer).collect());
        drop(list);
    }
}
