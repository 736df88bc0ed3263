use std::fmt;
use std::io::{self, Write};

use num_traits::ToPrimitive;
use phf::phf_map;

use crate::interpreter::cps::list::{self, ListShape};
use crate::interpreter::cps::number::{self, Arithmetic, Comparison, IntegerDivision};
use crate::interpreter::cps::{RuntimeError, Value};
use crate::runtime_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Quotient,
    Remainder,
    Modulo,
    Abs,
    IsZero,
    IsOdd,
    IsEven,
    IsNumber,
    IsInteger,
    IsReal,
    Lt,
    Gt,
    NumEq,
    Le,
    Ge,
    Cons,
    Car,
    Cdr,
    SetCar,
    SetCdr,
    List,
    IsList,
    IsNull,
    Length,
    ListRef,
    Append,
    IsPair,
    IsSymbol,
    IsString,
    IsBoolean,
    IsProcedure,
    Not,
    IsEq,
    IsEqual,
    Display,
    Write,
    Newline,
    // control primitives, applied by the evaluator itself
    Eval,
    CallCC,
    Apply,
}

pub static PRIMITIVES: phf::Map<&'static str, Primitive> = phf_map! {
    "+" => Primitive::Add,
    "-" => Primitive::Sub,
    "*" => Primitive::Mul,
    "/" => Primitive::Div,
    "min" => Primitive::Min,
    "max" => Primitive::Max,
    "quotient" => Primitive::Quotient,
    "remainder" => Primitive::Remainder,
    "modulo" => Primitive::Modulo,
    "abs" => Primitive::Abs,
    "zero?" => Primitive::IsZero,
    "odd?" => Primitive::IsOdd,
    "even?" => Primitive::IsEven,
    "number?" => Primitive::IsNumber,
    "integer?" => Primitive::IsInteger,
    "real?" => Primitive::IsReal,
    "<" => Primitive::Lt,
    ">" => Primitive::Gt,
    "=" => Primitive::NumEq,
    "<=" => Primitive::Le,
    ">=" => Primitive::Ge,
    "cons" => Primitive::Cons,
    "car" => Primitive::Car,
    "cdr" => Primitive::Cdr,
    "set-car!" => Primitive::SetCar,
    "set-cdr!" => Primitive::SetCdr,
    "list" => Primitive::List,
    "list?" => Primitive::IsList,
    "null?" => Primitive::IsNull,
    "length" => Primitive::Length,
    "list-ref" => Primitive::ListRef,
    "append" => Primitive::Append,
    "pair?" => Primitive::IsPair,
    "symbol?" => Primitive::IsSymbol,
    "string?" => Primitive::IsString,
    "boolean?" => Primitive::IsBoolean,
    "procedure?" => Primitive::IsProcedure,
    "not" => Primitive::Not,
    "eq?" => Primitive::IsEq,
    "equal?" => Primitive::IsEqual,
    "display" => Primitive::Display,
    "write" => Primitive::Write,
    "newline" => Primitive::Newline,
    "eval" => Primitive::Eval,
    "call/cc" => Primitive::CallCC,
    "call-with-current-continuation" => Primitive::CallCC,
    "apply" => Primitive::Apply,
};

/// Accepted operand counts: `min..=max`, unbounded when `max` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub fn exactly(n: usize) -> Arity { Arity { min: n, max: Some(n) } }

    pub fn at_least(n: usize) -> Arity { Arity { min: n, max: None } }

    pub fn between(min: usize, max: usize) -> Arity { Arity { min, max: Some(max) } }

    pub fn accepts(&self, given: usize) -> bool { given >= self.min && self.max.map_or(true, |max| given <= max) }

    pub fn check(&self, who: &str, given: usize) -> Result<(), RuntimeError> {
        if !self.accepts(given) {
            runtime_error!(ArityMismatch, "{} expects {}, but was given {}", who, self, given)
        }
        Ok(())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "argument"
    } else {
        "arguments"
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{} {}", max, plural(max)),
            Some(max) => write!(f, "between {} and {} arguments", self.min, max),
            None => write!(f, "at least {} {}", self.min, plural(self.min)),
        }
    }
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Add => "+",
            Primitive::Sub => "-",
            Primitive::Mul => "*",
            Primitive::Div => "/",
            Primitive::Min => "min",
            Primitive::Max => "max",
            Primitive::Quotient => "quotient",
            Primitive::Remainder => "remainder",
            Primitive::Modulo => "modulo",
            Primitive::Abs => "abs",
            Primitive::IsZero => "zero?",
            Primitive::IsOdd => "odd?",
            Primitive::IsEven => "even?",
            Primitive::IsNumber => "number?",
            Primitive::IsInteger => "integer?",
            Primitive::IsReal => "real?",
            Primitive::Lt => "<",
            Primitive::Gt => ">",
            Primitive::NumEq => "=",
            Primitive::Le => "<=",
            Primitive::Ge => ">=",
            Primitive::Cons => "cons",
            Primitive::Car => "car",
            Primitive::Cdr => "cdr",
            Primitive::SetCar => "set-car!",
            Primitive::SetCdr => "set-cdr!",
            Primitive::List => "list",
            Primitive::IsList => "list?",
            Primitive::IsNull => "null?",
            Primitive::Length => "length",
            Primitive::ListRef => "list-ref",
            Primitive::Append => "append",
            Primitive::IsPair => "pair?",
            Primitive::IsSymbol => "symbol?",
            Primitive::IsString => "string?",
            Primitive::IsBoolean => "boolean?",
            Primitive::IsProcedure => "procedure?",
            Primitive::Not => "not",
            Primitive::IsEq => "eq?",
            Primitive::IsEqual => "equal?",
            Primitive::Display => "display",
            Primitive::Write => "write",
            Primitive::Newline => "newline",
            Primitive::Eval => "eval",
            Primitive::CallCC => "call/cc",
            Primitive::Apply => "apply",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Primitive::Add | Primitive::Mul | Primitive::List | Primitive::Append => Arity::at_least(0),
            Primitive::Lt | Primitive::Gt | Primitive::NumEq | Primitive::Le | Primitive::Ge => Arity::at_least(0),
            Primitive::Sub | Primitive::Div => Arity::at_least(1),
            Primitive::Min | Primitive::Max | Primitive::Apply => Arity::at_least(2),
            Primitive::Quotient
            | Primitive::Remainder
            | Primitive::Modulo
            | Primitive::Cons
            | Primitive::SetCar
            | Primitive::SetCdr
            | Primitive::ListRef
            | Primitive::IsEq
            | Primitive::IsEqual => Arity::exactly(2),
            Primitive::Newline => Arity::exactly(0),
            _ => Arity::exactly(1),
        }
    }
}

fn unpack1(args: Vec<Value>) -> Value { args.into_iter().next().unwrap_or(Value::Unassigned) }

fn unpack2(args: Vec<Value>) -> (Value, Value) {
    let mut iter = args.into_iter();
    let first = iter.next().unwrap_or(Value::Unassigned);
    let second = iter.next().unwrap_or(Value::Unassigned);
    (first, second)
}

fn flush_stdout() {
    // output errors (closed pipe) are not evaluation errors
    let _ = io::stdout().flush();
}

/// Runs a strict primitive on evaluated operands whose count was already checked.
pub fn primitive(f: Primitive, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let name = f.name();
    match f {
        Primitive::Add => number::accumulate(name, Arithmetic::Add, args),
        Primitive::Sub => number::accumulate(name, Arithmetic::Sub, args),
        Primitive::Mul => number::accumulate(name, Arithmetic::Mul, args),
        Primitive::Div => number::accumulate(name, Arithmetic::Div, args),
        Primitive::Min => number::accumulate(name, Arithmetic::Min, args),
        Primitive::Max => number::accumulate(name, Arithmetic::Max, args),
        Primitive::Lt => number::compare(name, Comparison::Lt, args),
        Primitive::Gt => number::compare(name, Comparison::Gt, args),
        Primitive::NumEq => number::compare(name, Comparison::Eq, args),
        Primitive::Le => number::compare(name, Comparison::Le, args),
        Primitive::Ge => number::compare(name, Comparison::Ge, args),
        Primitive::Quotient | Primitive::Remainder | Primitive::Modulo => {
            let op = match f {
                Primitive::Quotient => IntegerDivision::Quotient,
                Primitive::Remainder => IntegerDivision::Remainder,
                _ => IntegerDivision::Modulo,
            };
            let (n, d) = unpack2(args);
            number::integer_division(name, op, n, d)
        }
        Primitive::Abs => number::abs(name, unpack1(args)),
        Primitive::IsZero => Ok(Value::Boolean(number::is_zero(name, unpack1(args))?)),
        Primitive::IsEven => Ok(Value::Boolean(number::is_even(name, unpack1(args))?)),
        Primitive::IsOdd => Ok(Value::Boolean(!number::is_even(name, unpack1(args))?)),
        Primitive::IsNumber => Ok(Value::Boolean(unpack1(args).is_number())),
        Primitive::IsInteger => Ok(Value::Boolean(matches!(unpack1(args), Value::Integer(_)))),
        Primitive::IsReal => Ok(Value::Boolean(matches!(unpack1(args), Value::Double(_)))),
        Primitive::Cons => {
            let (car, cdr) = unpack2(args);
            Ok(Value::cons(car, cdr))
        }
        Primitive::Car => match unpack1(args) {
            Value::Pair(pair) => Ok(pair.car()),
            val => runtime_error!(IllegalDatum, "car: expects a pair, but was given {}", val),
        },
        Primitive::Cdr => match unpack1(args) {
            Value::Pair(pair) => Ok(pair.cdr()),
            val => runtime_error!(IllegalDatum, "cdr: expects a pair, but was given {}", val),
        },
        Primitive::SetCar | Primitive::SetCdr => {
            let (target, val) = unpack2(args);
            let pair = match target {
                Value::Pair(pair) => pair,
                _ => runtime_error!(TypeError, "{}: first argument must be a pair, but was given {}", name, target),
            };
            if f == Primitive::SetCar {
                pair.set_car(val);
            } else {
                pair.set_cdr(val);
            }
            Ok(Value::Unassigned)
        }
        Primitive::List => Ok(list::from_vec(args)),
        Primitive::IsList => Ok(Value::Boolean(list::is_proper(&unpack1(args)))),
        Primitive::IsNull => Ok(Value::Boolean(matches!(unpack1(args), Value::EmptyList))),
        Primitive::IsPair => Ok(Value::Boolean(matches!(unpack1(args), Value::Pair(_)))),
        Primitive::Length => {
            let val = unpack1(args);
            match list::shape(&val) {
                ListShape::Proper(len) => Ok(Value::integer(len as u64)),
                _ => runtime_error!(TypeError, "length: argument must be a proper list, but was given {}", val),
            }
        }
        Primitive::ListRef => {
            let (target, index) = unpack2(args);
            let elements = list::to_vec(name, &target)?;
            let index = match index {
                Value::Integer(n) => n,
                _ => runtime_error!(TypeError, "list-ref: index must be an integer, but was given {}", index),
            };
            match index.to_usize().and_then(|i| elements.get(i)) {
                Some(val) => Ok(val.clone()),
                None => runtime_error!(IndexOutOfRange, "list-ref: {} for a list of length {}", index, elements.len()),
            }
        }
        Primitive::Append => {
            let mut args = args;
            let tail = args.pop().unwrap_or(Value::EmptyList);
            let mut elements = Vec::new();
            for arg in args.iter() {
                elements.extend(list::to_vec(name, arg)?);
            }
            Ok(list::from_vec_with_tail(elements, tail, None))
        }
        Primitive::IsSymbol => Ok(Value::Boolean(matches!(unpack1(args), Value::Symbol(_)))),
        Primitive::IsString => Ok(Value::Boolean(matches!(unpack1(args), Value::String(_)))),
        Primitive::IsBoolean => Ok(Value::Boolean(matches!(unpack1(args), Value::Boolean(_)))),
        Primitive::IsProcedure => Ok(Value::Boolean(unpack1(args).is_procedure())),
        Primitive::Not => Ok(Value::Boolean(!unpack1(args).is_true())),
        Primitive::IsEq => {
            let (a, b) = unpack2(args);
            Ok(Value::Boolean(a.is_eq(&b)))
        }
        Primitive::IsEqual => {
            let (a, b) = unpack2(args);
            Ok(Value::Boolean(a == b))
        }
        Primitive::Display => {
            print!("{}", unpack1(args));
            flush_stdout();
            Ok(Value::Unassigned)
        }
        Primitive::Write => {
            print!("{:?}", unpack1(args));
            flush_stdout();
            Ok(Value::Unassigned)
        }
        Primitive::Newline => {
            println!();
            Ok(Value::Unassigned)
        }
        Primitive::Eval | Primitive::CallCC | Primitive::Apply => {
            runtime_error!(NotApplicable, "{} can only be applied by the evaluator", name)
        }
    }
}
