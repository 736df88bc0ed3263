use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::interpreter::cps::{RuntimeError, Value};
use crate::runtime_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
    Eq,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerDivision {
    Quotient,
    Remainder,
    Modulo,
}

/// Operands after contagion: all integers, or all doubles.
#[derive(Debug, PartialEq)]
pub enum Operands {
    Integers(Vec<BigInt>),
    Doubles(Vec<f64>),
}

fn to_double(n: &BigInt) -> f64 { n.to_f64().unwrap_or(f64::NAN) }

/// Applies the contagion rule: one double operand turns every integer into a double.
pub fn promote(who: &str, args: Vec<Value>) -> Result<Operands, RuntimeError> {
    let mut any_double = false;
    for arg in args.iter() {
        match arg {
            Value::Integer(_) => (),
            Value::Double(_) => any_double = true,
            _ => runtime_error!(TypeError, "{}: expects numbers as arguments, but was given {}", who, arg),
        }
    }
    let operands = if any_double {
        Operands::Doubles(
            args.into_iter()
                .map(|arg| match arg {
                    Value::Integer(n) => to_double(&n),
                    Value::Double(x) => x,
                    _ => f64::NAN,
                })
                .collect(),
        )
    } else {
        Operands::Integers(args.into_iter().filter_map(|arg| arg.into_integer().ok()).collect())
    };
    Ok(operands)
}

trait Numeric: Sized + PartialOrd {
    fn zero() -> Self;
    fn one() -> Self;
    /// `op(next, acc)`: the operand being folded in comes first.
    fn combine(op: Arithmetic, next: Self, acc: Self) -> Result<Self, RuntimeError>;
    fn into_value(self) -> Value;
}

impl Numeric for BigInt {
    fn zero() -> Self { <BigInt as Zero>::zero() }

    fn one() -> Self { BigInt::from(1) }

    fn combine(op: Arithmetic, next: Self, acc: Self) -> Result<Self, RuntimeError> {
        Ok(match op {
            Arithmetic::Add => acc + next,
            Arithmetic::Sub => acc - next,
            Arithmetic::Mul => acc * next,
            Arithmetic::Div => {
                if next.is_zero() {
                    runtime_error!(DivisionByZero, "/ {} by 0", acc)
                }
                acc / next
            }
            Arithmetic::Min => acc.min(next),
            Arithmetic::Max => acc.max(next),
        })
    }

    fn into_value(self) -> Value { Value::Integer(self) }
}

impl Numeric for f64 {
    fn zero() -> Self { 0.0 }

    fn one() -> Self { 1.0 }

    fn combine(op: Arithmetic, next: Self, acc: Self) -> Result<Self, RuntimeError> {
        Ok(match op {
            Arithmetic::Add => acc + next,
            Arithmetic::Sub => acc - next,
            Arithmetic::Mul => acc * next,
            Arithmetic::Div => acc / next,
            Arithmetic::Min => acc.min(next),
            Arithmetic::Max => acc.max(next),
        })
    }

    fn into_value(self) -> Value { Value::Double(self) }
}

fn fold<T: Numeric>(who: &str, op: Arithmetic, mut operands: Vec<T>) -> Result<Value, RuntimeError> {
    let init = match op {
        Arithmetic::Add => T::zero(),
        Arithmetic::Mul => T::one(),
        Arithmetic::Sub | Arithmetic::Div => {
            if operands.is_empty() {
                runtime_error!(ArityMismatch, "{} expects at least 1 argument", who)
            }
            if operands.len() == 1 {
                if op == Arithmetic::Sub { T::zero() } else { T::one() }
            } else {
                operands.remove(0)
            }
        }
        Arithmetic::Min | Arithmetic::Max => {
            if operands.len() < 2 {
                runtime_error!(ArityMismatch, "{} expects at least 2 arguments", who)
            }
            operands.remove(0)
        }
    };
    operands
        .into_iter()
        .try_fold(init, |acc, next| T::combine(op, next, acc))
        .map(T::into_value)
}

/// Variadic `+ - * / min max` over already-evaluated operands.
pub fn accumulate(who: &str, op: Arithmetic, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match promote(who, args)? {
        Operands::Integers(ns) => fold(who, op, ns),
        Operands::Doubles(xs) => fold(who, op, xs),
    }
}

fn chain<T: PartialOrd>(op: Comparison, operands: &[T]) -> bool {
    operands.windows(2).all(|w| match op {
        Comparison::Lt => w[0] < w[1],
        Comparison::Gt => w[0] > w[1],
        Comparison::Eq => w[0] == w[1],
        Comparison::Le => w[0] <= w[1],
        Comparison::Ge => w[0] >= w[1],
    })
}

/// Chained comparison: true when every adjacent pair satisfies `op`.
pub fn compare(who: &str, op: Comparison, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let holds = match promote(who, args)? {
        Operands::Integers(ns) => chain(op, &ns),
        Operands::Doubles(xs) => chain(op, &xs),
    };
    Ok(Value::Boolean(holds))
}

fn integer_operand(who: &str, arg: Value) -> Result<BigInt, RuntimeError> {
    match arg {
        Value::Integer(n) => Ok(n),
        _ => runtime_error!(TypeError, "{}: argument must be an integer, but was given {}", who, arg),
    }
}

pub fn integer_division(who: &str, op: IntegerDivision, n: Value, d: Value) -> Result<Value, RuntimeError> {
    let n = integer_operand(who, n)?;
    let d = integer_operand(who, d)?;
    if d.is_zero() {
        runtime_error!(DivisionByZero, "{} {} by 0", who, n)
    }
    let result = match op {
        IntegerDivision::Quotient => &n / &d,
        IntegerDivision::Remainder => &n % &d,
        IntegerDivision::Modulo => {
            // the sign test is on the operands, so an exact division by a
            // divisor of the other sign still yields `d`
            let r = &n % &d;
            if n.is_negative() != d.is_negative() {
                r + d
            } else {
                r
            }
        }
    };
    Ok(Value::Integer(result))
}

pub fn is_even(who: &str, arg: Value) -> Result<bool, RuntimeError> {
    let n = integer_operand(who, arg)?;
    Ok((n % BigInt::from(2)).is_zero())
}

pub fn abs(who: &str, arg: Value) -> Result<Value, RuntimeError> {
    match arg {
        Value::Integer(n) => Ok(Value::Integer(n.abs())),
        Value::Double(x) => Ok(Value::Double(x.abs())),
        _ => runtime_error!(TypeError, "{}: expects a number, but was given {}", who, arg),
    }
}

pub fn is_zero(who: &str, arg: Value) -> Result<bool, RuntimeError> {
    match arg {
        Value::Integer(n) => Ok(n.is_zero()),
        Value::Double(x) => Ok(x == 0.0),
        _ => runtime_error!(TypeError, "{}: expects a number, but was given {}", who, arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::cps::ErrorKind;

    fn int(n: i64) -> Value { Value::integer(n) }

    #[test]
    fn test_contagion() {
        assert_eq!(accumulate("+", Arithmetic::Add, vec![int(1), Value::Double(2.0)]).unwrap(), Value::Double(3.0));
        assert_eq!(accumulate("+", Arithmetic::Add, vec![int(1), int(2)]).unwrap(), int(3));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![int(7), int(2)]).unwrap(), int(3));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![Value::Double(7.0), int(2)]).unwrap(), Value::Double(3.5));
    }

    #[test]
    fn test_identities() {
        assert_eq!(accumulate("+", Arithmetic::Add, vec![]).unwrap(), int(0));
        assert_eq!(accumulate("*", Arithmetic::Mul, vec![]).unwrap(), int(1));
        assert_eq!(accumulate("-", Arithmetic::Sub, vec![int(5)]).unwrap(), int(-5));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![Value::Double(4.0)]).unwrap(), Value::Double(0.25));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![int(4)]).unwrap(), int(0));
    }

    #[test]
    fn test_fold_order() {
        assert_eq!(accumulate("-", Arithmetic::Sub, vec![int(10), int(3), int(2)]).unwrap(), int(5));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![int(100), int(5), int(2)]).unwrap(), int(10));
    }

    #[test]
    fn test_arity() {
        let err = accumulate("-", Arithmetic::Sub, vec![]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArityMismatch(_)));
        let err = accumulate("min", Arithmetic::Min, vec![int(1)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArityMismatch(_)));
        assert_eq!(accumulate("max", Arithmetic::Max, vec![int(1), int(9), int(3)]).unwrap(), int(9));
        assert_eq!(accumulate("min", Arithmetic::Min, vec![int(4), Value::Double(2.5)]).unwrap(), Value::Double(2.5));
    }

    #[test]
    fn test_type_errors() {
        let err = accumulate("+", Arithmetic::Add, vec![int(1), Value::string("2")]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeError(_)));
        let err = integer_division("quotient", IntegerDivision::Quotient, Value::Double(1.0), int(2)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeError(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = accumulate("/", Arithmetic::Div, vec![int(1), int(0)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivisionByZero(_)));
        assert_eq!(accumulate("/", Arithmetic::Div, vec![Value::Double(1.0), int(0)]).unwrap(), Value::Double(f64::INFINITY));
        let err = integer_division("remainder", IntegerDivision::Remainder, int(1), int(0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivisionByZero(_)));
    }

    #[test]
    fn test_integer_division() {
        let div = |op, n, d| integer_division("op", op, int(n), int(d)).unwrap();
        assert_eq!(div(IntegerDivision::Modulo, 7, -2), int(-1));
        assert_eq!(div(IntegerDivision::Remainder, 7, -2), int(1));
        assert_eq!(div(IntegerDivision::Modulo, -7, 2), int(1));
        assert_eq!(div(IntegerDivision::Modulo, 6, -2), int(0));
        assert_eq!(div(IntegerDivision::Quotient, -7, 2), int(-3));
    }

    #[test]
    fn test_comparisons() {
        let cmp = |op, args| compare("cmp", op, args).unwrap();
        assert_eq!(cmp(Comparison::Lt, vec![int(1), int(2), int(3)]), Value::Boolean(true));
        assert_eq!(cmp(Comparison::Lt, vec![int(1), int(3), int(2)]), Value::Boolean(false));
        assert_eq!(cmp(Comparison::Eq, vec![int(2), Value::Double(2.0)]), Value::Boolean(true));
        assert_eq!(cmp(Comparison::Ge, vec![int(3), int(3), int(1)]), Value::Boolean(true));
        assert_eq!(cmp(Comparison::Gt, vec![]), Value::Boolean(true));
    }

    #[test]
    fn test_predicates() {
        assert!(is_even("even?", int(-4)).unwrap());
        assert!(!is_even("even?", int(7)).unwrap());
        assert!(is_even("even?", Value::Double(2.0)).is_err());
        assert!(is_zero("zero?", Value::Double(0.0)).unwrap());
        assert_eq!(abs("abs", int(-3)).unwrap(), int(3));
    }

    #[test]
    fn test_bignum() {
        let big: BigInt = "100000000000000000000".parse().unwrap();
        let product = accumulate("*", Arithmetic::Mul, vec![Value::Integer(big.clone()), Value::Integer(big)]).unwrap();
        assert_eq!(product.to_string(), "10000000000000000000000000000000000000000");
    }
}
