use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::interpreter::cps::cont::cont_special;
use crate::interpreter::cps::{Cont, Env, ErrorKind, RuntimeError, SpecialForm, Value};

/// The next step of a computation. Step functions hand one of these back
/// instead of calling each other, and `cps` loops over them.
pub enum Trampoline {
    Bounce(Value, Rc<RefCell<Env>>, Rc<Cont>),
    QuasiquoteBounce(Value, Rc<RefCell<Env>>, Rc<Cont>),
    Apply(Value, Rc<Cont>),
    // only Cont::Return lands
    Land(Value),
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trampoline::Bounce(val, _, k) => write!(f, "Bounce({:?}, env, {:?})", val, k),
            Trampoline::QuasiquoteBounce(val, _, k) => write!(f, "QuasiquoteBounce({:?}, env, {:?})", val, k),
            Trampoline::Apply(val, k) => write!(f, "Apply({:?}, {:?})", val, k),
            Trampoline::Land(val) => write!(f, "Land({:?})", val),
        }
    }
}

// An unquote node switches back to ordinary evaluation; pairs are walked
// car first, everything else is literal.
pub fn quasiquote_bounce(val: Value, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Result<Trampoline, RuntimeError> {
    if let Value::SpecialForm(ref form) = val {
        if let SpecialForm::Unquote(ref expr) = **form {
            return Ok(Trampoline::Bounce(expr.clone(), env, k));
        }
    }
    match val {
        Value::Pair(ref pair) => {
            let rest = Rc::new(Cont::QuasiquoteCar {
                cdr: pair.cdr(),
                env: env.clone(),
                k,
            });
            Ok(Trampoline::QuasiquoteBounce(pair.car(), env, rest))
        }
        _ => k.run(val),
    }
}

pub fn bounce(val: Value, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Result<Trampoline, RuntimeError> {
    match val {
        Value::Symbol(ref symbol) => {
            let found = env.borrow().lookup(symbol)?;
            k.run(found)
        }
        Value::Combination(ref combination) => {
            let operator = match combination.exprs.first() {
                Some(operator) => operator.clone(),
                None => {
                    let err = RuntimeError::new(ErrorKind::NotApplicable("()".to_string()));
                    return Err(err.at(combination.position));
                }
            };
            let rest = Rc::new(Cont::EvalOperator {
                combination: combination.clone(),
                env: env.clone(),
                k,
            });
            Ok(Trampoline::Bounce(operator, env, rest))
        }
        Value::SpecialForm(form) => cont_special(form, env, k),
        _ => k.run(val),
    }
}

/// Evaluates one analysed expression to completion.
pub fn cps(expr: Value, env: Rc<RefCell<Env>>) -> Result<Value, RuntimeError> {
    let mut result = Trampoline::Bounce(expr, env, Rc::new(Cont::Return));
    loop {
        trace!("{:?}", result);
        result = match result {
            Trampoline::Bounce(val, env, k) => bounce(val, env, k)?,
            Trampoline::QuasiquoteBounce(val, env, k) => quasiquote_bounce(val, env, k)?,
            Trampoline::Apply(val, k) => k.run(val)?,
            Trampoline::Land(val) => return Ok(val),
        }
    }
}
