use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::interpreter::cps::list;
use crate::interpreter::cps::special::{CondClause, LetForm, SpecialForm};
use crate::interpreter::cps::value::{Closure, Combination, Exprs, Lambda, Procedure, Symbol, Value};
use crate::interpreter::cps::{primitive, syntax, Env, ErrorKind, Primitive, RuntimeError, Trampoline};
use crate::reader::Position;
use crate::runtime_error;

// (call-with-current-continuation proc)
//
// proc must be a procedure of one argument. The current continuation, the
// `k` that the call/cc combination itself was going to deliver its value
// to, is packaged as a procedure and passed to proc. Because every `k` is
// a heap value, the packaged continuation stays valid after the call/cc
// returns and can be re-entered any number of times.
//
// (define r #f)
// (+ 1 (call/cc (lambda (k) (set! r k) 1)))   ; => 2
// (r 5)                                       ; => 6

/// The rest of a computation, as data. Each variant holds what it needs to
/// resume plus `k`, the continuation it hands its result to.
pub enum Cont {
    // operator evaluated; operands from index 1 come next
    EvalOperator {
        combination: Rc<Combination>,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    // collecting operand values left to right; `acc` is a list, newest first
    EvalArgs {
        procedure: Procedure,
        combination: Rc<Combination>,
        next: usize,
        acc: Value,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    // bodies: values are dropped until the last expression
    EvalSequence {
        exprs: Exprs,
        next: usize,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalIf {
        consequent: Value,
        alternative: Value,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalCond {
        clauses: Rc<[CondClause]>,
        index: usize,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    // binding values so far, newest first, evaluated in the outer env
    EvalLet {
        form: Rc<LetForm>,
        bound: usize,
        acc: Value,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    // binding values so far, newest first, evaluated in the new frame
    EvalLetrec {
        form: Rc<LetForm>,
        bound: usize,
        acc: Value,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalDefine {
        name: Symbol,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalSet {
        name: Symbol,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalAnd {
        exprs: Exprs,
        next: usize,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    EvalOr {
        exprs: Exprs,
        next: usize,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    // car of a template done; walk the cdr next
    QuasiquoteCar {
        cdr: Value,
        env: Rc<RefCell<Env>>,
        k: Rc<Cont>,
    },
    QuasiquoteCdr {
        car: Value,
        k: Rc<Cont>,
    },
    Return,
}

thread_local! {
    static RETURN: Rc<Cont> = Rc::new(Cont::Return);
}

impl Cont {
    pub fn next(&self) -> Option<&Rc<Cont>> {
        match self {
            Cont::EvalOperator { k, .. }
            | Cont::EvalArgs { k, .. }
            | Cont::EvalSequence { k, .. }
            | Cont::EvalIf { k, .. }
            | Cont::EvalCond { k, .. }
            | Cont::EvalLet { k, .. }
            | Cont::EvalLetrec { k, .. }
            | Cont::EvalDefine { k, .. }
            | Cont::EvalSet { k, .. }
            | Cont::EvalAnd { k, .. }
            | Cont::EvalOr { k, .. }
            | Cont::QuasiquoteCar { k, .. }
            | Cont::QuasiquoteCdr { k, .. } => Some(k),
            Cont::Return => None,
        }
    }

    fn take_next(&mut self) -> Option<Rc<Cont>> {
        match self {
            Cont::EvalOperator { k, .. }
            | Cont::EvalArgs { k, .. }
            | Cont::EvalSequence { k, .. }
            | Cont::EvalIf { k, .. }
            | Cont::EvalCond { k, .. }
            | Cont::EvalLet { k, .. }
            | Cont::EvalLetrec { k, .. }
            | Cont::EvalDefine { k, .. }
            | Cont::EvalSet { k, .. }
            | Cont::EvalAnd { k, .. }
            | Cont::EvalOr { k, .. }
            | Cont::QuasiquoteCar { k, .. }
            | Cont::QuasiquoteCdr { k, .. } => RETURN.try_with(Rc::clone).ok().map(|sentinel| std::mem::replace(k, sentinel)),
            Cont::Return => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Cont::EvalOperator { combination, .. } => format!("<EvalOperator {}>", Value::Combination(combination.clone())),
            Cont::EvalArgs { procedure, next, .. } => format!("<EvalArgs {} next={}>", procedure.name(), next),
            Cont::EvalSequence { exprs, next, .. } => format!("<EvalSequence {}/{}>", next, exprs.len()),
            Cont::EvalIf { .. } => "<EvalIf>".to_string(),
            Cont::EvalCond { index, .. } => format!("<EvalCond clause={}>", index),
            Cont::EvalLet { bound, .. } => format!("<EvalLet bound={}>", bound),
            Cont::EvalLetrec { bound, .. } => format!("<EvalLetrec bound={}>", bound),
            Cont::EvalDefine { name, .. } => format!("<EvalDefine {}>", name),
            Cont::EvalSet { name, .. } => format!("<EvalSet {}>", name),
            Cont::EvalAnd { next, .. } => format!("<EvalAnd next={}>", next),
            Cont::EvalOr { next, .. } => format!("<EvalOr next={}>", next),
            Cont::QuasiquoteCar { .. } => "<QuasiquoteCar>".to_string(),
            Cont::QuasiquoteCdr { car, .. } => format!("<QuasiquoteCdr {}>", car),
            Cont::Return => "<Return>".to_string(),
        }
    }

    /// Hands `val` to this continuation, producing the next step.
    pub fn run(&self, val: Value) -> Result<Trampoline, RuntimeError> {
        trace!("run {} with {}", self.label(), val);
        match self {
            Cont::EvalOperator { combination, env, k } => cont_eval_operator(val, combination, env, k),
            Cont::EvalArgs {
                procedure,
                combination,
                next,
                acc,
                env,
                k,
            } => {
                // consed onto, never mutated: a re-entered continuation must
                // see the operands as they were at capture time
                let acc = Value::cons(val, acc.clone());
                cont_eval_args(procedure.clone(), combination.clone(), *next, acc, env.clone(), k.clone())
            }
            Cont::EvalSequence { exprs, next, env, k } => Ok(eval_sequence(exprs.clone(), *next, env.clone(), k.clone())),
            Cont::EvalIf {
                consequent,
                alternative,
                env,
                k,
            } => {
                let branch = if val.is_true() { consequent } else { alternative };
                Ok(Trampoline::Bounce(branch.clone(), env.clone(), k.clone()))
            }
            Cont::EvalCond { clauses, index, env, k } => {
                if !val.is_true() {
                    return Ok(eval_cond(clauses.clone(), index + 1, env.clone(), k.clone()));
                }
                match clauses.get(*index) {
                    Some(clause) if !clause.body.is_empty() => Ok(eval_sequence(clause.body.clone(), 0, env.clone(), k.clone())),
                    _ => Ok(Trampoline::Apply(val, k.clone())),
                }
            }
            Cont::EvalLet { form, bound, acc, env, k } => {
                let acc = Value::cons(val, acc.clone());
                Ok(eval_let(form.clone(), bound + 1, acc, env.clone(), k.clone()))
            }
            Cont::EvalLetrec { form, bound, acc, env, k } => {
                let acc = Value::cons(val, acc.clone());
                Ok(eval_letrec(form.clone(), bound + 1, acc, env.clone(), k.clone()))
            }
            Cont::EvalDefine { name, env, k } => {
                debug!("define {}", name);
                env.borrow_mut().define(name.name().to_string(), val);
                Ok(Trampoline::Apply(Value::Unassigned, k.clone()))
            }
            Cont::EvalSet { name, env, k } => {
                env.borrow_mut().set(name, val)?;
                Ok(Trampoline::Apply(Value::Unassigned, k.clone()))
            }
            Cont::EvalAnd { exprs, next, env, k } => {
                if !val.is_true() {
                    return Ok(Trampoline::Apply(val, k.clone()));
                }
                Ok(eval_and(exprs.clone(), *next, env.clone(), k.clone()))
            }
            Cont::EvalOr { exprs, next, env, k } => {
                if val.is_true() {
                    return Ok(Trampoline::Apply(val, k.clone()));
                }
                Ok(eval_or(exprs.clone(), *next, env.clone(), k.clone()))
            }
            Cont::QuasiquoteCar { cdr, env, k } => {
                let rest = Rc::new(Cont::QuasiquoteCdr { car: val, k: k.clone() });
                Ok(Trampoline::QuasiquoteBounce(cdr.clone(), env.clone(), rest))
            }
            Cont::QuasiquoteCdr { car, k } => Ok(Trampoline::Apply(Value::cons(car.clone(), val), k.clone())),
            Cont::Return => Ok(Trampoline::Land(val)),
        }
    }
}

// Chains can be as long as the deepest non-tail recursion; unlink them
// iteratively instead of letting drop glue recurse.
impl Drop for Cont {
    fn drop(&mut self) {
        let mut next = self.take_next();
        while let Some(k) = next {
            match Rc::try_unwrap(k) {
                Ok(mut cont) => next = cont.take_next(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for Cont {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())?;
        let mut next = self.next();
        let mut shown = 0;
        while let Some(k) = next {
            if shown == 8 {
                return write!(f, " -> ...");
            }
            write!(f, " -> {}", k.label())?;
            next = k.next();
            shown += 1;
        }
        Ok(())
    }
}

/// Evaluates `exprs[next..]` for effect, the last one in tail position.
pub fn eval_sequence(exprs: Exprs, next: usize, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    if next + 1 >= exprs.len() {
        return match exprs.get(next) {
            Some(expr) => Trampoline::Bounce(expr.clone(), env, k),
            None => Trampoline::Apply(Value::Unassigned, k),
        };
    }
    let expr = exprs[next].clone();
    let rest = Rc::new(Cont::EvalSequence {
        exprs,
        next: next + 1,
        env: env.clone(),
        k,
    });
    Trampoline::Bounce(expr, env, rest)
}

fn eval_cond(clauses: Rc<[CondClause]>, index: usize, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    let test = match clauses.get(index) {
        Some(clause) => clause.test.clone(),
        None => return Trampoline::Apply(Value::Unassigned, k),
    };
    let rest = Rc::new(Cont::EvalCond {
        clauses,
        index,
        env: env.clone(),
        k,
    });
    Trampoline::Bounce(test, env, rest)
}

// Values accumulated newest first, back in operand order.
fn in_order(acc: &Value) -> Vec<Value> {
    let mut values: Vec<Value> = list::iter(acc).collect();
    values.reverse();
    values
}

fn eval_let(form: Rc<LetForm>, bound: usize, acc: Value, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    let init = match form.bindings.get(bound) {
        Some(binding) => binding.init.clone(),
        None => {
            let frame: HashMap<String, Value> = form
                .bindings
                .iter()
                .zip(in_order(&acc))
                .map(|(binding, val)| (binding.name.name().to_string(), val))
                .collect();
            return eval_sequence(form.body.clone(), 0, Env::extend(env, frame), k);
        }
    };
    let rest = Rc::new(Cont::EvalLet {
        form,
        bound,
        acc,
        env: env.clone(),
        k,
    });
    Trampoline::Bounce(init, env, rest)
}

// `env` is the letrec frame itself, pre-bound to Unassigned.
fn eval_letrec(form: Rc<LetForm>, bound: usize, acc: Value, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    let init = match form.bindings.get(bound) {
        Some(binding) => binding.init.clone(),
        None => {
            {
                let mut frame = env.borrow_mut();
                for (binding, val) in form.bindings.iter().zip(in_order(&acc)) {
                    frame.define(binding.name.name().to_string(), val);
                }
            }
            return eval_sequence(form.body.clone(), 0, env, k);
        }
    };
    let rest = Rc::new(Cont::EvalLetrec {
        form,
        bound,
        acc,
        env: env.clone(),
        k,
    });
    Trampoline::Bounce(init, env, rest)
}

fn eval_and(exprs: Exprs, next: usize, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    if exprs.is_empty() {
        return Trampoline::Apply(Value::Boolean(true), k);
    }
    eval_connective(exprs, next, env, k, true)
}

fn eval_or(exprs: Exprs, next: usize, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Trampoline {
    if exprs.is_empty() {
        return Trampoline::Apply(Value::Boolean(false), k);
    }
    eval_connective(exprs, next, env, k, false)
}

fn eval_connective(exprs: Exprs, next: usize, env: Rc<RefCell<Env>>, k: Rc<Cont>, and: bool) -> Trampoline {
    let expr = exprs[next].clone();
    if next + 1 == exprs.len() {
        return Trampoline::Bounce(expr, env, k);
    }
    let rest = if and {
        Cont::EvalAnd {
            exprs,
            next: next + 1,
            env: env.clone(),
            k,
        }
    } else {
        Cont::EvalOr {
            exprs,
            next: next + 1,
            env: env.clone(),
            k,
        }
    };
    Trampoline::Bounce(expr, env, Rc::new(rest))
}

fn make_closure(lambda: &Rc<Lambda>, env: Rc<RefCell<Env>>) -> Value {
    Value::Procedure(Procedure::Closure(Rc::new(Closure {
        lambda: lambda.clone(),
        env,
    })))
}

/// First step of a special form; never evaluates an operator.
pub fn cont_special(form: Rc<SpecialForm>, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Result<Trampoline, RuntimeError> {
    let step = match &*form {
        SpecialForm::If {
            predicate,
            consequent,
            alternative,
        } => {
            let rest = Rc::new(Cont::EvalIf {
                consequent: consequent.clone(),
                alternative: alternative.clone(),
                env: env.clone(),
                k,
            });
            Trampoline::Bounce(predicate.clone(), env, rest)
        }
        SpecialForm::Cond(clauses) => eval_cond(clauses.clone(), 0, env, k),
        SpecialForm::Let(form) => eval_let(form.clone(), 0, Value::EmptyList, env, k),
        SpecialForm::Letrec(form) => {
            let frame = form
                .bindings
                .iter()
                .map(|binding| (binding.name.name().to_string(), Value::Unassigned))
                .collect();
            eval_letrec(form.clone(), 0, Value::EmptyList, Env::extend(env, frame), k)
        }
        SpecialForm::Lambda(lambda) => Trampoline::Apply(make_closure(lambda, env), k),
        SpecialForm::Define { name, value } => {
            let rest = Rc::new(Cont::EvalDefine {
                name: name.clone(),
                env: env.clone(),
                k,
            });
            Trampoline::Bounce(value.clone(), env, rest)
        }
        SpecialForm::DefineProc { name, lambda } => {
            debug!("define procedure {}", name);
            let closure = make_closure(lambda, env.clone());
            env.borrow_mut().define(name.name().to_string(), closure);
            Trampoline::Apply(Value::Unassigned, k)
        }
        SpecialForm::Set { name, value } => {
            let rest = Rc::new(Cont::EvalSet {
                name: name.clone(),
                env: env.clone(),
                k,
            });
            Trampoline::Bounce(value.clone(), env, rest)
        }
        SpecialForm::Quote(datum) => Trampoline::Apply(datum.clone(), k),
        SpecialForm::Quasiquote(template) => Trampoline::QuasiquoteBounce(template.clone(), env, k),
        SpecialForm::Unquote(expr) => Trampoline::Bounce(expr.clone(), env, k),
        SpecialForm::Begin(exprs) => eval_sequence(exprs.clone(), 0, env, k),
        SpecialForm::And(exprs) => eval_and(exprs.clone(), 0, env, k),
        SpecialForm::Or(exprs) => eval_or(exprs.clone(), 0, env, k),
    };
    Ok(step)
}

fn cont_eval_operator(
    val: Value,
    combination: &Rc<Combination>,
    env: &Rc<RefCell<Env>>,
    k: &Rc<Cont>,
) -> Result<Trampoline, RuntimeError> {
    let procedure = match val {
        Value::Procedure(procedure) => procedure,
        other => {
            let err = RuntimeError::new(ErrorKind::NotApplicable(other.to_string()));
            return Err(err.at(combination.position));
        }
    };
    cont_eval_args(procedure, combination.clone(), 1, Value::EmptyList, env.clone(), k.clone())
}

fn cont_eval_args(
    procedure: Procedure,
    combination: Rc<Combination>,
    next: usize,
    acc: Value,
    env: Rc<RefCell<Env>>,
    k: Rc<Cont>,
) -> Result<Trampoline, RuntimeError> {
    let operand = match combination.exprs.get(next) {
        Some(operand) => operand.clone(),
        None => return apply(procedure, in_order(&acc), env, combination.position, k),
    };
    let rest = Rc::new(Cont::EvalArgs {
        procedure,
        combination,
        next: next + 1,
        acc,
        env: env.clone(),
        k,
    });
    Ok(Trampoline::Bounce(operand, env, rest))
}

/// Applies an evaluated procedure to evaluated operands. `env` is the
/// caller's environment, which only `eval` looks at.
pub fn apply(
    procedure: Procedure,
    args: Vec<Value>,
    env: Rc<RefCell<Env>>,
    position: Option<Position>,
    k: Rc<Cont>,
) -> Result<Trampoline, RuntimeError> {
    apply_procedure(procedure, args, env, k).map_err(|e| e.at(position))
}

fn apply_procedure(procedure: Procedure, args: Vec<Value>, env: Rc<RefCell<Env>>, k: Rc<Cont>) -> Result<Trampoline, RuntimeError> {
    procedure.arity().check(&procedure.name(), args.len())?;
    match procedure {
        Procedure::Primitive(Primitive::CallCC) => call_cc(args, k),
        Procedure::Primitive(Primitive::Eval) => {
            let datum = args.into_iter().next().unwrap_or(Value::Unassigned);
            if !matches!(datum, Value::Pair(_)) || !list::is_proper(&datum) {
                runtime_error!(TypeError, "eval: argument must be a non-empty proper list, but was given {}", datum)
            }
            let expr = syntax::analyze(&datum)?;
            trace!("eval {}", expr);
            Ok(Trampoline::Bounce(expr, env, k))
        }
        Procedure::Primitive(Primitive::Apply) => {
            let mut args = args;
            let spread = args.pop().unwrap_or(Value::EmptyList);
            let mut operands = args.split_off(1);
            operands.extend(list::to_vec("apply", &spread)?);
            match args.pop() {
                Some(Value::Procedure(target)) => apply_procedure(target, operands, env, k),
                Some(other) => runtime_error!(NotApplicable, "{}", other),
                None => runtime_error!(ArityMismatch, "apply expects a procedure"),
            }
        }
        Procedure::Primitive(f) => Ok(Trampoline::Apply(primitive(f, args)?, k)),
        Procedure::Closure(closure) => Ok(apply_closure(&closure, args, k)),
        Procedure::Continuation(captured) => {
            debug!("re-entering continuation {:?}", captured);
            // the caller's k is dropped here
            let val = args.into_iter().next().unwrap_or(Value::Unassigned);
            Ok(Trampoline::Apply(val, captured))
        }
    }
}

fn apply_closure(closure: &Closure, mut args: Vec<Value>, k: Rc<Cont>) -> Trampoline {
    let lambda = &closure.lambda;
    let mut frame = HashMap::with_capacity(lambda.formals.len());
    if lambda.dotted {
        let fixed = lambda.formals.len() - 1;
        let rest = args.split_off(fixed);
        frame.insert(lambda.formals[fixed].name().to_string(), list::from_vec(rest));
    }
    for (formal, arg) in lambda.formals.iter().zip(args) {
        frame.insert(formal.name().to_string(), arg);
    }
    trace!("apply {} with {} bindings", lambda.name.as_deref().unwrap_or("anonymous"), frame.len());
    let env = Env::extend(closure.env.clone(), frame);
    eval_sequence(lambda.body.clone(), 0, env, k)
}

fn call_cc(args: Vec<Value>, k: Rc<Cont>) -> Result<Trampoline, RuntimeError> {
    match args.into_iter().next() {
        Some(Value::Procedure(Procedure::Closure(closure))) => {
            if closure.lambda.dotted || closure.lambda.formals.len() != 1 {
                runtime_error!(TypeError, "call/cc: expects a procedure of one argument")
            }
            debug!("capturing continuation {:?}", k);
            let continuation = Value::Procedure(Procedure::Continuation(k.clone()));
            Ok(apply_closure(&closure, vec![continuation], k))
        }
        Some(other) => runtime_error!(TypeError, "call/cc: expects a procedure of one argument, but was given {}", other),
        None => runtime_error!(ArityMismatch, "call/cc expects 1 argument"),
    }
}
