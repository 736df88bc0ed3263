use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

pub mod cont;
pub mod env;
pub mod error;
pub mod list;
pub mod number;
pub mod procedure;
pub mod special;
pub mod syntax;
pub mod trampoline;
pub mod value;


pub use cont::{apply, Cont};
pub use env::Env;
pub use error::{ErrorKind, RuntimeError};
pub use procedure::{primitive, Arity, Primitive, PRIMITIVES};
pub use special::{Binding, CondClause, Keyword, LetForm, SpecialForm, SPECIAL_FORMS};
pub use trampoline::{bounce, cps, Trampoline};
pub use value::{Closure, Combination, Lambda, Pair, Procedure, Symbol, Value};

/// Evaluates analysed expressions against one global environment, which
/// persists across calls.
#[derive(Clone)]
pub struct Interpreter {
    root: Rc<RefCell<Env>>,
}

impl Default for Interpreter {
    fn default() -> Self { Interpreter::new() }
}

impl Interpreter {
    pub fn new() -> Interpreter { Interpreter { root: Env::new_root() } }

    pub fn root(&self) -> Rc<RefCell<Env>> { self.root.clone() }

    pub fn eval(&self, expr: Value) -> Result<Value, RuntimeError> { cps(expr, self.root.clone()) }

    /// Evaluates each top-level form in order and reports every outcome to
    /// `continuation`. A failing form does not stop the ones after it.
    pub fn execute<F>(&self, program: &[Value], mut continuation: F)
    where
        F: FnMut(Result<Value, RuntimeError>),
    {
        for expr in program {
            debug!("top-level form: {}", expr);
            continuation(self.eval(expr.clone()));
        }
    }

    /// Evaluates the forms in order, stopping at the first error.
    pub fn run(&self, program: &[Value]) -> Result<Value, RuntimeError> {
        let mut last = Value::Unassigned;
        for expr in program {
            last = self.eval(expr.clone())?;
        }
        Ok(last)
    }
}
