pub mod cps;
pub mod cps_json;

use thiserror::Error;
use tracing::debug;

use crate::interpreter::cps::{syntax, RuntimeError, Value};
use crate::reader::{parse_str, ParseError};

/// Definitions loaded into the global frame unless the caller opts out.
pub const PRELUDE: &str = include_str!("interpreter/prelude.scm");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Reads and analyses a whole source text. Nothing is evaluated, so a
/// syntax error anywhere rejects the entire input.
pub fn parse_code(src: &str) -> Result<Vec<Value>, Error> {
    let data = parse_str(src)?;
    Ok(syntax::analyze_program(&data)?)
}

#[derive(Clone, Default)]
pub struct Interpreter {
    cps: cps::Interpreter,
}

impl Interpreter {
    pub fn new() -> Interpreter { Interpreter::default() }

    /// A fresh interpreter with `PRELUDE` already evaluated.
    pub fn with_prelude() -> Result<Interpreter, Error> {
        let interpreter = Interpreter::new();
        interpreter.run(PRELUDE)?;
        debug!("prelude loaded");
        Ok(interpreter)
    }

    /// Parses `src`, then evaluates it form by form, handing each result to
    /// `continuation`. Only a parse or analysis failure is returned here.
    pub fn execute<F>(&self, src: &str, continuation: F) -> Result<(), Error>
    where
        F: FnMut(Result<Value, RuntimeError>),
    {
        let program = parse_code(src)?;
        self.cps.execute(&program, continuation);
        Ok(())
    }

    /// The value of the last form, or the first error.
    pub fn run(&self, src: &str) -> Result<Value, Error> {
        let program = parse_code(src)?;
        Ok(self.cps.run(&program)?)
    }

    /// Names bound in the global frame.
    pub fn identifiers(&self) -> Vec<String> { self.cps.root().borrow().identifiers() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude() {
        let interpreter = Interpreter::with_prelude().unwrap();
        assert_eq!(interpreter.run("(square 12)").unwrap(), Value::integer(144));
        assert_eq!(interpreter.run("(factorial 20)").unwrap().to_string(), "2432902008176640000");
        assert_eq!(interpreter.run("(average 1 2)").unwrap(), Value::Double(1.5));
        match interpreter.run("(sqrt 9)").unwrap() {
            Value::Double(x) => assert!((x - 3.0).abs() < 0.001),
            other => panic!("expected a double, got {}", other),
        }
    }

    #[test]
    fn test_parse_error_rejects_whole_input() {
        let interpreter = Interpreter::new();
        let mut results = vec![];
        let err = interpreter.execute("(define x 1) (+ x", |r| results.push(r)).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(results.is_empty());
        assert!(interpreter.run("x").is_err());
    }

    #[test]
    fn test_analysis_error_rejects_whole_input() {
        let interpreter = Interpreter::new();
        let err = interpreter.execute("(define y 1) (if)", |_| {}).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert!(interpreter.run("y").is_err());
    }

    #[test]
    fn test_execute_reports_each_form() {
        let interpreter = Interpreter::new();
        let mut results = vec![];
        interpreter.execute("(define x 2) (car 1) (* x 21)", |r| results.push(r)).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(Value::Unassigned));
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(Value::integer(42)));
    }

    #[test]
    fn test_identifiers() {
        let names = Interpreter::new().identifiers();
        assert!(names.iter().any(|n| n == "call/cc"));
        assert!(names.iter().any(|n| n == "list-ref"));
    }
}
