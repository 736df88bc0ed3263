use thiserror::Error;

use crate::reader::Position;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("Unassigned variable: {0}")]
    UnassignedVariable(String),
    #[error("Not applicable: {0}")]
    NotApplicable(String),
    #[error("{0}")]
    ArityMismatch(String),
    #[error("{0}")]
    TypeError(String),
    #[error("Division by zero: {0}")]
    DivisionByZero(String),
    #[error("Index is out of range: {0}")]
    IndexOutOfRange(String),
    #[error("Illegal datum: {0}")]
    IllegalDatum(String),
    #[error("Ill-formed special form: {0}")]
    MalformedSpecialForm(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}{kind}", location(.position))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub position: Option<Position>,
}

fn location(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!("{}: ", pos),
        None => String::new(),
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> RuntimeError { RuntimeError { kind, position: None } }

    /// Attach a source position unless a more precise one is already known.
    pub fn at(mut self, position: Option<Position>) -> RuntimeError {
        if self.position.is_none() {
            self.position = position;
        }
        self
    }
}

#[macro_export]
macro_rules! runtime_error {
    ($kind:ident, $($arg:tt)*) => (
        return Err($crate::interpreter::cps::RuntimeError::new(
            $crate::interpreter::cps::ErrorKind::$kind(format!($($arg)*)),
        ))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divide(n: i64, d: i64) -> Result<i64, RuntimeError> {
        if d == 0 {
            runtime_error!(DivisionByZero, "{} / {}", n, d)
        }
        Ok(n / d)
    }

    #[test]
    fn test_macro_returns_early() {
        assert_eq!(divide(6, 3), Ok(2));
        let err = divide(1, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero("1 / 0".to_string()));
        assert_eq!(err.to_string(), "Division by zero: 1 / 0");
    }

    #[test]
    fn test_position_prefix() {
        let pos = Position { line: 3, column: 7 };
        let err = RuntimeError::new(ErrorKind::UnboundVariable("foo".into())).at(Some(pos));
        assert_eq!(err.to_string(), "3:7: Unbound variable: foo");
        // the first position wins
        let err = err.at(Some(Position { line: 9, column: 9 }));
        assert_eq!(err.position, Some(pos));
    }
}
