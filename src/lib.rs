pub mod interpreter;
pub mod reader;

pub use interpreter::cps::{ErrorKind, RuntimeError, Value};
pub use interpreter::{Error, Interpreter};
