pub mod lexer;
pub mod parser;

pub use lexer::{tokenize, LexError, Position, Token, TokenKind};
pub use parser::{parse, parse_str, ParseError};
