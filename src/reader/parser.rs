use std::iter::Peekable;
use std::vec::IntoIter;

use thiserror::Error;

use crate::interpreter::cps::list;
use crate::interpreter::cps::value::{Symbol, Value};
use crate::reader::lexer::{tokenize, LexError, Position, Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Unexpected end of input, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("{position}: unexpected '{found}', expected {expected}")]
    UnexpectedToken {
        found: TokenKind,
        position: Position,
        expected: &'static str,
    },
    #[error("{0}: unbalanced ')'")]
    UnbalancedParenthesis(Position),
    #[error("{0}: illegal use of '.'")]
    IllegalDot(Position),
}

type ParseResult<T> = Result<T, ParseError>;

/// Recursive descent from tokens to data. Lists carry the position of their
/// opening parenthesis, symbols their own.
pub struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    pub fn parse_all(&mut self) -> ParseResult<Vec<Value>> {
        let mut data = Vec::new();
        while self.tokens.peek().is_some() {
            data.push(self.parse_datum()?);
        }
        Ok(data)
    }

    fn parse_datum(&mut self) -> ParseResult<Value> {
        let token = self.tokens.next().ok_or(ParseError::UnexpectedEof("an expression"))?;
        let position = token.position;
        match token.kind {
            TokenKind::LParen => self.parse_list(position),
            TokenKind::RParen => Err(ParseError::UnbalancedParenthesis(position)),
            TokenKind::Dot => Err(ParseError::IllegalDot(position)),
            TokenKind::Quote => self.parse_abbreviation("quote", position),
            TokenKind::Quasiquote => self.parse_abbreviation("quasiquote", position),
            TokenKind::Unquote => self.parse_abbreviation("unquote", position),
            TokenKind::UnquoteSplicing => self.parse_abbreviation("unquote-splicing", position),
            TokenKind::Boolean(b) => Ok(Value::Boolean(b)),
            TokenKind::Integer(n) => Ok(Value::Integer(n)),
            TokenKind::Float(x) => Ok(Value::Double(x)),
            TokenKind::String(s) => Ok(Value::String(s.into())),
            TokenKind::Symbol(s) => Ok(Value::Symbol(Symbol::with_position(&s, position))),
        }
    }

    // 'x => (quote x)
    fn parse_abbreviation(&mut self, name: &str, position: Position) -> ParseResult<Value> {
        let datum = self.parse_datum()?;
        let keyword = Value::Symbol(Symbol::with_position(name, position));
        Ok(list::from_vec_with_tail(vec![keyword, datum], Value::EmptyList, Some(position)))
    }

    fn parse_list(&mut self, open: Position) -> ParseResult<Value> {
        let mut items = Vec::new();
        loop {
            let token = self.tokens.peek().ok_or(ParseError::UnexpectedEof("')'"))?;
            match token.kind {
                TokenKind::RParen => {
                    self.tokens.next();
                    return Ok(list::from_vec_with_tail(items, Value::EmptyList, Some(open)));
                }
                TokenKind::Dot => {
                    let dot = token.position;
                    self.tokens.next();
                    if items.is_empty() {
                        return Err(ParseError::IllegalDot(dot));
                    }
                    let tail = self.parse_datum()?;
                    return match self.tokens.next() {
                        Some(Token {
                            kind: TokenKind::RParen,
                            ..
                        }) => Ok(list::from_vec_with_tail(items, tail, Some(open))),
                        Some(token) => Err(ParseError::UnexpectedToken {
                            found: token.kind,
                            position: token.position,
                            expected: "')' after the tail of a dotted list",
                        }),
                        None => Err(ParseError::UnexpectedEof("')'")),
                    };
                }
                _ => items.push(self.parse_datum()?),
            }
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> ParseResult<Vec<Value>> { Parser::new(tokens).parse_all() }

pub fn parse_str(src: &str) -> ParseResult<Vec<Value>> { parse(tokenize(src)?) }

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Vec<String> { parse_str(src).unwrap().iter().map(|v| v.to_string()).collect() }

    fn read_err(src: &str) -> ParseError { parse_str(src).unwrap_err() }

    #[test]
    fn test_atoms() {
        assert_eq!(read("1 2.5 #t \"s\" sym"), vec!["1", "2.5", "#t", "s", "sym"]);
        assert!(parse_str("").unwrap().is_empty());
    }

    #[test]
    fn test_lists() {
        assert_eq!(read("(a (b c) ())"), vec!["(a (b c) ())"]);
        assert_eq!(read("(a . b) (a b . c)"), vec!["(a . b)", "(a b . c)"]);
        assert_eq!(read("(a . (b c))"), vec!["(a b c)"]);
    }

    #[test]
    fn test_abbreviations() {
        assert_eq!(
            read("'a `(b ,c ,@d)"),
            vec!["(quote a)", "(quasiquote (b (unquote c) (unquote-splicing d)))"]
        );
    }

    #[test]
    fn test_positions() {
        let data = parse_str("(foo\n  (bar baz))").unwrap();
        let Value::Pair(ref outer) = data[0] else { panic!("expected a list") };
        assert_eq!(outer.position(), Some(Position { line: 1, column: 1 }));
        let Value::Pair(ref rest) = outer.cdr() else { panic!("expected a list") };
        let Value::Pair(ref inner) = rest.car() else { panic!("expected a list") };
        assert_eq!(inner.position(), Some(Position { line: 2, column: 3 }));
        match inner.car() {
            Value::Symbol(s) => assert_eq!(s.position(), Some(Position { line: 2, column: 4 })),
            other => panic!("expected a symbol, got {}", other),
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(read_err("(a b"), ParseError::UnexpectedEof("')'"));
        assert_eq!(read_err("a)"), ParseError::UnbalancedParenthesis(Position { line: 1, column: 2 }));
        assert_eq!(read_err("(. a)"), ParseError::IllegalDot(Position { line: 1, column: 2 }));
        assert!(matches!(read_err("(a . b c)"), ParseError::UnexpectedToken { .. }));
        assert!(matches!(read_err("'"), ParseError::UnexpectedEof(_)));
        assert!(matches!(read_err("\"open"), ParseError::Lex(_)));
    }
}
