use std::fmt;

use logos::Logos;
use num_bigint::BigInt;
use serde::Serialize;
use thiserror::Error;

/// 1-based source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}:{}", self.line, self.column) }
}

#[derive(Error, Default, Debug, Clone, PartialEq)]
pub enum LexErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unknown escape sequence: '\\{0}'")]
    UnknownEscape(char),
    #[error("Invalid number: '{0}'")]
    InvalidNumber(String),
    #[default]
    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{position}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r";[^\n]*")]
#[logos(error = LexErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    // a lone dot also matches the symbol pattern
    #[token(".", priority = 10)]
    Dot,
    #[token("'")]
    Quote,
    #[token("`")]
    Quasiquote,
    #[token(",")]
    Unquote,
    #[token(",@")]
    UnquoteSplicing,
    #[token("#t", |_| true)]
    #[token("#true", |_| true)]
    #[token("#f", |_| false)]
    #[token("#false", |_| false)]
    Boolean(bool),
    #[regex(r"[-+]?[0-9]+", priority = 3, callback = parse_integer)]
    Integer(BigInt),
    #[regex(r"[-+]?([0-9]+\.[0-9]*|\.[0-9]+)([eE][-+]?[0-9]+)?", priority = 3, callback = parse_float)]
    #[regex(r"[-+]?[0-9]+[eE][-+]?[0-9]+", priority = 3, callback = parse_float)]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    #[regex(r#""([^"\\]|\\.)*"#, unterminated)]
    String(String),
    #[regex(r"[a-zA-Z0-9!$%&*/:<=>?~_^+\-.@\p{L}]+", |lex| lex.slice().to_string())]
    Symbol(String),
}

fn parse_integer(lex: &mut logos::Lexer<TokenKind>) -> Result<BigInt, LexErrorKind> {
    lex.slice()
        .parse::<BigInt>()
        .map_err(|_| LexErrorKind::InvalidNumber(lex.slice().to_string()))
}

fn parse_string(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

fn unterminated(_: &mut logos::Lexer<TokenKind>) -> Result<String, LexErrorKind> { Err(LexErrorKind::UnterminatedString) }

fn parse_float(lex: &mut logos::Lexer<TokenKind>) -> Result<f64, LexErrorKind> {
    lex.slice()
        .parse::<f64>()
        .map_err(|_| LexErrorKind::InvalidNumber(lex.slice().to_string()))
}

fn unescape(s: &str) -> Result<String, LexErrorKind> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(c) => return Err(LexErrorKind::UnknownEscape(c)),
            None => return Err(LexErrorKind::UnterminatedString),
        }
    }
    Ok(result)
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::Quasiquote => write!(f, "`"),
            TokenKind::Unquote => write!(f, ","),
            TokenKind::UnquoteSplicing => write!(f, ",@"),
            TokenKind::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "{:?}", s),
            TokenKind::Symbol(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

// Maps byte offsets to line/column pairs.
struct LineIndex<'a> {
    src: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(src: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex { src, line_starts }
    }

    fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let column = self.src.get(start..offset).map_or(0, |s| s.chars().count());
        Position {
            line: line + 1,
            column: column + 1,
        }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let index = LineIndex::new(src);
    TokenKind::lexer(src)
        .spanned()
        .map(|(result, span)| {
            let position = index.position(span.start);
            match result {
                Ok(kind) => Ok(Token { kind, position }),
                Err(kind) => Err(LexError { kind, position }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        match tokenize(src) {
            Ok(tokens) => tokens.into_iter().map(|t| t.kind).collect(),
            Err(e) => panic!("lexing {:?} failed: {}", src, e),
        }
    }

    fn sym(s: &str) -> TokenKind { TokenKind::Symbol(s.to_string()) }

    fn int(n: i64) -> TokenKind { TokenKind::Integer(BigInt::from(n)) }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("(' ` , ,@ . )"),
            vec![
                TokenKind::LParen,
                TokenKind::Quote,
                TokenKind::Quasiquote,
                TokenKind::Unquote,
                TokenKind::UnquoteSplicing,
                TokenKind::Dot,
                TokenKind::RParen
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42 -7 +3"), vec![int(42), int(-7), int(3)]);
        assert_eq!(
            kinds("1.5 .5 -2.0 1e3"),
            vec![TokenKind::Float(1.5), TokenKind::Float(0.5), TokenKind::Float(-2.0), TokenKind::Float(1000.0)]
        );
        let big = "123456789012345678901234567890";
        assert_eq!(kinds(big), vec![TokenKind::Integer(big.parse().unwrap())]);
    }

    #[test]
    fn test_symbols() {
        assert_eq!(
            kinds("+ - ... set! call/cc list->vector λ 1+"),
            vec![sym("+"), sym("-"), sym("..."), sym("set!"), sym("call/cc"), sym("list->vector"), sym("λ"), sym("1+")]
        );
    }

    #[test]
    fn test_booleans_and_strings() {
        assert_eq!(
            kinds(r#"#t #f #true "a\n\"b\"""#),
            vec![
                TokenKind::Boolean(true),
                TokenKind::Boolean(false),
                TokenKind::Boolean(true),
                TokenKind::String("a\n\"b\"".to_string())
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(kinds("; heading\n(a ; trailing\n b)"), vec![TokenKind::LParen, sym("a"), sym("b"), TokenKind::RParen]);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("(define x\n  42)").unwrap();
        assert_eq!(tokens[0].position, Position { line: 1, column: 1 });
        assert_eq!(tokens[2].position, Position { line: 1, column: 9 });
        assert_eq!(tokens[3].position, Position { line: 2, column: 3 });
    }

    #[test]
    fn test_errors() {
        let err = tokenize("(display \"abc").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.position, Position { line: 1, column: 10 });
        assert_eq!(tokenize(r#""\q""#).unwrap_err().kind, LexErrorKind::UnknownEscape('q'));
        assert_eq!(tokenize("#x").unwrap_err().kind, LexErrorKind::InvalidToken);
    }
}
