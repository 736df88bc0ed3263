use std::rc::Rc;

use phf::phf_map;

use crate::interpreter::cps::value::{Exprs, Lambda, Symbol, Value};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Keyword {
    If,
    Cond,
    Let,
    Letrec,
    Lambda,
    Define,
    Set,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
    Begin,
    And,
    Or,
}

pub static SPECIAL_FORMS: phf::Map<&'static str, Keyword> = phf_map! {
    "if" => Keyword::If,
    "cond" => Keyword::Cond,
    "let" => Keyword::Let,
    "letrec" => Keyword::Letrec,
    "lambda" => Keyword::Lambda,
    "λ" => Keyword::Lambda,
    "define" => Keyword::Define,
    "set!" => Keyword::Set,
    "quote" => Keyword::Quote,
    "quasiquote" => Keyword::Quasiquote,
    "unquote" => Keyword::Unquote,
    "unquote-splicing" => Keyword::UnquoteSplicing,
    "begin" => Keyword::Begin,
    "and" => Keyword::And,
    "or" => Keyword::Or,
};

pub struct Binding {
    pub name: Symbol,
    pub init: Value,
}

pub struct LetForm {
    pub bindings: Vec<Binding>,
    pub body: Exprs,
}

pub struct CondClause {
    pub test: Value,
    /// Empty when the clause is just a test.
    pub body: Exprs,
}

/// Analysed special-form nodes. Dispatch happens on these, never on the
/// runtime value of an operator.
pub enum SpecialForm {
    If {
        predicate: Value,
        consequent: Value,
        alternative: Value,
    },
    Cond(Rc<[CondClause]>),
    Let(Rc<LetForm>),
    Letrec(Rc<LetForm>),
    Lambda(Rc<Lambda>),
    Define {
        name: Symbol,
        value: Value,
    },
    DefineProc {
        name: Symbol,
        lambda: Rc<Lambda>,
    },
    Set {
        name: Symbol,
        value: Value,
    },
    Quote(Value),
    Quasiquote(Value),
    Unquote(Value),
    Begin(Exprs),
    And(Exprs),
    Or(Exprs),
}

impl SpecialForm {
    pub fn keyword(&self) -> &'static str {
        match self {
            SpecialForm::If { .. } => "if",
            SpecialForm::Cond(_) => "cond",
            SpecialForm::Let(_) => "let",
            SpecialForm::Letrec(_) => "letrec",
            SpecialForm::Lambda(_) => "lambda",
            SpecialForm::Define { .. } | SpecialForm::DefineProc { .. } => "define",
            SpecialForm::Set { .. } => "set!",
            SpecialForm::Quote(_) => "quote",
            SpecialForm::Quasiquote(_) => "quasiquote",
            SpecialForm::Unquote(_) => "unquote",
            SpecialForm::Begin(_) => "begin",
            SpecialForm::And(_) => "and",
            SpecialForm::Or(_) => "or",
        }
    }
}
