//! Turns read data into evaluable expressions.
//!
//! Lists headed by a keyword become special-form nodes, other lists become
//! combinations, everything else stands for itself. Runs once per top-level
//! form, and again at runtime for `eval`.

use std::collections::HashSet;
use std::rc::Rc;

use crate::interpreter::cps::list::{self, ListShape};
use crate::interpreter::cps::special::{Binding, CondClause, Keyword, LetForm, SpecialForm, SPECIAL_FORMS};
use crate::interpreter::cps::value::{Combination, Exprs, Lambda, Pair, Symbol, Value};
use crate::interpreter::cps::RuntimeError;
use crate::runtime_error;

pub fn analyze(datum: &Value) -> Result<Value, RuntimeError> {
    match datum {
        Value::Pair(pair) => analyze_list(pair),
        Value::EmptyList => Ok(Value::Combination(Rc::new(Combination {
            exprs: Rc::from(Vec::new()),
            position: None,
        }))),
        _ => Ok(datum.clone()),
    }
}

/// Analyses every datum of a program, stopping at the first malformed one.
pub fn analyze_program(data: &[Value]) -> Result<Vec<Value>, RuntimeError> { data.iter().map(analyze).collect() }

fn analyze_list(pair: &Rc<Pair>) -> Result<Value, RuntimeError> {
    let head = Value::Pair(pair.clone());
    let items: Vec<Value> = match list::shape(&head) {
        ListShape::Proper(_) => list::iter(&head).collect(),
        _ => runtime_error!(MalformedSpecialForm, "combination must be a proper list: {}", head),
    };
    let position = pair.position().or(match items[0] {
        Value::Symbol(ref s) => s.position(),
        _ => None,
    });
    if let Value::Symbol(ref s) = items[0] {
        if let Some(keyword) = SPECIAL_FORMS.get(s.name()) {
            let form = analyze_special(*keyword, &items[1..]).map_err(|e| e.at(position))?;
            return Ok(Value::SpecialForm(Rc::new(form)));
        }
    }
    Ok(Value::Combination(Rc::new(Combination {
        exprs: analyze_body(&items)?,
        position,
    })))
}

fn analyze_body(exprs: &[Value]) -> Result<Exprs, RuntimeError> {
    let analysed = exprs.iter().map(analyze).collect::<Result<Vec<Value>, RuntimeError>>()?;
    Ok(analysed.into())
}

fn analyze_optional(expr: Option<&Value>) -> Result<Value, RuntimeError> {
    match expr {
        Some(expr) => analyze(expr),
        None => Ok(Value::Unassigned),
    }
}

fn expect_symbol(who: &str, datum: &Value) -> Result<Symbol, RuntimeError> {
    match datum {
        Value::Symbol(s) => Ok(s.clone()),
        _ => runtime_error!(MalformedSpecialForm, "{}: expected an identifier, but was given {}", who, datum),
    }
}

fn analyze_special(keyword: Keyword, operands: &[Value]) -> Result<SpecialForm, RuntimeError> {
    let form = match keyword {
        Keyword::If => {
            if !(2..=3).contains(&operands.len()) {
                runtime_error!(MalformedSpecialForm, "(if predicate consequent [alternative])")
            }
            SpecialForm::If {
                predicate: analyze(&operands[0])?,
                consequent: analyze(&operands[1])?,
                alternative: analyze_optional(operands.get(2))?,
            }
        }
        Keyword::Cond => {
            if operands.is_empty() {
                runtime_error!(MalformedSpecialForm, "(cond clause ...) needs at least one clause")
            }
            let clauses = operands.iter().map(analyze_clause).collect::<Result<Vec<CondClause>, RuntimeError>>()?;
            SpecialForm::Cond(clauses.into())
        }
        Keyword::Let | Keyword::Letrec => {
            let who = if keyword == Keyword::Let { "let" } else { "letrec" };
            if operands.len() < 2 {
                runtime_error!(MalformedSpecialForm, "({} ((name expr) ...) body ...)", who)
            }
            let form = Rc::new(LetForm {
                bindings: analyze_bindings(who, &operands[0])?,
                body: analyze_body(&operands[1..])?,
            });
            if keyword == Keyword::Let {
                SpecialForm::Let(form)
            } else {
                SpecialForm::Letrec(form)
            }
        }
        Keyword::Lambda => {
            if operands.len() < 2 {
                runtime_error!(MalformedSpecialForm, "(lambda formals body ...)")
            }
            SpecialForm::Lambda(analyze_lambda(None, &operands[0], &operands[1..])?)
        }
        Keyword::Define => match operands.first() {
            Some(Value::Symbol(name)) => {
                if operands.len() > 2 {
                    runtime_error!(MalformedSpecialForm, "(define {} [expr]) takes one expression", name)
                }
                SpecialForm::Define {
                    name: name.clone(),
                    value: analyze_optional(operands.get(1))?,
                }
            }
            Some(Value::Pair(signature)) => {
                let name = expect_symbol("define", &signature.car())?;
                if operands.len() < 2 {
                    runtime_error!(MalformedSpecialForm, "(define ({} . formals) body ...) needs a body", name)
                }
                let lambda = analyze_lambda(Some(&name), &signature.cdr(), &operands[1..])?;
                SpecialForm::DefineProc { name, lambda }
            }
            _ => runtime_error!(MalformedSpecialForm, "(define name [expr]) or (define (name . formals) body ...)"),
        },
        Keyword::Set => {
            if !(1..=2).contains(&operands.len()) {
                runtime_error!(MalformedSpecialForm, "(set! name [expr])")
            }
            SpecialForm::Set {
                name: expect_symbol("set!", &operands[0])?,
                value: analyze_optional(operands.get(1))?,
            }
        }
        Keyword::Quote | Keyword::Quasiquote | Keyword::Unquote => {
            if operands.len() != 1 {
                runtime_error!(MalformedSpecialForm, "{:?} takes exactly one datum", keyword)
            }
            match keyword {
                Keyword::Quote => SpecialForm::Quote(operands[0].clone()),
                Keyword::Quasiquote => SpecialForm::Quasiquote(template(&operands[0])?),
                _ => SpecialForm::Unquote(analyze(&operands[0])?),
            }
        }
        Keyword::UnquoteSplicing => runtime_error!(MalformedSpecialForm, "unquote-splicing is not supported"),
        Keyword::Begin => {
            if operands.is_empty() {
                runtime_error!(MalformedSpecialForm, "(begin expr ...) needs at least one expression")
            }
            SpecialForm::Begin(analyze_body(operands)?)
        }
        Keyword::And => SpecialForm::And(analyze_body(operands)?),
        Keyword::Or => SpecialForm::Or(analyze_body(operands)?),
    };
    Ok(form)
}

fn analyze_clause(clause: &Value) -> Result<CondClause, RuntimeError> {
    let parts = match clause {
        Value::Pair(_) if list::is_proper(clause) => list::iter(clause).collect::<Vec<Value>>(),
        _ => runtime_error!(MalformedSpecialForm, "cond clause must be a non-empty list, but was {}", clause),
    };
    let test = match parts[0] {
        Value::Symbol(ref s) if s.name() == "else" => Value::Boolean(true),
        ref test => analyze(test)?,
    };
    Ok(CondClause {
        test,
        body: analyze_body(&parts[1..])?,
    })
}

fn analyze_bindings(who: &str, bindings: &Value) -> Result<Vec<Binding>, RuntimeError> {
    let bindings = match list::to_vec(who, bindings) {
        Ok(bindings) => bindings,
        Err(_) => runtime_error!(MalformedSpecialForm, "{}: bindings must be a list, but was {}", who, bindings),
    };
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(bindings.len());
    for binding in bindings.iter() {
        let parts = match list::shape(binding) {
            ListShape::Proper(2) => list::iter(binding).collect::<Vec<Value>>(),
            _ => runtime_error!(MalformedSpecialForm, "{}: binding must be (name expr), but was {}", who, binding),
        };
        let name = expect_symbol(who, &parts[0])?;
        if !seen.insert(name.name().to_string()) {
            runtime_error!(MalformedSpecialForm, "{}: duplicate binding for {}", who, name)
        }
        out.push(Binding {
            name,
            init: analyze(&parts[1])?,
        });
    }
    Ok(out)
}

// Proper list of names, dotted list of names, or a lone name that takes everything.
fn analyze_formals(formals: &Value) -> Result<(Vec<Symbol>, bool), RuntimeError> {
    if list::shape(formals) == ListShape::Circular {
        runtime_error!(MalformedSpecialForm, "lambda: circular formals")
    }
    let mut names = Vec::new();
    let mut current = formals.clone();
    let dotted = loop {
        let next = match current {
            Value::EmptyList => break false,
            Value::Symbol(ref s) => {
                names.push(s.clone());
                break true;
            }
            Value::Pair(ref pair) => {
                names.push(expect_symbol("lambda", &pair.car())?);
                pair.cdr()
            }
            _ => runtime_error!(MalformedSpecialForm, "lambda: bad formals {}", formals),
        };
        current = next;
    };
    let mut seen = HashSet::new();
    for name in names.iter() {
        if !seen.insert(name.name()) {
            runtime_error!(MalformedSpecialForm, "lambda: duplicate formal {}", name)
        }
    }
    Ok((names, dotted))
}

fn analyze_lambda(name: Option<&Symbol>, formals: &Value, body: &[Value]) -> Result<Rc<Lambda>, RuntimeError> {
    let (formals, dotted) = analyze_formals(formals)?;
    Ok(Rc::new(Lambda {
        name: name.map(|s| s.name().into()),
        formals,
        dotted,
        body: analyze_body(body)?,
    }))
}

/// Copies a quasiquote template, replacing each `(unquote e)` with an
/// `Unquote` node holding the analysed `e`. The spine is walked in a loop;
/// only nested lists in car position recurse.
fn template(datum: &Value) -> Result<Value, RuntimeError> {
    if list::shape(datum) == ListShape::Circular {
        runtime_error!(MalformedSpecialForm, "quasiquote: circular template")
    }
    let mut items = Vec::new();
    let mut current = datum.clone();
    let tail = loop {
        let pair = match current {
            Value::Pair(ref pair) => pair.clone(),
            other => break other,
        };
        if let Some(node) = unquote(&pair)? {
            break node;
        }
        items.push(template(&pair.car())?);
        current = pair.cdr();
    };
    if items.is_empty() {
        return Ok(tail);
    }
    Ok(list::from_vec_with_tail(items, tail, None))
}

// `(unquote e)` in any position, including the tail of a dotted template.
fn unquote(pair: &Pair) -> Result<Option<Value>, RuntimeError> {
    let car = pair.car();
    let Value::Symbol(ref s) = car else { return Ok(None) };
    match SPECIAL_FORMS.get(s.name()) {
        Some(Keyword::Unquote) => {
            let args = list::to_vec("unquote", &pair.cdr())?;
            if args.len() != 1 {
                runtime_error!(MalformedSpecialForm, "Unquote takes exactly one datum")
            }
            Ok(Some(Value::SpecialForm(Rc::new(SpecialForm::Unquote(analyze(&args[0])?)))))
        }
        Some(Keyword::UnquoteSplicing) => runtime_error!(MalformedSpecialForm, "unquote-splicing is not supported"),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::cps::ErrorKind;
    use crate::reader::{parse_str, Position};

    fn analyze_str(src: &str) -> Result<Value, RuntimeError> {
        let data = parse_str(src).unwrap();
        analyze(&data[0])
    }

    fn form(src: &str) -> Rc<SpecialForm> {
        match analyze_str(src) {
            Ok(Value::SpecialForm(form)) => form,
            other => panic!("expected a special form for {}, got {:?}", src, other.map(|v| v.to_string())),
        }
    }

    fn malformed(src: &str) {
        match analyze_str(src) {
            Err(RuntimeError {
                kind: ErrorKind::MalformedSpecialForm(_),
                ..
            }) => (),
            other => panic!("expected {} to be malformed, got {:?}", src, other.map(|v| v.to_string())),
        }
    }

    #[test]
    fn test_combination() {
        match analyze_str("(f 1 (g 2))").unwrap() {
            Value::Combination(c) => {
                assert_eq!(c.exprs.len(), 3);
                assert!(matches!(c.exprs[2], Value::Combination(_)));
                assert_eq!(c.position, Some(Position { line: 1, column: 1 }));
            }
            _ => panic!("expected a combination"),
        }
        assert!(matches!(analyze_str("()").unwrap(), Value::Combination(ref c) if c.exprs.is_empty()));
        assert_eq!(analyze_str("42").unwrap(), Value::integer(42));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(form("(if 1 2)").keyword(), "if");
        assert!(matches!(*form("(if 1 2)"), SpecialForm::If { alternative: Value::Unassigned, .. }));
        assert_eq!(form("(λ (x) x)").keyword(), "lambda");
        assert!(matches!(*form("(define x)"), SpecialForm::Define { value: Value::Unassigned, .. }));
        assert!(matches!(*form("'(a b)"), SpecialForm::Quote(Value::Pair(_))));
        assert!(matches!(*form("(and)"), SpecialForm::And(ref exprs) if exprs.is_empty()));
    }

    #[test]
    fn test_lambda_formals() {
        let check = |src: &str, count: usize, dotted: bool| match *form(src) {
            SpecialForm::Lambda(ref l) => {
                assert_eq!(l.formals.len(), count, "{}", src);
                assert_eq!(l.dotted, dotted, "{}", src);
            }
            _ => panic!("expected lambda"),
        };
        check("(lambda () 1)", 0, false);
        check("(lambda (a b) 1)", 2, false);
        check("(lambda (a . rest) 1)", 2, true);
        check("(lambda args 1)", 1, true);
    }

    #[test]
    fn test_define_procedure() {
        match *form("(define (add a b) (+ a b))") {
            SpecialForm::DefineProc { ref name, ref lambda } => {
                assert_eq!(name.name(), "add");
                assert_eq!(lambda.name.as_deref(), Some("add"));
                assert_eq!(lambda.formals.len(), 2);
            }
            _ => panic!("expected a procedure definition"),
        }
    }

    #[test]
    fn test_cond_else() {
        match *form("(cond ((> x 1) 'big) (x) (else 'small))") {
            SpecialForm::Cond(ref clauses) => {
                assert_eq!(clauses.len(), 3);
                assert!(clauses[1].body.is_empty());
                assert_eq!(clauses[2].test, Value::Boolean(true));
            }
            _ => panic!("expected cond"),
        }
    }

    #[test]
    fn test_quasiquote_template() {
        match *form("`(1 ,x . ,y)") {
            SpecialForm::Quasiquote(ref t) => {
                let Value::Pair(ref first) = t else { panic!("expected a pair") };
                let Value::Pair(ref second) = first.cdr() else { panic!("expected a pair") };
                assert!(matches!(second.car(), Value::SpecialForm(ref f) if f.keyword() == "unquote"));
                assert!(matches!(second.cdr(), Value::SpecialForm(ref f) if f.keyword() == "unquote"));
            }
            _ => panic!("expected quasiquote"),
        }
    }

    #[test]
    fn test_malformed() {
        malformed("(if)");
        malformed("(if 1 2 3 4)");
        malformed("(let ((x)) x)");
        malformed("(let ((x 1) (x 2)) x)");
        malformed("(let ((x 1)))");
        malformed("(lambda (x 1) x)");
        malformed("(lambda (x x) x)");
        malformed("(lambda (x))");
        malformed("(define)");
        malformed("(define x 1 2)");
        malformed("(define (f))");
        malformed("(set! 1 2)");
        malformed("(quote)");
        malformed("(begin)");
        malformed("(cond)");
        malformed("(cond ())");
        malformed("`(1 ,@xs)");
        malformed("(f . x)");
    }

    #[test]
    fn test_long_quasiquote_template() {
        let items: Vec<Value> = (0..200_000).map(Value::integer).collect();
        let datum = Value::from_vec(vec![Value::symbol("quasiquote"), Value::from_vec(items)]);
        match analyze(&datum).unwrap() {
            Value::SpecialForm(ref f) => match **f {
                SpecialForm::Quasiquote(ref t) => assert_eq!(list::shape(t), ListShape::Proper(200_000)),
                _ => panic!("expected quasiquote"),
            },
            _ => panic!("expected a special form"),
        }
    }

    #[test]
    fn test_malformed_reports_position() {
        let err = analyze_str("\n  (if)").unwrap_err();
        assert_eq!(err.position, Some(Position { line: 2, column: 3 }));
    }
}
