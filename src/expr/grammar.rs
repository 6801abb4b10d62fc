//! Condition grammar using chumsky
//!
//! Precedence, lowest first: `or`, `and`, prefix `not`, comparison
//! (`==` `!=` `<` `<=` `>` `>=` `in`), atoms.

use chumsky::input::ValueInput;
use chumsky::prelude::*;
use serde_json::Value;

use crate::expr::lexer::ExprToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

pub(crate) fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, ExprToken>>> + Clone
where
    I: ValueInput<'a, Token = ExprToken, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            ExprToken::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExprToken::Str(s) => Value::String(s),
            ExprToken::True => Value::Bool(true),
            ExprToken::False => Value::Bool(false),
            ExprToken::Null => Value::Null,
        };

        let atom = choice((
            literal.map(Expr::Literal),
            select! { ExprToken::Path(p) => Expr::Path(p) },
            expr.delimited_by(just(ExprToken::LParen), just(ExprToken::RParen)),
        ))
        .boxed();

        let op = select! {
            ExprToken::Eq => CompareOp::Eq,
            ExprToken::Ne => CompareOp::Ne,
            ExprToken::Lt => CompareOp::Lt,
            ExprToken::Le => CompareOp::Le,
            ExprToken::Gt => CompareOp::Gt,
            ExprToken::Ge => CompareOp::Ge,
            ExprToken::In => CompareOp::In,
        };

        let comparison = atom
            .clone()
            .then(op.then(atom).or_not())
            .map(|(left, rest)| match rest {
                Some((op, right)) => Expr::Compare(Box::new(left), op, Box::new(right)),
                None => left,
            })
            .boxed();

        let not = recursive(|not| {
            just(ExprToken::Not)
                .ignore_then(not)
                .map(|e| Expr::Not(Box::new(e)))
                .or(comparison)
        })
        .boxed();

        let and = not
            .clone()
            .then(just(ExprToken::And).ignore_then(not).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |l, r| Expr::And(Box::new(l), Box::new(r)))
            })
            .boxed();

        and.clone()
            .then(just(ExprToken::Or).ignore_then(and).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |l, r| Expr::Or(Box::new(l), Box::new(r)))
            })
    })
}
