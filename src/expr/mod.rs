//! Condition expressions used by `@if`, `@elif` and `@unless`
//!
//! A condition is checked for balanced parentheses when the template is
//! parsed. Everything else (operator placement, paths) is reported when the
//! condition is evaluated, so the rendering policy decides whether a bad
//! condition is fatal or simply false.

pub mod eval;
pub mod grammar;
pub mod lexer;

use chumsky::prelude::*;
use logos::Logos;
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, RuntimeError, SyntaxError};
use crate::parser::ast::Position;

pub use grammar::{CompareOp, Expr};
use lexer::ExprToken;

/// A condition that could not be compiled or evaluated
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ExprError {
    pub message: String,
}

impl ExprError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Check that parentheses in a raw condition are balanced
///
/// Parentheses inside quoted strings are ignored. Reports the first `)`
/// without a partner, or the earliest `(` left open.
pub fn check_parens(raw: &str, at: Position) -> Result<(), SyntaxError> {
    let mut open: Vec<usize> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in raw.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => open.push(offset),
            ')' if open.pop().is_none() => {
                let pos = at.advance_within(raw, offset);
                return Err(SyntaxError::new(
                    format!("Unmatched ')' in condition '{}'", raw),
                    pos.line,
                    pos.column,
                    offset..offset + 1,
                ));
            }
            _ => {}
        }
    }

    match open.first() {
        Some(&offset) => {
            let pos = at.advance_within(raw, offset);
            Err(SyntaxError::new(
                format!("Unmatched '(' in condition '{}'", raw),
                pos.line,
                pos.column,
                offset..offset + 1,
            ))
        }
        None => Ok(()),
    }
}

/// Compile a condition string into an expression tree
pub fn compile(raw: &str) -> Result<Expr, ExprError> {
    if raw.trim().is_empty() {
        return Err(ExprError::new("Empty condition"));
    }

    let mut tokens = Vec::new();
    for (result, span) in ExprToken::lexer(raw).spanned() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => {
                return Err(ExprError::new(format!(
                    "Unexpected '{}' in condition '{}'",
                    &raw[span],
                    raw
                )))
            }
        }
    }

    let result = grammar::expr_parser()
        .then_ignore(end())
        .parse(tokens.as_slice())
        .into_result()
        .map_err(|errs| {
            let detail = errs
                .first()
                .map(|e| match e.found() {
                    Some(token) => format!("unexpected {:?}", token),
                    None => "unexpected end of condition".to_string(),
                })
                .unwrap_or_else(|| "could not be parsed".to_string());
            ExprError::new(format!("Invalid condition '{}': {}", raw, detail))
        });
    result
}

/// A parsed directive condition
///
/// The expression is compiled once; a compile failure is kept and reported
/// on every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    compiled: Result<Expr, ExprError>,
}

impl Condition {
    /// Parse a condition found at `at` in the template
    pub fn parse(raw: &str, at: Position) -> Result<Self, SyntaxError> {
        check_parens(raw, at)?;
        Ok(Self {
            source: raw.to_string(),
            compiled: compile(raw),
        })
    }

    /// The condition as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, data: &Value) -> Result<bool, ExprError> {
        let expr = self.compiled.as_ref().map_err(Clone::clone)?;
        Ok(eval::truthy(eval::evaluate(expr, data)?.as_ref()))
    }
}

/// Evaluate a condition string against data in one step
pub fn evaluate(expression: &str, data: &Value) -> Result<bool, Error> {
    let condition = Condition::parse(expression, Position::new(1, 1))?;
    condition.evaluate(data).map_err(|e| {
        Error::Runtime(RuntimeError::new(e.message).with_context("condition", expression))
    })
}
