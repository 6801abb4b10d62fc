//! Error types for compilation, rendering and validation

use std::collections::BTreeMap;
use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// A lexer, parser or expression-syntax failure. Always fatal to compilation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at line {line}, column {column}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize, span: Span) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn report(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let start = self.span.start.min(source.len());
        let end = self.span.end.clamp(start, source.len());

        let written = Report::build(ReportKind::Error, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// A failure while executing a directive or resolving a collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    /// Free-form diagnostics, e.g. `directive`, `args`, `section`, `template`
    pub context: BTreeMap<String, String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(|s| s.as_str())
    }

    /// Whether the dispatcher has already attributed this error to a directive
    pub fn is_attributed(&self) -> bool {
        self.context.contains_key("directive")
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.context("directive"), self.context("args")) {
            (Some(name), Some(args)) if !args.is_empty() => {
                write!(f, "error in @{} {}: {}", name, args, self.message)
            }
            (Some(name), _) => write!(f, "error in @{}: {}", name, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// A single structural problem found by the validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Every problem found by [`crate::validate::assert_valid`]
#[derive(Error, Debug, Clone, PartialEq)]
#[error("template is invalid: {}", format_issues(.errors))]
pub struct ValidationError {
    pub errors: Vec<ValidationIssue>,
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Shorthand for a context-free runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError::new(message))
    }

    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime(e) => Some(e),
            _ => None,
        }
    }
}
