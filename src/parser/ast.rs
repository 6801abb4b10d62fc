//! Token and syntax tree types for the template language

use std::fmt;

use serde_json::Value;

use crate::expr::Condition;
use crate::parser::args::{EachArgs, ExampleArgs, SectionArgs};

pub use crate::error::Span;

/// Name of the synthetic root node every template parses into
pub const ROOT: &str = "template";

/// Line/column of a token or node, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position of a byte offset inside text that starts at `self`
    pub fn advance_within(self, text: &str, offset: usize) -> Position {
        let prefix = &text[..offset.min(text.len())];
        match prefix.rfind('\n') {
            Some(nl) => Position {
                line: self.line + prefix.matches('\n').count(),
                column: prefix[nl + 1..].chars().count() + 1,
            },
            None => Position {
                line: self.line,
                column: self.column + prefix.chars().count(),
            },
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of literal text (escapes already expanded)
    Text,
    /// `@{path}`, text is the trimmed inner path
    Variable,
    /// `@name` for a registered directive
    Directive,
    /// The universal block terminator `@end`
    End,
    /// Quoted string in a directive header, text is unescaped
    String,
    /// `==`, `!=`, `>=`, `<=`, `>`, `<`
    Operator,
    /// A bare `=`
    Assign,
    ParenOpen,
    ParenClose,
    Comma,
    Colon,
    /// Any other run of header characters (identifiers, paths, numbers)
    Word,
    Newline,
    Eof,
}

/// A position-tagged token. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl Token {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Whether this is the keyword token for directive `name`
    pub fn is_directive(&self, name: &str) -> bool {
        self.kind == TokenKind::Directive && self.text == name
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {:?} {:?}", self.line, self.column, self.kind, self.text)
    }
}

/// Arguments of a directive, parsed once by the directive itself during parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    None,
    /// `@if`, `@elif`, `@unless`
    Condition(Condition),
    /// `@each item, index in path`
    Each(EachArgs),
    /// `@switch path`
    Switch(String),
    /// `@case` inside a switch: the literals it matches
    Case(Vec<Value>),
    /// `@case` inside examples
    Example(ExampleArgs),
    /// `@section name(attrs)`
    Section(SectionArgs),
    /// `@include` / `@extends` target name
    Target(String),
}

/// A directive occurrence with its own children
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    pub name: String,
    /// Unparsed argument text between the keyword and the end of the header
    pub raw_args: String,
    pub args: Args,
    pub children: Vec<Node>,
    pub position: Position,
}

impl DirectiveNode {
    /// The synthetic root node of a template
    pub fn root(children: Vec<Node>) -> Self {
        Self {
            name: ROOT.to_string(),
            raw_args: String::new(),
            args: Args::None,
            children,
            position: Position::new(1, 1),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Directive children, skipping text and variables
    pub fn directives(&self) -> impl Iterator<Item = &DirectiveNode> {
        self.children.iter().filter_map(Node::as_directive)
    }

    /// Split children into the directive's own leading body and the sibling
    /// branches that follow it (e.g. `elif`/`else` for `if`)
    pub fn split_branches(&self, siblings: &[&str]) -> (&[Node], &[Node]) {
        let index = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Directive(d) if siblings.contains(&d.name.as_str())))
            .unwrap_or(self.children.len());
        self.children.split_at(index)
    }
}

/// `@{path}` occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub path: String,
    pub position: Position,
}

/// Syntax tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Variable(Variable),
    Directive(DirectiveNode),
}

impl Node {
    pub fn as_directive(&self) -> Option<&DirectiveNode> {
        match self {
            Node::Directive(d) => Some(d),
            _ => None,
        }
    }
}

/// Append a node, merging consecutive text runs into one
pub fn append_node(children: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node {
        if let Some(Node::Text(last)) = children.last_mut() {
            last.push_str(text);
            return;
        }
    }
    children.push(node);
}
