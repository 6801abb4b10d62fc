//! Lexer and parser for quill templates

pub mod args;
pub mod ast;
pub mod grammar;
pub mod lexer;

pub use ast::{Args, DirectiveNode, Node, Position, Token, TokenKind, Variable};
pub use grammar::{parse, ParserHandle};
pub use lexer::tokenize;
