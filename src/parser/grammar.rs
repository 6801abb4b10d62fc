//! Recursive-descent parser for template token streams
//!
//! The parser knows only the generic shape of directives: a header, then
//! either nothing, an inline body after `:`, or a block body closed by
//! `@end`. Sibling keywords such as `@elif` or `@case` are handed to the
//! owning directive through [`ParserHandle`], so new directive families
//! plug in without touching this file.

use std::collections::HashSet;
use std::sync::Arc;

use crate::directive::{Directive, DirectiveRegistry};
use crate::error::SyntaxError;
use crate::parser::ast::*;
use crate::parser::lexer::tokenize;

/// Header of a directive as read by [`ParserHandle::read_header`]
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Argument text as written, trimmed
    pub raw_args: String,
    /// The header ended with `:`, so an inline body follows
    pub inline: bool,
    /// Position of the first argument character
    pub position: Position,
}

/// The slice of the parser exposed to directives that parse sibling
/// keywords themselves
///
/// Sibling keywords are parsed by their owner, so besides the statement
/// operations the handle reads a header and an inline body the same way the
/// parser does for its own directives.
pub trait ParserHandle {
    /// Next token without consuming it
    fn peek(&self) -> &Token;

    /// Consume and return the next token
    fn advance(&mut self) -> Token;

    /// Whether the input is exhausted
    fn is_end(&self) -> bool;

    /// Parse one text, variable or directive statement into `children`
    fn parse_statement(&mut self, children: &mut Vec<Node>) -> Result<(), SyntaxError>;

    /// Parse a complete directive starting at its keyword token
    fn parse_directive(&mut self) -> Result<DirectiveNode, SyntaxError>;

    /// Consume a directive header following its keyword token
    fn read_header(&mut self) -> Result<Header, SyntaxError>;

    /// Parse the rest of the line after an inline `:`
    fn parse_inline_body(&mut self) -> Result<Vec<Node>, SyntaxError>;
}

/// Parse template source into a tree rooted at a synthetic `template` node
pub fn parse(
    source: &str,
    registry: &DirectiveRegistry,
    strict: bool,
) -> Result<DirectiveNode, SyntaxError> {
    let tokens = tokenize(source, registry, strict)?;
    parse_tokens(source, tokens, registry)
}

/// Parse tokens produced from `source` by [`tokenize`]
pub fn parse_tokens(
    source: &str,
    tokens: Vec<Token>,
    registry: &DirectiveRegistry,
) -> Result<DirectiveNode, SyntaxError> {
    Parser::new(source, tokens, registry).parse_template()
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    registry: &'a DirectiveRegistry,
    /// Number of enclosing directive bodies
    depth: usize,
    /// Number of enclosing inline bodies on the current line
    inline_depth: usize,
    unique_seen: HashSet<String>,
    eof: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>, registry: &'a DirectiveRegistry) -> Self {
        let end = source.len();
        let eof = tokens
            .last()
            .filter(|t| t.is(TokenKind::Eof))
            .cloned()
            .unwrap_or_else(|| Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line: 1,
                column: 1,
                span: end..end,
            });
        Self {
            source,
            tokens,
            pos: 0,
            registry,
            depth: 0,
            inline_depth: 0,
            unique_seen: HashSet::new(),
            eof,
        }
    }

    pub fn parse_template(mut self) -> Result<DirectiveNode, SyntaxError> {
        let mut children = Vec::new();
        while !self.is_end() {
            if self.peek().is(TokenKind::End) {
                let token = self.peek();
                return Err(error_at(
                    token,
                    "Unexpected '@end' without an open directive",
                ));
            }
            self.parse_statement(&mut children)?;
        }
        Ok(DirectiveNode::root(children))
    }

    fn lookup(&self, token: &Token) -> Result<Arc<dyn Directive>, SyntaxError> {
        self.registry
            .get(&token.text)
            .ok_or_else(|| error_at(token, format!("Unknown directive '@{}'", token.text)))
    }

    fn parse_block_body(
        &mut self,
        directive: &dyn Directive,
        keyword: &Token,
    ) -> Result<Vec<Node>, SyntaxError> {
        let saved_inline = std::mem::replace(&mut self.inline_depth, 0);
        self.depth += 1;
        let result = self.block_body(directive, keyword);
        self.depth -= 1;
        self.inline_depth = saved_inline;
        result
    }

    fn block_body(
        &mut self,
        directive: &dyn Directive,
        keyword: &Token,
    ) -> Result<Vec<Node>, SyntaxError> {
        let siblings = directive.descriptor().siblings;
        let mut children = Vec::new();

        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::End => {
                    self.advance();
                    if self.peek().is(TokenKind::Newline) {
                        self.advance();
                    }
                    return Ok(children);
                }
                TokenKind::Eof => {
                    return Err(error_at(
                        keyword,
                        format!(
                            "Unclosed '@{}' block: expected '@end' before end of input",
                            keyword.text
                        ),
                    ));
                }
                TokenKind::Directive if siblings.contains(&token.text.as_str()) => {
                    if !directive.handle_child(&token.text, self, &mut children)? {
                        return Err(error_at(
                            &token,
                            format!(
                                "'@{}' is not supported inside '@{}'",
                                token.text, keyword.text
                            ),
                        ));
                    }
                }
                TokenKind::Directive if directive.should_terminate_body(&token.text) => {
                    return Ok(children);
                }
                _ => self.parse_statement(&mut children)?,
            }
        }
    }

    fn inline_body(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut children = Vec::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Newline => {
                    // The line break belongs to the outermost inline body
                    if self.inline_depth == 1 {
                        self.advance();
                        append_node(&mut children, Node::Text(token.text));
                    }
                    return Ok(children);
                }
                TokenKind::End => {
                    self.advance();
                    return Ok(children);
                }
                TokenKind::Eof => return Ok(children),
                _ => self.parse_statement(&mut children)?,
            }
        }
    }
}

fn error_at(token: &Token, message: impl Into<String>) -> SyntaxError {
    SyntaxError::new(message, token.line, token.column, token.span.clone())
}

impl ParserHandle for Parser<'_> {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_end(&self) -> bool {
        self.peek().is(TokenKind::Eof)
    }

    fn parse_statement(&mut self, children: &mut Vec<Node>) -> Result<(), SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Text | TokenKind::Newline => {
                self.advance();
                append_node(children, Node::Text(token.text));
            }
            TokenKind::Variable => {
                self.advance();
                children.push(Node::Variable(Variable {
                    position: token.position(),
                    path: token.text,
                }));
            }
            TokenKind::Directive => {
                let node = self.parse_directive()?;
                children.push(Node::Directive(node));
            }
            TokenKind::End => {
                return Err(error_at(
                    &token,
                    "Unexpected '@end' without an open directive",
                ));
            }
            TokenKind::Eof => {}
            _ => {
                return Err(error_at(
                    &token,
                    format!("Unexpected '{}' outside a directive header", token.text),
                ));
            }
        }
        Ok(())
    }

    fn parse_directive(&mut self) -> Result<DirectiveNode, SyntaxError> {
        let keyword = self.advance();
        if !keyword.is(TokenKind::Directive) {
            return Err(error_at(&keyword, "Expected a directive"));
        }
        let directive = self.lookup(&keyword)?;
        let descriptor = directive.descriptor();

        if descriptor.sibling_only {
            let owners = self.registry.owners_of(&keyword.text);
            return Err(error_at(
                &keyword,
                format!(
                    "'@{}' is only valid inside {}",
                    keyword.text,
                    owners
                        .iter()
                        .map(|o| format!("'@{}'", o))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }
        if descriptor.requires_top_level && (self.depth > 0 || self.inline_depth > 0) {
            return Err(error_at(
                &keyword,
                format!("'@{}' must appear at the top level of a template", keyword.text),
            ));
        }
        if descriptor.unique && !self.unique_seen.insert(keyword.text.clone()) {
            return Err(error_at(
                &keyword,
                format!("'@{}' may only appear once per template", keyword.text),
            ));
        }

        let header = self.read_header()?;
        let args = directive.parse_args(&header.raw_args, header.position)?;

        let children = if descriptor.has_body {
            if header.inline {
                self.parse_inline_body()?
            } else {
                self.parse_block_body(directive.as_ref(), &keyword)?
            }
        } else {
            if header.inline {
                return Err(error_at(
                    &keyword,
                    format!("'@{}' does not take a body", keyword.text),
                ));
            }
            Vec::new()
        };

        Ok(DirectiveNode {
            name: keyword.text.clone(),
            raw_args: header.raw_args,
            args,
            children,
            position: keyword.position(),
        })
    }

    fn read_header(&mut self) -> Result<Header, SyntaxError> {
        let mut position = None;
        let mut span: Option<Span> = None;
        let mut depth = 0usize;
        let mut inline = false;

        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Colon if depth == 0 => {
                    self.advance();
                    inline = true;
                    break;
                }
                TokenKind::Text | TokenKind::Variable | TokenKind::Directive | TokenKind::End => {
                    break
                }
                _ => {
                    match token.kind {
                        TokenKind::ParenOpen => depth += 1,
                        TokenKind::ParenClose => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    position.get_or_insert(token.position());
                    span = Some(match span {
                        Some(s) => s.start..token.span.end,
                        None => token.span.clone(),
                    });
                    self.advance();
                }
            }
        }

        let raw_args = span
            .and_then(|s| self.source.get(s))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let position = position.unwrap_or_else(|| self.peek().position());
        Ok(Header {
            raw_args,
            inline,
            position,
        })
    }

    fn parse_inline_body(&mut self) -> Result<Vec<Node>, SyntaxError> {
        self.inline_depth += 1;
        self.depth += 1;
        let result = self.inline_body();
        self.depth -= 1;
        self.inline_depth -= 1;
        result
    }
}
