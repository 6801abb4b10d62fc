//! Directive behaviours and the registry the lexer, parser and renderer
//! consult
//!
//! Every directive is a [`Directive`] trait object registered by name. The
//! parser asks it for its [`Descriptor`] and lets it parse its own arguments
//! and sibling keywords; the renderer asks it to [`Directive::execute`].

mod conditional;
mod each;
mod examples;
mod section;
mod switch;
mod template;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, SyntaxError};
use crate::parser::args::expect_empty;
use crate::parser::ast::{Args, DirectiveNode, Node, Position, TokenKind};
use crate::parser::grammar::ParserHandle;
use crate::render::RenderContext;

pub use conditional::{If, Unless};
pub use each::Each;
pub use examples::Examples;
pub use section::Section;
pub use switch::Switch;
pub use template::{Extends, Include};

/// Structural behaviour of a directive, as seen by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// A body follows the header (block closed by `@end`, or inline)
    pub has_body: bool,
    /// Only allowed outside every other directive
    pub requires_top_level: bool,
    /// At most one occurrence per template
    pub unique: bool,
    /// Keywords parsed by this directive inside its own body
    pub siblings: &'static [&'static str],
    /// Only valid as another directive's sibling
    pub sibling_only: bool,
}

impl Descriptor {
    /// A directive with a body
    pub const fn block() -> Self {
        Self {
            has_body: true,
            requires_top_level: false,
            unique: false,
            siblings: &[],
            sibling_only: false,
        }
    }

    /// A directive without a body
    pub const fn leaf() -> Self {
        Self {
            has_body: false,
            ..Self::block()
        }
    }

    /// A keyword that only appears as a sibling inside another directive
    pub const fn sibling() -> Self {
        Self {
            sibling_only: true,
            ..Self::block()
        }
    }

    pub const fn with_siblings(mut self, siblings: &'static [&'static str]) -> Self {
        self.siblings = siblings;
        self
    }

    pub const fn top_level(mut self) -> Self {
        self.requires_top_level = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Nodes to render for a directive and the data to render them with
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<'n> {
    pub nodes: &'n [Node],
    /// Replacement data context; `None` keeps the current one
    pub data: Option<Value>,
}

impl<'n> Branch<'n> {
    pub fn new(nodes: &'n [Node]) -> Self {
        Self { nodes, data: None }
    }

    pub fn with_data(nodes: &'n [Node], data: Value) -> Self {
        Self {
            nodes,
            data: Some(data),
        }
    }
}

/// Result of executing a directive
#[derive(Debug, Clone, PartialEq)]
pub enum Execution<'n> {
    /// Finished output
    Text(String),
    /// Child nodes the renderer should render, in order
    Render(Vec<Branch<'n>>),
}

impl<'n> Execution<'n> {
    /// Render nothing
    pub fn nothing() -> Self {
        Execution::Text(String::new())
    }

    /// Render one set of children with the current data
    pub fn render(nodes: &'n [Node]) -> Self {
        Execution::Render(vec![Branch::new(nodes)])
    }
}

/// A directive behaviour
pub trait Directive: Send + Sync {
    fn name(&self) -> &str;

    fn descriptor(&self) -> Descriptor;

    /// Whether the next directive keyword ends this directive's block body
    /// without an `@end`
    fn should_terminate_body(&self, _name: &str) -> bool {
        false
    }

    /// Parse a sibling keyword found in this directive's body and append
    /// the result to `children`. Returns `false` to decline.
    fn handle_child(
        &self,
        _name: &str,
        _parser: &mut dyn ParserHandle,
        _children: &mut Vec<Node>,
    ) -> Result<bool, SyntaxError> {
        Ok(false)
    }

    /// Parse the raw argument text once, at parse time
    fn parse_args(&self, _raw: &str, _at: Position) -> Result<Args, SyntaxError> {
        Ok(Args::None)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error>;
}

/// Keyword that is parsed by its owning directive (`elif`, `else`, `case`,
/// `default`). Executing one directly is never valid.
#[derive(Debug)]
pub struct SiblingKeyword {
    name: &'static str,
}

impl SiblingKeyword {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Directive for SiblingKeyword {
    fn name(&self) -> &str {
        self.name
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::sibling()
    }

    fn execute<'n>(
        &self,
        _node: &'n DirectiveNode,
        _ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        Err(Error::runtime(format!(
            "'@{}' can only be rendered by its owning directive",
            self.name
        )))
    }
}

/// Parse one sibling branch: its keyword, header and body up to the next
/// sibling keyword or `@end` (which is left for the owner)
pub fn parse_sibling<F>(
    parser: &mut dyn ParserHandle,
    siblings: &[&str],
    parse_args: F,
) -> Result<DirectiveNode, SyntaxError>
where
    F: FnOnce(&str, Position) -> Result<Args, SyntaxError>,
{
    let keyword = parser.advance();
    let header = parser.read_header()?;
    let args = parse_args(&header.raw_args, header.position)?;

    let children = if header.inline {
        parser.parse_inline_body()?
    } else {
        let mut children = Vec::new();
        loop {
            let next = parser.peek();
            let stop = match next.kind {
                TokenKind::End | TokenKind::Eof => true,
                TokenKind::Directive => siblings.contains(&next.text.as_str()),
                _ => false,
            };
            if stop {
                break;
            }
            parser.parse_statement(&mut children)?;
        }
        children
    };

    Ok(DirectiveNode {
        name: keyword.text.clone(),
        raw_args: header.raw_args,
        args,
        children,
        position: keyword.position(),
    })
}

/// Reject a branch that follows the catch-all branch (`else`, `default`)
pub fn ensure_last_branch(
    parser: &dyn ParserHandle,
    children: &[Node],
    catch_all: &str,
    owner: &str,
) -> Result<(), SyntaxError> {
    let closed = children
        .iter()
        .any(|n| matches!(n, Node::Directive(d) if d.is(catch_all)));
    if closed {
        let token = parser.peek();
        return Err(SyntaxError::new(
            format!(
                "'@{}' must be the last branch of '@{}'",
                catch_all, owner
            ),
            token.line,
            token.column,
            token.span.clone(),
        ));
    }
    Ok(())
}

/// Argument parser for a catch-all branch that takes none
pub fn no_args(name: &str) -> impl FnOnce(&str, Position) -> Result<Args, SyntaxError> + '_ {
    move |raw, at| expect_empty(raw, at, name).map(|_| Args::None)
}

/// Registry of directive behaviours, keyed by name
#[derive(Clone)]
pub struct DirectiveRegistry {
    directives: HashMap<String, Arc<dyn Directive>>,
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.directives.keys().collect();
        names.sort();
        f.debug_struct("DirectiveRegistry")
            .field("directives", &names)
            .finish()
    }
}

impl DirectiveRegistry {
    /// A registry without any directives
    pub fn empty() -> Self {
        Self {
            directives: HashMap::new(),
        }
    }

    /// The built-in directive set
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(If);
        registry.register(Unless);
        registry.register(Each);
        registry.register(Switch);
        registry.register(Examples);
        registry.register(Section);
        registry.register(Include);
        registry.register(Extends);
        for keyword in ["elif", "else", "case", "default"] {
            registry.register(SiblingKeyword::new(keyword));
        }
        registry
    }

    /// Add or replace a directive
    pub fn register(&mut self, directive: impl Directive + 'static) {
        self.directives
            .insert(directive.name().to_string(), Arc::new(directive));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Directive>> {
        self.directives.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// Directives that declare `keyword` as a sibling, sorted by name
    pub fn owners_of(&self, keyword: &str) -> Vec<String> {
        let mut owners: Vec<String> = self
            .directives
            .values()
            .filter(|d| d.descriptor().siblings.contains(&keyword))
            .map(|d| d.name().to_string())
            .collect();
        owners.sort();
        owners
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.directives.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// The parsed arguments a directive expects, or a runtime error
pub(crate) fn missing_args(node: &DirectiveNode) -> Error {
    Error::runtime(format!("'@{}' is missing its parsed arguments", node.name))
}
