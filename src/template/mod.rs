//! Compiled templates, template loading and inheritance
//!
//! A template is parsed once into an immutable tree and may be rendered any
//! number of times. Named templates are resolved through a
//! [`TemplateRegistry`], which compiles sources fetched by a
//! [`TemplateLoader`] on first use.
//!
//! # Example
//!
//! ```text
//! // base.qt
//! @section summary(overridable=true)
//! Base
//! @end
//!
//! // child.qt
//! @extends "base"
//! @section summary(prepend=true)
//! Top
//! @end
//! ```

pub mod inherit;
mod registry;

pub use inherit::{OverrideChain, OverrideMap, OverrideMode, SectionOverride, SectionScope};
pub use registry::{FileLoader, MemoryLoader, TemplateError, TemplateLoader, TemplateRegistry};

use crate::parser::ast::DirectiveNode;

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Registry name, `None` for templates compiled from an inline source
    pub name: Option<String>,
    pub root: DirectiveNode,
}

impl Template {
    pub fn new(name: Option<String>, root: DirectiveNode) -> Self {
        Self { name, root }
    }

    /// Name used in diagnostics
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<inline>")
    }

    /// The top-level `@extends` directive, if any
    pub fn extends(&self) -> Option<&DirectiveNode> {
        self.root.directives().find(|d| d.is("extends"))
    }

    /// Top-level `@section` directives in document order
    pub fn sections(&self) -> impl Iterator<Item = &DirectiveNode> {
        self.root.directives().filter(|d| d.is("section"))
    }
}
