//! Tree-walking renderer
//!
//! The renderer walks a template tree, interpolates variables and hands
//! each directive node to its behaviour. A behaviour returns either final
//! text or the child branches to render; runtime errors coming out of a
//! directive are attributed to it once, with its name and raw arguments.

pub mod format;
pub mod resolve;

use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{Error, RuntimeError};
use crate::expr::Condition;
use crate::parser::ast::{DirectiveNode, Node, Variable};
use crate::template::{SectionScope, Template, TemplateError};
use crate::Engine;
use crate::directive::Execution;

use format::{Formatter, PlainFormatter, Section};
use resolve::{stringify, Reference};

/// State of one render call
pub struct Renderer<'e> {
    engine: &'e Engine,
    scope: SectionScope,
    /// Named templates being rendered, outermost first
    include_stack: Vec<String>,
}

impl<'e> Renderer<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            scope: SectionScope::new(engine.config().base_heading_level),
            include_stack: Vec::new(),
        }
    }

    /// Render a whole template
    ///
    /// A template that extends another renders only through its `@extends`
    /// directive; its other top-level content is not output.
    pub fn render(&mut self, template: &Template, data: &Value) -> Result<String, Error> {
        self.enter(template)?;
        let result = match template.extends() {
            Some(extends) => self.render_directive(template, extends, data),
            None => self.render_nodes(template, &template.root.children, data),
        };
        self.leave(template);
        result
    }

    fn enter(&mut self, template: &Template) -> Result<(), Error> {
        let Some(name) = &template.name else {
            return Ok(());
        };
        if self.include_stack.contains(name) {
            let chain = self
                .include_stack
                .iter()
                .chain(std::iter::once(name))
                .cloned()
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(TemplateError::CircularReference {
                name: name.clone(),
                chain,
            }
            .into());
        }
        let limit = self.engine.config().max_include_depth;
        if self.include_stack.len() >= limit {
            return Err(TemplateError::DepthExceeded {
                name: name.clone(),
                limit,
            }
            .into());
        }
        self.include_stack.push(name.clone());
        Ok(())
    }

    fn leave(&mut self, template: &Template) {
        if template.name.is_some() {
            self.include_stack.pop();
        }
    }

    pub fn render_nodes(
        &mut self,
        template: &Template,
        nodes: &[Node],
        data: &Value,
    ) -> Result<String, Error> {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Variable(variable) => out.push_str(&self.render_variable(variable, data)?),
                Node::Directive(directive) => {
                    out.push_str(&self.render_directive(template, directive, data)?)
                }
            }
        }
        Ok(out)
    }

    fn render_variable(&self, variable: &Variable, data: &Value) -> Result<String, Error> {
        let strict = self.engine.config().strict;
        let undefined = |message: String| -> Result<String, Error> {
            if strict {
                Err(RuntimeError::new(message)
                    .with_context("variable", variable.path.as_str())
                    .with_context("position", variable.position.to_string())
                    .into())
            } else {
                tracing::debug!(variable = %variable.path, "{}; rendering empty", message);
                Ok(String::new())
            }
        };

        match Reference::parse(&variable.path) {
            Ok(reference) => match reference.resolve(data) {
                Some(value) => Ok(stringify(&value)),
                None => undefined(format!("Undefined variable '{}'", variable.path)),
            },
            Err(e) => undefined(e.to_string()),
        }
    }

    fn render_directive(
        &mut self,
        template: &Template,
        node: &DirectiveNode,
        data: &Value,
    ) -> Result<String, Error> {
        let directive = self.engine.directives().get(&node.name).ok_or_else(|| {
            Error::Runtime(
                RuntimeError::new(format!("Unknown directive '@{}'", node.name))
                    .with_context("directive", node.name.as_str()),
            )
        })?;
        tracing::debug!(directive = %node.name, line = node.position.line, "executing directive");

        let execution = {
            let mut ctx = RenderContext {
                renderer: self,
                data,
                template,
            };
            directive.execute(node, &mut ctx)
        }
        .map_err(|e| attribute(e, node))?;

        match execution {
            Execution::Text(text) => Ok(text),
            Execution::Render(branches) => {
                let mut out = String::new();
                for branch in branches {
                    let data = branch.data.as_ref().unwrap_or(data);
                    let text = self
                        .render_nodes(template, branch.nodes, data)
                        .map_err(|e| attribute(e, node))?;
                    out.push_str(&text);
                }
                Ok(out)
            }
        }
    }
}

/// Attach directive name and raw arguments to an unattributed runtime error
fn attribute(err: Error, node: &DirectiveNode) -> Error {
    match err {
        Error::Runtime(e) if !e.is_attributed() => Error::Runtime(
            e.with_context("directive", node.name.as_str())
                .with_context("args", node.raw_args.as_str()),
        ),
        other => other,
    }
}

/// What a directive sees while it executes
pub struct RenderContext<'r, 'e> {
    renderer: &'r mut Renderer<'e>,
    data: &'r Value,
    template: &'r Template,
}

impl<'r, 'e> RenderContext<'r, 'e> {
    /// The current data context
    pub fn data(&self) -> &'r Value {
        self.data
    }

    /// The template the executing directive belongs to
    pub fn template(&self) -> &'r Template {
        self.template
    }

    pub fn engine(&self) -> &'e Engine {
        self.renderer.engine
    }

    pub fn config(&self) -> &'e EngineConfig {
        self.renderer.engine.config()
    }

    /// Section state threaded through the render call
    pub fn scope(&mut self) -> &mut SectionScope {
        &mut self.renderer.scope
    }

    /// Render nodes of the current template, with other data if given
    pub fn render(&mut self, nodes: &[Node], data: Option<&Value>) -> Result<String, Error> {
        let data = data.unwrap_or(self.data);
        self.renderer.render_nodes(self.template, nodes, data)
    }

    /// Compile and render a template source string
    pub fn render_source(&mut self, source: &str, data: Option<&Value>) -> Result<String, Error> {
        let template = self.engine().compile(source)?;
        let data = data.unwrap_or(self.data);
        self.renderer
            .render_nodes(&template, &template.root.children, data)
    }

    /// Render another template sharing this render call's section state
    pub fn render_template(
        &mut self,
        template: &Template,
        data: Option<&Value>,
    ) -> Result<String, Error> {
        let data = data.unwrap_or(self.data);
        self.renderer.render(template, data)
    }

    /// Render another template with fresh section state
    pub fn render_isolated(
        &mut self,
        template: &Template,
        data: Option<&Value>,
    ) -> Result<String, Error> {
        let level = self.renderer.scope.level;
        let outer = std::mem::replace(&mut self.renderer.scope, SectionScope::new(level));
        let result = self.render_template(template, data);
        self.renderer.scope = outer;
        result
    }

    /// Load a named template through the engine's registry
    pub fn load(&self, name: &str) -> Result<Arc<Template>, Error> {
        self.engine().load(name)
    }

    /// Evaluate a branch condition under the configured failure policy
    ///
    /// Strict rendering re-throws evaluation errors; otherwise the branch
    /// is treated as not matched.
    pub fn evaluate(&self, condition: &Condition, branch: &str) -> Result<bool, Error> {
        match condition.evaluate(self.data) {
            Ok(result) => Ok(result),
            Err(e) if self.config().strict => Err(RuntimeError::new(format!(
                "Failed to evaluate '@{}' condition '{}': {}",
                branch,
                condition.source(),
                e
            ))
            .with_context("branch", branch)
            .with_context("condition", condition.source())
            .into()),
            Err(e) => {
                tracing::debug!(
                    branch,
                    condition = condition.source(),
                    error = %e,
                    "condition failed to evaluate, treating as false"
                );
                Ok(false)
            }
        }
    }

    /// Format a section with the named formatter
    pub fn format_section(&self, format: &str, section: &Section) -> Result<String, Error> {
        match self.engine().formatters().get(format) {
            Some(formatter) => Ok(formatter.format_section(section)),
            None if self.config().strict => Err(RuntimeError::new(format!(
                "Unknown section format '{}'",
                format
            ))
            .with_context("section", section.name.as_str())
            .into()),
            None => {
                tracing::warn!(
                    format,
                    section = %section.name,
                    "unknown section format, rendering as plain text"
                );
                Ok(PlainFormatter.format_section(section))
            }
        }
    }
}
