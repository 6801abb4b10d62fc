//! Structural checks on compiled templates
//!
//! Runs after parsing, before any data is seen: empty or duplicate section
//! names, nesting deeper than the configured limit, malformed variable paths
//! and section formats no formatter is registered for.

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::error::{ValidationError, ValidationIssue};
use crate::parser::ast::{Args, DirectiveNode, Node, Position};
use crate::render::format::FormatterRegistry;
use crate::render::resolve::{Reference, VarPath};
use crate::template::Template;

/// Outcome of [`validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

/// Run every check on a template
pub fn validate(
    template: &Template,
    config: &EngineConfig,
    formatters: &FormatterRegistry,
) -> ValidationReport {
    let mut checker = Checker {
        config,
        formatters,
        errors: Vec::new(),
    };
    checker.check_children(&template.root.children, 0);
    ValidationReport {
        valid: checker.errors.is_empty(),
        errors: checker.errors,
    }
}

/// Like [`validate`], but fail with every problem found
pub fn assert_valid(
    template: &Template,
    config: &EngineConfig,
    formatters: &FormatterRegistry,
) -> Result<(), ValidationError> {
    let report = validate(template, config, formatters);
    if report.valid {
        Ok(())
    } else {
        Err(ValidationError {
            errors: report.errors,
        })
    }
}

struct Checker<'a> {
    config: &'a EngineConfig,
    formatters: &'a FormatterRegistry,
    errors: Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn issue(&mut self, at: Position, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            message: message.into(),
            line: at.line,
            column: at.column,
        });
    }

    fn check_children(&mut self, children: &[Node], depth: usize) {
        let mut seen = HashSet::new();
        for node in children {
            match node {
                Node::Text(_) => {}
                Node::Variable(variable) => {
                    if let Err(e) = Reference::parse(&variable.path) {
                        self.issue(variable.position, e.to_string());
                    }
                }
                Node::Directive(directive) => {
                    if let Args::Section(args) = &directive.args {
                        if !args.name.is_empty() && !seen.insert(args.name.as_str()) {
                            self.issue(
                                directive.position,
                                format!("Duplicate section '{}' at the same level", args.name),
                            );
                        }
                    }
                    self.check_directive(directive, depth + 1);
                }
            }
        }
    }

    fn check_directive(&mut self, node: &DirectiveNode, depth: usize) {
        if depth == self.config.max_nesting_depth + 1 {
            self.issue(
                node.position,
                format!(
                    "'@{}' is nested {} levels deep; the limit is {}",
                    node.name, depth, self.config.max_nesting_depth
                ),
            );
        }

        match &node.args {
            Args::Section(args) => {
                if args.name.trim().is_empty() {
                    self.issue(node.position, "Section has an empty name");
                }
                if let Some(format) = args.attributes.get("format") {
                    if !self.formatters.contains(format) {
                        self.issue(
                            node.position,
                            format!("Unknown format '{}' on section '{}'", format, args.name),
                        );
                    }
                }
            }
            Args::Each(args) => self.check_path(node, &args.path),
            Args::Switch(path) => self.check_path(node, path),
            _ => {}
        }

        self.check_children(&node.children, depth);
    }

    fn check_path(&mut self, node: &DirectiveNode, path: &str) {
        if let Err(e) = VarPath::parse(path) {
            self.issue(node.position, format!("'@{}' path: {}", node.name, e));
        }
    }
}
