//! `@switch path` with `@case` literal lists and `@default`

use crate::directive::{
    ensure_last_branch, missing_args, no_args, parse_sibling, Descriptor, Directive, Execution,
};
use crate::error::{Error, RuntimeError, SyntaxError};
use crate::expr::eval::strict_eq;
use crate::parser::args::{parse_case_literals, parse_path};
use crate::parser::ast::{Args, DirectiveNode, Node, Position};
use crate::parser::grammar::ParserHandle;
use crate::render::resolve::resolve;
use crate::render::RenderContext;

const BRANCHES: &[&str] = &["case", "default"];

/// Renders the first `@case` whose literals strictly equal the value, or
/// `@default`
#[derive(Debug, Clone, Copy)]
pub struct Switch;

impl Directive for Switch {
    fn name(&self) -> &str {
        "switch"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block().with_siblings(BRANCHES)
    }

    fn handle_child(
        &self,
        name: &str,
        parser: &mut dyn ParserHandle,
        children: &mut Vec<Node>,
    ) -> Result<bool, SyntaxError> {
        ensure_last_branch(parser, children, "default", "switch")?;
        let branch = match name {
            "case" => parse_sibling(parser, BRANCHES, |raw, at| {
                parse_case_literals(raw, at).map(Args::Case)
            })?,
            "default" => parse_sibling(parser, BRANCHES, no_args("default"))?,
            _ => return Ok(false),
        };
        children.push(Node::Directive(branch));
        Ok(true)
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_path(raw, at, "switch").map(Args::Switch)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let Args::Switch(path) = &node.args else {
            return Err(missing_args(node));
        };
        let value = resolve(path, ctx.data()).map_err(|e| {
            Error::Runtime(RuntimeError::new(e.to_string()).with_context("path", path.as_str()))
        })?;

        let (_, branches) = node.split_branches(BRANCHES);
        for branch in branches.iter().filter_map(Node::as_directive) {
            let matched = match &branch.args {
                Args::Case(literals) => literals
                    .iter()
                    .any(|literal| strict_eq(value.as_ref(), Some(literal))),
                _ => branch.is("default"),
            };
            if matched {
                return Ok(Execution::render(&branch.children));
            }
        }
        Ok(Execution::nothing())
    }
}
