//! `@if` / `@elif` / `@else` and `@unless` / `@else`

use crate::directive::{
    ensure_last_branch, missing_args, no_args, parse_sibling, Descriptor, Directive, Execution,
};
use crate::error::{Error, SyntaxError};
use crate::expr::Condition;
use crate::parser::ast::{Args, DirectiveNode, Node, Position};
use crate::parser::grammar::ParserHandle;
use crate::render::RenderContext;

const IF_BRANCHES: &[&str] = &["elif", "else"];
const UNLESS_BRANCHES: &[&str] = &["else"];

fn condition(node: &DirectiveNode) -> Result<&Condition, Error> {
    match &node.args {
        Args::Condition(condition) => Ok(condition),
        _ => Err(missing_args(node)),
    }
}

fn parse_condition(raw: &str, at: Position) -> Result<Args, SyntaxError> {
    Condition::parse(raw, at).map(Args::Condition)
}

/// First-true-wins conditional chain
#[derive(Debug, Clone, Copy)]
pub struct If;

impl Directive for If {
    fn name(&self) -> &str {
        "if"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block().with_siblings(IF_BRANCHES)
    }

    fn handle_child(
        &self,
        name: &str,
        parser: &mut dyn ParserHandle,
        children: &mut Vec<Node>,
    ) -> Result<bool, SyntaxError> {
        ensure_last_branch(parser, children, "else", "if")?;
        let branch = match name {
            "elif" => parse_sibling(parser, IF_BRANCHES, parse_condition)?,
            "else" => parse_sibling(parser, IF_BRANCHES, no_args("else"))?,
            _ => return Ok(false),
        };
        children.push(Node::Directive(branch));
        Ok(true)
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_condition(raw, at)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let (body, branches) = node.split_branches(IF_BRANCHES);
        if ctx.evaluate(condition(node)?, "if")? {
            return Ok(Execution::render(body));
        }

        for branch in branches.iter().filter_map(Node::as_directive) {
            let matched = match branch.name.as_str() {
                "elif" => ctx.evaluate(condition(branch)?, "elif")?,
                _ => true,
            };
            if matched {
                return Ok(Execution::render(&branch.children));
            }
        }
        Ok(Execution::nothing())
    }
}

/// Negated conditional with an optional `@else`
#[derive(Debug, Clone, Copy)]
pub struct Unless;

impl Directive for Unless {
    fn name(&self) -> &str {
        "unless"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block().with_siblings(UNLESS_BRANCHES)
    }

    fn handle_child(
        &self,
        name: &str,
        parser: &mut dyn ParserHandle,
        children: &mut Vec<Node>,
    ) -> Result<bool, SyntaxError> {
        if name != "else" {
            return Ok(false);
        }
        ensure_last_branch(parser, children, "else", "unless")?;
        let branch = parse_sibling(parser, UNLESS_BRANCHES, no_args("else"))?;
        children.push(Node::Directive(branch));
        Ok(true)
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_condition(raw, at)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let (body, branches) = node.split_branches(UNLESS_BRANCHES);
        if !ctx.evaluate(condition(node)?, "unless")? {
            return Ok(Execution::render(body));
        }
        match branches.iter().find_map(Node::as_directive) {
            Some(otherwise) => Ok(Execution::render(&otherwise.children)),
            None => Ok(Execution::nothing()),
        }
    }
}
