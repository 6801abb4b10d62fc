//! `@include` and `@extends`

use crate::directive::{missing_args, Descriptor, Directive, Execution};
use crate::error::{Error, SyntaxError};
use crate::parser::args::parse_target;
use crate::parser::ast::{Args, DirectiveNode, Position};
use crate::render::RenderContext;
use crate::template::inherit::render_extends;

/// Renders another template against the current data
///
/// The included template gets its own section state, so overrides meant
/// for the enclosing template's ancestors never leak into it.
#[derive(Debug, Clone, Copy)]
pub struct Include;

impl Directive for Include {
    fn name(&self) -> &str {
        "include"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::leaf()
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_target(raw, at, "include").map(Args::Target)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let Args::Target(name) = &node.args else {
            return Err(missing_args(node));
        };
        let template = ctx.load(name)?;
        ctx.render_isolated(&template, None).map(Execution::Text)
    }
}

/// Renders the named ancestor with this template's sections applied
#[derive(Debug, Clone, Copy)]
pub struct Extends;

impl Directive for Extends {
    fn name(&self) -> &str {
        "extends"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::leaf().top_level().unique()
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_target(raw, at, "extends").map(Args::Target)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        render_extends(ctx, node).map(Execution::Text)
    }
}
