//! `@section name(attrs)`, the unit of inheritance

use crate::directive::{Descriptor, Directive, Execution};
use crate::error::{Error, SyntaxError};
use crate::parser::args::parse_section;
use crate::parser::ast::{Args, DirectiveNode, Position};
use crate::render::RenderContext;
use crate::template::inherit::render_section;

#[derive(Debug, Clone, Copy)]
pub struct Section;

impl Directive for Section {
    fn name(&self) -> &str {
        "section"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block()
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_section(raw, at).map(Args::Section)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        render_section(ctx, node).map(Execution::Text)
    }
}
