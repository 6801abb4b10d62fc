//! `@examples` with few-shot `@case` entries

use crate::directive::{missing_args, no_args, parse_sibling, Descriptor, Directive, Execution};
use crate::error::{Error, SyntaxError};
use crate::parser::args::parse_example;
use crate::parser::ast::{Args, DirectiveNode, Node, Position};
use crate::parser::grammar::ParserHandle;
use crate::render::RenderContext;
use crate::template::inherit::tidy;

const BRANCHES: &[&str] = &["case"];

/// Renders each case as an `Example N: label` block
///
/// `input` and `output` attributes are themselves rendered as templates,
/// so they may interpolate variables. Text before the first case is kept
/// as a preamble.
#[derive(Debug, Clone, Copy)]
pub struct Examples;

impl Directive for Examples {
    fn name(&self) -> &str {
        "examples"
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
        if name != "case" {
            return Ok(false);
        }
        let case = parse_sibling(parser, BRANCHES, |raw, at| {
            parse_example(raw, at).map(Args::Example)
        })?;
        children.push(Node::Directive(case));
        Ok(true)
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        no_args("examples")(raw, at)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let (preamble, cases) = node.split_branches(BRANCHES);
        let mut blocks = Vec::new();

        let intro = ctx.render(preamble, None)?;
        if !tidy(&intro).trim().is_empty() {
            blocks.push(format!("{}\n", tidy(&intro)));
        }

        for (i, case) in cases.iter().filter_map(Node::as_directive).enumerate() {
            let Args::Example(args) = &case.args else {
                return Err(missing_args(case));
            };
            let mut block = format!("Example {}", i + 1);
            if let Some(label) = &args.label {
                block.push_str(": ");
                block.push_str(label);
            }
            block.push('\n');
            if let Some(input) = args.attributes.get("input") {
                block.push_str(&format!("Input: {}\n", ctx.render_source(input, None)?));
            }
            if let Some(output) = args.attributes.get("output") {
                block.push_str(&format!("Output: {}\n", ctx.render_source(output, None)?));
            }
            let body = ctx.render(&case.children, None)?;
            let body = tidy(&body);
            if !body.is_empty() {
                block.push_str(body);
                block.push('\n');
            }
            blocks.push(block);
        }

        Ok(Execution::Text(blocks.join("\n")))
    }
}
