//! `@each item[, index] in path` with an optional `@else`

use serde_json::{json, Map, Value};

use crate::directive::{
    ensure_last_branch, missing_args, no_args, parse_sibling, Branch, Descriptor, Directive,
    Execution,
};
use crate::error::{Error, RuntimeError, SyntaxError};
use crate::parser::args::parse_each;
use crate::parser::ast::{Args, DirectiveNode, Node, Position};
use crate::parser::grammar::ParserHandle;
use crate::render::resolve::resolve;
use crate::render::RenderContext;

const BRANCHES: &[&str] = &["else"];

/// Loop over an array, or over the `{key, value}` entries of an object
///
/// The body sees the item, the optional index (array position or object
/// key) and `loop` with `index`, `index1`, `first`, `last` and `length`.
#[derive(Debug, Clone, Copy)]
pub struct Each;

impl Directive for Each {
    fn name(&self) -> &str {
        "each"
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
        if name != "else" {
            return Ok(false);
        }
        ensure_last_branch(parser, children, "else", "each")?;
        let branch = parse_sibling(parser, BRANCHES, no_args("else"))?;
        children.push(Node::Directive(branch));
        Ok(true)
    }

    fn parse_args(&self, raw: &str, at: Position) -> Result<Args, SyntaxError> {
        parse_each(raw, at).map(Args::Each)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let Args::Each(args) = &node.args else {
            return Err(missing_args(node));
        };
        let (body, branches) = node.split_branches(BRANCHES);

        let value = resolve(&args.path, ctx.data()).map_err(|e| {
            Error::Runtime(RuntimeError::new(e.to_string()).with_context("path", args.path.as_str()))
        })?;
        let items: Vec<(Value, Value)> = match value {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (item, Value::from(i)))
                .collect(),
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| (json!({"key": key, "value": value}), Value::String(key)))
                .collect(),
            _ => Vec::new(),
        };

        if items.is_empty() {
            return Ok(match branches.iter().find_map(Node::as_directive) {
                Some(otherwise) => Execution::render(&otherwise.children),
                None => Execution::nothing(),
            });
        }

        let length = items.len();
        let branches = items
            .into_iter()
            .enumerate()
            .map(|(i, (item, key))| {
                let mut data = match ctx.data() {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                data.insert(args.item.clone(), item);
                if let Some(index) = &args.index {
                    data.insert(index.clone(), key);
                }
                data.insert(
                    "loop".to_string(),
                    json!({
                        "index": i,
                        "index1": i + 1,
                        "first": i == 0,
                        "last": i + 1 == length,
                        "length": length,
                    }),
                );
                Branch::with_data(body, Value::Object(data))
            })
            .collect();
        Ok(Execution::Render(branches))
    }
}
