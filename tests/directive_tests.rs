//! Integration tests for loops and user-defined directives

use pretty_assertions::assert_eq;
use serde_json::json;

use quill::directive::{parse_sibling, SiblingKeyword};
use quill::parser::ParserHandle;
use quill::{
    Args, Descriptor, Directive, DirectiveNode, Engine, EngineConfig, Error, Execution,
    Formatter, Node, Position, RenderContext, Section, SyntaxError,
};

#[test]
fn test_each_with_loop_variables() {
    let source = "@each item, i in items\n@{loop.index1}/@{loop.length} @{item} (@{i})\n@end\n";
    let out = quill::render(source, &json!({"items": ["a", "b"]})).unwrap();
    assert_eq!(out, "1/2 a (0)\n2/2 b (1)\n");
}

#[test]
fn test_each_first_and_last() {
    let source = "@each tool in tools\n@if loop.first: [\n@{tool.name}\n@if loop.last: ]\n@end\n";
    let data = json!({"tools": [{"name": "search"}, {"name": "calc"}]});
    assert_eq!(
        quill::render(source, &data).unwrap(),
        "[\nsearch\ncalc\n]\n"
    );
}

#[test]
fn test_each_loop_index_is_zero_based() {
    let source = "@each x in items\n@{loop.first},@{loop.last},@{loop.index}\n@end\n";
    assert_eq!(
        quill::render(source, &json!({"items": [1, 2]})).unwrap(),
        "true,false,0\nfalse,true,1\n"
    );
}

#[test]
fn test_each_else_for_empty_and_missing() {
    let source = "@each x in xs\n- @{x}\n@else\nNothing yet.\n@end\n";
    assert_eq!(quill::render(source, &json!({"xs": []})).unwrap(), "Nothing yet.\n");
    assert_eq!(quill::render(source, &json!({})).unwrap(), "Nothing yet.\n");
    assert_eq!(
        quill::render(source, &json!({"xs": "not a list"})).unwrap(),
        "Nothing yet.\n"
    );
}

#[test]
fn test_each_over_object_entries() {
    let source = "@each entry, key in settings\n@{key}=@{entry.value}\n@end\n";
    let data = json!({"settings": {"a": "one", "b": 2}});
    assert_eq!(quill::render(source, &data).unwrap(), "a=one\nb=2\n");
}

#[test]
fn test_each_keeps_outer_data() {
    let source = "@each name in names\n@{greeting}, @{name}\n@end\n";
    let data = json!({"greeting": "Hi", "names": ["Ada", "Bo"]});
    assert_eq!(quill::render(source, &data).unwrap(), "Hi, Ada\nHi, Bo\n");
}

#[test]
fn test_nested_each() {
    let source = "@each row in rows\n@each cell in row\n@{cell}\n@end\n--\n@end\n";
    let data = json!({"rows": [[1, 2], [3]]});
    assert_eq!(quill::render(source, &data).unwrap(), "1\n2\n--\n3\n--\n");
}

#[test]
fn test_else_outside_owner_is_syntax_error() {
    let err = quill::render("@else\nx\n@end\n", &json!({})).unwrap_err();
    match err {
        Error::Syntax(e) => assert_eq!(
            e.message,
            "'@else' is only valid inside '@each', '@if', '@unless'"
        ),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

/// `@step` bodies end at the next `@step` or at `@end`
struct Step;

impl Directive for Step {
    fn name(&self) -> &str {
        "step"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block()
    }

    fn should_terminate_body(&self, name: &str) -> bool {
        name == "step"
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let body = ctx.render(&node.children, None)?;
        Ok(Execution::Text(format!("- {}\n", body.trim())))
    }
}

#[test]
fn test_custom_directive_terminated_by_its_own_keyword() {
    let engine = Engine::default().with_directive(Step);
    let source = "Steps:\n@step\nWash\n@step\nRinse @{times} times\n@end\nDone\n";
    assert_eq!(
        engine.render(source, &json!({"times": 2})).unwrap(),
        "Steps:\n- Wash\n- Rinse 2 times\nDone\n"
    );
}

const TAB_SIBLINGS: &[&str] = &["tab"];

/// `@tabs` with `@tab "title"` branches parsed by the owner
struct Tabs;

impl Directive for Tabs {
    fn name(&self) -> &str {
        "tabs"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::block().with_siblings(TAB_SIBLINGS)
    }

    fn handle_child(
        &self,
        name: &str,
        parser: &mut dyn ParserHandle,
        children: &mut Vec<Node>,
    ) -> Result<bool, SyntaxError> {
        if name != "tab" {
            return Ok(false);
        }
        let tab = parse_sibling(parser, TAB_SIBLINGS, |raw: &str, at: Position| {
            if raw.is_empty() {
                Err(SyntaxError::new("'@tab' needs a title", at.line, at.column, 0..0))
            } else {
                Ok(Args::Target(raw.trim_matches('"').to_string()))
            }
        })?;
        children.push(Node::Directive(tab));
        Ok(true)
    }

    fn execute<'n>(
        &self,
        node: &'n DirectiveNode,
        ctx: &mut RenderContext<'_, '_>,
    ) -> Result<Execution<'n>, Error> {
        let (_, tabs) = node.split_branches(TAB_SIBLINGS);
        let mut out = String::new();
        for tab in tabs.iter().filter_map(Node::as_directive) {
            if let Args::Target(title) = &tab.args {
                out.push_str(&format!("[{}]\n", title));
            }
            out.push_str(&ctx.render(&tab.children, None)?);
        }
        Ok(Execution::Text(out))
    }
}

fn tabs_engine() -> Engine {
    Engine::default()
        .with_directive(Tabs)
        .with_directive(SiblingKeyword::new("tab"))
}

#[test]
fn test_custom_directive_with_sibling_keywords() {
    let source = "@tabs\n@tab \"Rust\"\nfn main() {}\n@tab \"Python\"\n@if show: print()\n@end\n";
    assert_eq!(
        tabs_engine().render(source, &json!({"show": true})).unwrap(),
        "[Rust]\nfn main() {}\n[Python]\nprint()\n"
    );
}

#[test]
fn test_custom_sibling_argument_errors() {
    let err = tabs_engine()
        .render("@tabs\n@tab\nx\n@end\n", &json!({}))
        .unwrap_err();
    match err {
        Error::Syntax(e) => assert_eq!(e.message, "'@tab' needs a title"),
        other => panic!("expected a syntax error, got {:?}", other),
    }

    let err = tabs_engine().render("@tab \"x\"\n", &json!({})).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn test_unknown_directive_without_registration() {
    let err = quill::render("@tabs\n@end\n", &json!({})).unwrap_err();
    match err {
        Error::Syntax(e) => assert!(e.message.starts_with("Unknown directive '@tabs'")),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

struct Shout;

impl Formatter for Shout {
    fn format_section(&self, section: &Section) -> String {
        format!("{}!\n", section.content.to_uppercase())
    }
}

#[test]
fn test_custom_formatter() {
    let engine = Engine::default().with_formatter("shout", Shout);
    let out = engine
        .render("@section alert(format=shout)\nwake up\n@end\n", &json!({}))
        .unwrap();
    assert_eq!(out, "WAKE UP!\n");
}

#[test]
fn test_unknown_format_in_strict_mode() {
    let source = "@section a(format=shout)\nx\n@end\n";
    assert_eq!(quill::render(source, &json!({})).unwrap(), "x\n");

    let strict = Engine::new(EngineConfig::new().with_strict(true));
    let err = strict.render(source, &json!({})).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert_eq!(runtime.context("section"), Some("a"));
}

#[test]
fn test_engine_validate_reports_issues() {
    let engine = Engine::default();
    let template = engine
        .compile("@section a\nx\n@end\n@section a\ny\n@end\n")
        .unwrap();
    let report = engine.validate(&template);
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].line, 4);
}
