//! Integration tests for compiling and rendering templates

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use quill::{render, render_with_config, Engine, EngineConfig, Error, MemoryLoader};

fn render_ok(source: &str, data: Value) -> String {
    render(source, &data).expect("Should render")
}

fn strict() -> EngineConfig {
    EngineConfig::new().with_strict(true)
}

#[test]
fn test_text_round_trips() {
    let source = "You are a helpful assistant.\n\n  Indented line\nTrailing";
    assert_eq!(render_ok(source, json!({})), source);
}

#[test]
fn test_variables_and_defaults() {
    let data = json!({
        "user": {"name": "Ada", "langs": ["rust", "ocaml"]},
        "count": 3,
        "ratio": 2.0,
        "nothing": null,
    });
    assert_eq!(render_ok("Hi @{user.name}!", data.clone()), "Hi Ada!");
    assert_eq!(render_ok("@{user.langs[1]}", data.clone()), "ocaml");
    assert_eq!(render_ok("@{user.langs}", data.clone()), "rust, ocaml");
    assert_eq!(render_ok("@{count} / @{ratio}", data.clone()), "3 / 2");
    assert_eq!(render_ok("@{missing | \"anon\"}", data.clone()), "anon");
    assert_eq!(render_ok("@{nothing | fallback}", data.clone()), "fallback");
    assert_eq!(render_ok("[@{missing}]", data), "[]");
}

#[test]
fn test_undefined_variable_in_strict_mode() {
    let err = render_with_config("Hi @{user.name}", &json!({}), strict()).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert_eq!(runtime.context("variable"), Some("user.name"));
    assert_eq!(runtime.context("position"), Some("1:4"));
}

#[test]
fn test_if_elif_else_chain() {
    let source = "@if a\nX\n@elif b\nY\n@else\nZ\n@end\n";
    assert_eq!(render_ok(source, json!({"a": true})), "X\n");
    assert_eq!(render_ok(source, json!({"a": false, "b": true})), "Y\n");
    assert_eq!(render_ok(source, json!({})), "Z\n");
}

#[test]
fn test_first_true_branch_wins() {
    let source = "@if n > 1\nbig\n@elif n > 0\npositive\n@end\n";
    assert_eq!(render_ok(source, json!({"n": 5})), "big\n");
    assert_eq!(render_ok(source, json!({"n": 1})), "positive\n");
    assert_eq!(render_ok(source, json!({"n": 0})), "");
}

#[test]
fn test_unless() {
    let source = "@unless premium\nUpgrade today.\n@else\nThanks!\n@end\n";
    assert_eq!(render_ok(source, json!({"premium": false})), "Upgrade today.\n");
    assert_eq!(render_ok(source, json!({"premium": true})), "Thanks!\n");
}

#[test]
fn test_truthiness_in_conditions() {
    let source = "@if value: yes\n";
    for falsy in [json!(0), json!(""), json!([]), json!(null), json!(false)] {
        assert_eq!(render_ok(source, json!({"value": falsy})), "");
    }
    for truthy in [json!(1), json!("0"), json!([0]), json!({}), json!(true)] {
        assert_eq!(render_ok(source, json!({"value": truthy})), "yes\n");
    }
}

#[test]
fn test_condition_operators() {
    let data = json!({
        "role": "admin",
        "tags": ["beta", "internal"],
        "age": 30,
        "banned": false,
    });
    let cases = [
        ("role == \"admin\" and not banned", true),
        ("role == 'user' or age >= 30", true),
        ("\"beta\" in tags", true),
        ("\"gamma\" in tags", false),
        ("!(age < 18) && tags.length == 2", true),
        ("age == \"30\"", false),
    ];
    for (condition, expected) in cases {
        let source = format!("@if {}: ok\n", condition);
        let out = render(&source, &data).expect(condition);
        assert_eq!(out == "ok\n", expected, "condition: {}", condition);
    }
}

#[test]
fn test_bad_condition_is_false_unless_strict() {
    let source = "@if a ==\nX\n@else\nY\n@end\n";
    assert_eq!(render_ok(source, json!({"a": 1})), "Y\n");

    let err = render_with_config(source, &json!({"a": 1}), strict()).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert!(runtime
        .message
        .starts_with("Failed to evaluate '@if' condition 'a =='"));
    assert_eq!(runtime.context("directive"), Some("if"));
}

#[test]
fn test_unbalanced_parens_are_syntax_errors() {
    let err = render("@if (a and b\nX\n@end\n", &json!({})).unwrap_err();
    match err {
        Error::Syntax(e) => {
            assert!(e.message.contains("'('"), "{}", e.message);
            assert_eq!(e.line, 1);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_inline_bodies() {
    let nested = "@if a: @if b: both\n";
    assert_eq!(render_ok(nested, json!({"a": true, "b": true})), "both\n");
    assert_eq!(render_ok(nested, json!({"a": true, "b": false})), "\n");
    assert_eq!(render_ok(nested, json!({"a": false, "b": true})), "");

    let terminated = "@if a: yes @end rest\n";
    assert_eq!(render_ok(terminated, json!({"a": true})), "yes  rest\n");
    assert_eq!(render_ok(terminated, json!({"a": false})), " rest\n");
}

#[test]
fn test_directive_mid_line_in_lenient_mode() {
    let engine = Engine::new(EngineConfig::new().with_strict_directives(false));
    let out = engine
        .render("Status: @if ok: fine\nDone\n", &json!({"ok": true}))
        .unwrap();
    assert_eq!(out, "Status: fine\nDone\n");
}

#[test]
fn test_directive_mid_line_rejected_when_strict() {
    let err = render("Status: @if ok: fine\n", &json!({})).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn test_comments_and_escapes() {
    let source = "// internal note\nHello // trailing\n/* block */\nmail me@example.com or \\@if\n";
    assert_eq!(
        render_ok(source, json!({})),
        "Hello\nmail me@example.com or @if\n"
    );
}

#[test]
fn test_switch() {
    let source = "@switch role\n@case \"admin\", \"owner\"\nFull\n@case 1\nNumeric\n@default\nNone\n@end\n";
    assert_eq!(render_ok(source, json!({"role": "owner"})), "Full\n");
    assert_eq!(render_ok(source, json!({"role": 1})), "Numeric\n");
    assert_eq!(render_ok(source, json!({"role": "1"})), "None\n");
    assert_eq!(render_ok(source, json!({})), "None\n");
}

#[test]
fn test_default_must_be_last() {
    let err = render(
        "@switch x\n@default\nA\n@case 1\nB\n@end\n",
        &json!({}),
    )
    .unwrap_err();
    match err {
        Error::Syntax(e) => assert_eq!(e.message, "'@default' must be the last branch of '@switch'"),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_examples() {
    let source = concat!(
        "@examples\n",
        "@case \"greeting\" (input=\"Hi @{name}\", output=\"Hello!\")\n",
        "Be warm.\n",
        "@case input=\"Bye\" output=\"See you\"\n",
        "@end\n",
    );
    assert_eq!(
        render_ok(source, json!({"name": "Ada"})),
        "Example 1: greeting\nInput: Hi Ada\nOutput: Hello!\nBe warm.\n\nExample 2\nInput: Bye\nOutput: See you\n"
    );
}

#[test]
fn test_include_renders_with_current_data() {
    let loader = MemoryLoader::new().with_template("header", "Hello @{name}\n");
    let engine = Engine::default().with_loader(loader);
    let out = engine
        .render("@include \"header\"\nBody\n", &json!({"name": "Ada"}))
        .unwrap();
    assert_eq!(out, "Hello Ada\nBody\n");
}

#[test]
fn test_include_missing_template() {
    let err = render("@include \"nowhere\"\n", &json!({})).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert_eq!(runtime.context("template"), Some("nowhere"));
    assert_eq!(runtime.context("directive"), Some("include"));
}

#[test]
fn test_include_cycle_is_reported() {
    let loader = MemoryLoader::new()
        .with_template("a", "A\n@include \"b\"\n")
        .with_template("b", "B\n@include \"a\"\n");
    let engine = Engine::default().with_loader(loader);
    let err = engine.render_named("a", &json!({})).unwrap_err();
    assert!(err.to_string().contains("a -> b -> a"), "{}", err);
}

#[test]
fn test_include_depth_limit() {
    let loader = MemoryLoader::new()
        .with_template("t0", "@include \"t1\"\n")
        .with_template("t1", "@include \"t2\"\n")
        .with_template("t2", "end\n");
    let engine = Engine::new(EngineConfig::new().with_max_include_depth(2)).with_loader(loader);
    let err = engine.render_named("t0", &json!({})).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert_eq!(runtime.context("template"), Some("t2"));
}

#[test]
fn test_file_loader() {
    let dir = std::env::temp_dir().join(format!("quill-render-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("footer.qt"), "-- @{team}\n").unwrap();

    let engine = Engine::new(EngineConfig::new().with_template_dir(&dir));
    let out = engine
        .render("Thanks\n@include footer\n", &json!({"team": "Support"}))
        .unwrap();
    assert_eq!(out, "Thanks\n-- Support\n");

    std::fs::remove_dir_all(&dir).ok();
}
