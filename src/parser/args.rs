//! Argument grammars for the built-in directives
//!
//! Raw directive arguments are re-lexed with [`HeaderToken`] and parsed with
//! small chumsky grammars. Errors point at the offending token inside the
//! header, translated back to a template line/column.

use chumsky::input::ValueInput;
use chumsky::prelude::*;
use serde_json::Value;

use crate::error::SyntaxError;
use crate::parser::ast::{Position, Span};
use crate::parser::lexer::{lex_header, HeaderToken};

/// Ordered `key=value` attributes of a section or example case
///
/// A bare key (`overridable`) is stored with the value `"true"`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a boolean attribute is set (present and not `false`)
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v != "false")
    }

    /// Comma-separated list value, e.g. `model="a, b"`
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set a value, replacing an existing one in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Set a value only if the key is not present yet
    pub fn insert_missing(&mut self, key: &str, value: &str) {
        if self.get(key).is_none() {
            self.0.push((key.to_string(), value.to_string()));
        }
    }

    /// Copy of these attributes without the given keys
    pub fn without(&self, keys: &[&str]) -> Attributes {
        self.0
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut attributes = Attributes::new();
        for (k, v) in iter {
            attributes.insert(k, v);
        }
        attributes
    }
}

/// `@section name(attrs)`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectionArgs {
    pub name: String,
    pub attributes: Attributes,
}

/// `@each item[, index] in path`
#[derive(Debug, Clone, PartialEq)]
pub struct EachArgs {
    pub item: String,
    pub index: Option<String>,
    pub path: String,
}

/// `@case ["label"] (input="...", output="...")` inside `@examples`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExampleArgs {
    pub label: Option<String>,
    pub attributes: Attributes,
}

/// Header tokens of one directive plus their byte spans in the raw text
struct Lexed<'r> {
    raw: &'r str,
    at: Position,
    tokens: Vec<HeaderToken>,
    spans: Vec<Span>,
}

impl<'r> Lexed<'r> {
    fn new(raw: &'r str, at: Position, directive: &str) -> Result<Self, SyntaxError> {
        let lexed = lex_header(raw).map_err(|span| {
            let message = if raw[span.start..].starts_with(['"', '\'']) {
                "Unterminated string literal".to_string()
            } else {
                format!(
                    "Unexpected character '{}' in @{} arguments",
                    &raw[span.clone()],
                    directive
                )
            };
            Self::error_at(raw, at, message, span)
        })?;
        let (tokens, spans) = lexed
            .into_iter()
            .filter(|(t, _)| *t != HeaderToken::Newline)
            .unzip();
        Ok(Self {
            raw,
            at,
            tokens,
            spans,
        })
    }

    fn error_at(raw: &str, at: Position, message: String, span: Span) -> SyntaxError {
        let pos = at.advance_within(raw, span.start);
        SyntaxError::new(message, pos.line, pos.column, span)
    }

    /// Translate the first chumsky error into a positioned syntax error
    fn error(&self, directive: &str, errs: Vec<Rich<'_, HeaderToken>>) -> SyntaxError {
        let Some(err) = errs.into_iter().next() else {
            return self.fail(directive, "could not be parsed");
        };
        let index = err.span().start;
        let span = self
            .spans
            .get(index)
            .cloned()
            .unwrap_or(self.raw.len()..self.raw.len());
        let found = match err.found() {
            Some(token) => format!("unexpected {}", describe(token)),
            None => "unexpected end of arguments".to_string(),
        };
        Self::error_at(
            self.raw,
            self.at,
            format!("Invalid @{} arguments: {}", directive, found),
            span,
        )
    }

    fn fail(&self, directive: &str, reason: &str) -> SyntaxError {
        Self::error_at(
            self.raw,
            self.at,
            format!("Invalid @{} arguments: {}", directive, reason),
            0..self.raw.len(),
        )
    }

    /// Raw text covered by a range of token indices
    fn slice(&self, tokens: std::ops::Range<usize>) -> &'r str {
        match (self.spans.get(tokens.start), self.spans.get(tokens.end.saturating_sub(1))) {
            (Some(first), Some(last)) => &self.raw[first.start..last.end],
            _ => "",
        }
    }
}

fn describe(token: &HeaderToken) -> String {
    match token {
        HeaderToken::Newline => "newline".to_string(),
        HeaderToken::Operator(op) => format!("'{}'", op),
        HeaderToken::Assign => "'='".to_string(),
        HeaderToken::ParenOpen => "'('".to_string(),
        HeaderToken::ParenClose => "')'".to_string(),
        HeaderToken::Comma => "','".to_string(),
        HeaderToken::Colon => "':'".to_string(),
        HeaderToken::Str(s) => format!("string \"{}\"", s),
        HeaderToken::Escaped(s) | HeaderToken::Word(s) => format!("'{}'", s),
    }
}

/// Turn a bare word into a JSON literal (`true`, `false`, `null`, numbers)
/// or keep it as a string
pub fn literal_word(word: &str) -> Value {
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => word
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(word.to_string())),
    }
}

fn attributes_parser<'a, I>(
) -> impl Parser<'a, I, Attributes, extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    let word = select! { HeaderToken::Word(w) => w };
    let value = select! {
        HeaderToken::Str(s) => s,
        HeaderToken::Word(w) => w,
    };

    let attribute = word
        .then(just(HeaderToken::Assign).ignore_then(value).or_not())
        .map(|(key, value)| (key, value.unwrap_or_else(|| "true".to_string())));

    let parenthesised = attribute
        .clone()
        .separated_by(just(HeaderToken::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(HeaderToken::ParenOpen), just(HeaderToken::ParenClose));

    // Bare form: `key=value, key2=value2` with optional commas
    let bare = attribute
        .separated_by(just(HeaderToken::Comma).or_not())
        .allow_trailing()
        .collect::<Vec<_>>();

    choice((parenthesised, bare)).map(|entries| entries.into_iter().collect())
}

fn section_parser<'a, I>(
) -> impl Parser<'a, I, SectionArgs, extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    let name = select! {
        HeaderToken::Word(w) => w,
        HeaderToken::Str(s) => s,
    };

    name.or_not()
        .then(attributes_parser())
        .then_ignore(end())
        .map(|(name, attributes)| SectionArgs {
            name: name.unwrap_or_default(),
            attributes,
        })
}

/// Parse `name(attr="value", flag)` section arguments
pub fn parse_section(raw: &str, at: Position) -> Result<SectionArgs, SyntaxError> {
    let lexed = Lexed::new(raw, at, "section")?;
    let result = section_parser()
        .parse(lexed.tokens.as_slice())
        .into_result()
        .map_err(|errs| lexed.error("section", errs));
    result
}

fn each_parser<'a, I>(
) -> impl Parser<'a, I, (String, Option<String>, SimpleSpan), extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    let ident = select! {
        HeaderToken::Word(w) if w != "in" => w,
    };

    ident
        .then(just(HeaderToken::Comma).ignore_then(ident).or_not())
        .then_ignore(just(HeaderToken::Word("in".to_string())))
        .then(
            any()
                .repeated()
                .at_least(1)
                .map_with(|_, e| e.span()),
        )
        .then_ignore(end())
        .map(|((item, index), path)| (item, index, path))
}

/// Parse `item[, index] in path` loop arguments
pub fn parse_each(raw: &str, at: Position) -> Result<EachArgs, SyntaxError> {
    let lexed = Lexed::new(raw, at, "each")?;
    let (item, index, path) = each_parser()
        .parse(lexed.tokens.as_slice())
        .into_result()
        .map_err(|errs| lexed.error("each", errs))?;
    Ok(EachArgs {
        item,
        index,
        path: lexed.slice(path.start..path.end).to_string(),
    })
}

fn literals_parser<'a, I>(
) -> impl Parser<'a, I, Vec<Value>, extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    let literal = select! {
        HeaderToken::Str(s) => Value::String(s),
        HeaderToken::Word(w) => literal_word(&w),
    };

    literal
        .separated_by(just(HeaderToken::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

/// Parse the literal list of a switch `@case a, "b", 3`
pub fn parse_case_literals(raw: &str, at: Position) -> Result<Vec<Value>, SyntaxError> {
    let lexed = Lexed::new(raw, at, "case")?;
    let result = literals_parser()
        .parse(lexed.tokens.as_slice())
        .into_result()
        .map_err(|errs| lexed.error("case", errs));
    result
}

fn example_parser<'a, I>(
) -> impl Parser<'a, I, ExampleArgs, extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    let label = select! { HeaderToken::Str(s) => s };

    label
        .or_not()
        .then(attributes_parser())
        .then_ignore(end())
        .map(|(label, attributes)| ExampleArgs {
            label: label.or_else(|| attributes.get("label").map(str::to_string)),
            attributes,
        })
}

/// Parse `["label"] (input="...", output="...")` example case arguments
pub fn parse_example(raw: &str, at: Position) -> Result<ExampleArgs, SyntaxError> {
    let lexed = Lexed::new(raw, at, "case")?;
    let result = example_parser()
        .parse(lexed.tokens.as_slice())
        .into_result()
        .map_err(|errs| lexed.error("case", errs));
    result
}

fn target_parser<'a, I>() -> impl Parser<'a, I, String, extra::Err<Rich<'a, HeaderToken>>> + Clone
where
    I: ValueInput<'a, Token = HeaderToken, Span = SimpleSpan>,
{
    select! {
        HeaderToken::Str(s) => s,
        HeaderToken::Word(w) => w,
    }
    .then_ignore(end())
}

/// Parse the template name of `@include` / `@extends`
pub fn parse_target(raw: &str, at: Position, directive: &str) -> Result<String, SyntaxError> {
    let lexed = Lexed::new(raw, at, directive)?;
    if lexed.tokens.is_empty() {
        return Err(lexed.fail(directive, "expected a template name"));
    }
    let result = target_parser()
        .parse(lexed.tokens.as_slice())
        .into_result()
        .map_err(|errs| lexed.error(directive, errs));
    result
}

/// Parse the value path of `@switch`
pub fn parse_path(raw: &str, at: Position, directive: &str) -> Result<String, SyntaxError> {
    let path = raw.trim();
    if path.is_empty() {
        return Err(SyntaxError::new(
            format!("Invalid @{} arguments: expected a value path", directive),
            at.line,
            at.column,
            0..0,
        ));
    }
    Ok(path.to_string())
}

/// Reject arguments on a keyword that takes none, such as `@else`
pub fn expect_empty(raw: &str, at: Position, directive: &str) -> Result<(), SyntaxError> {
    if raw.trim().is_empty() {
        Ok(())
    } else {
        Err(SyntaxError::new(
            format!("'@{}' takes no arguments", directive),
            at.line,
            at.column,
            0..raw.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at() -> Position {
        Position::new(1, 10)
    }

    #[test]
    fn test_section_with_parenthesised_attributes() {
        let args = parse_section(r#"intro(overridable=true, format="xml", title="Intro")"#, at())
            .expect("Should parse");
        assert_eq!(args.name, "intro");
        assert!(args.attributes.flag("overridable"));
        assert_eq!(args.attributes.get("format"), Some("xml"));
        assert_eq!(args.attributes.get("title"), Some("Intro"));
    }

    #[test]
    fn test_section_space_before_paren_and_bare_flags() {
        let args = parse_section("intro (overridable, prepend)", at()).expect("Should parse");
        assert!(args.attributes.flag("overridable"));
        assert!(args.attributes.flag("prepend"));
    }

    #[test]
    fn test_section_without_parentheses() {
        let args = parse_section(r#"intro format="xml", model="a, b""#, at()).expect("Should parse");
        assert_eq!(args.attributes.get("format"), Some("xml"));
        assert_eq!(args.attributes.list("model"), vec!["a", "b"]);
    }

    #[test]
    fn test_section_bare_name() {
        let args = parse_section("summary", at()).expect("Should parse");
        assert_eq!(args.name, "summary");
        assert!(args.attributes.is_empty());
    }

    #[test]
    fn test_section_false_flag() {
        let args = parse_section("a(overridable=false)", at()).expect("Should parse");
        assert!(!args.attributes.flag("overridable"));
    }

    #[test]
    fn test_section_error_points_at_token() {
        let err = parse_section("a(x=)", at()).unwrap_err();
        assert!(err.message.starts_with("Invalid @section arguments"));
        assert_eq!(err.line, 1);
        assert!(err.column > 10);
    }

    #[test]
    fn test_each_with_index() {
        let args = parse_each("user, i in data.users", at()).expect("Should parse");
        assert_eq!(
            args,
            EachArgs {
                item: "user".to_string(),
                index: Some("i".to_string()),
                path: "data.users".to_string(),
            }
        );
    }

    #[test]
    fn test_each_path_keeps_brackets() {
        let args = parse_each(r#"x in groups["a b"].items"#, at()).expect("Should parse");
        assert_eq!(args.path, r#"groups["a b"].items"#);
    }

    #[test]
    fn test_each_requires_in() {
        assert!(parse_each("x items", at()).is_err());
        assert!(parse_each("x in", at()).is_err());
    }

    #[test]
    fn test_case_literals() {
        let values = parse_case_literals(r#"admin, "power user", 3, true, null"#, at())
            .expect("Should parse");
        assert_eq!(
            values,
            vec![
                Value::String("admin".to_string()),
                Value::String("power user".to_string()),
                serde_json::json!(3.0),
                Value::Bool(true),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_example_label_and_attributes() {
        let args = parse_example(r#""greeting" (input="hi", output="hello")"#, at())
            .expect("Should parse");
        assert_eq!(args.label.as_deref(), Some("greeting"));
        assert_eq!(args.attributes.get("input"), Some("hi"));
        assert_eq!(args.attributes.get("output"), Some("hello"));
    }

    #[test]
    fn test_example_label_attribute() {
        let args = parse_example(r#"label="x", input="1""#, at()).expect("Should parse");
        assert_eq!(args.label.as_deref(), Some("x"));
    }

    #[test]
    fn test_target() {
        assert_eq!(parse_target("\"base\"", at(), "extends").unwrap(), "base");
        assert_eq!(parse_target("shared/footer.qt", at(), "include").unwrap(), "shared/footer.qt");
        assert!(parse_target("", at(), "include").is_err());
        assert!(parse_target("a b", at(), "include").is_err());
    }

    #[test]
    fn test_unterminated_string_in_arguments() {
        let err = parse_section("a(title=\"open)", at()).unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
    }

    #[test]
    fn test_literal_word() {
        assert_eq!(literal_word("1.5"), serde_json::json!(1.5));
        assert_eq!(literal_word("abc"), Value::String("abc".to_string()));
    }
}
