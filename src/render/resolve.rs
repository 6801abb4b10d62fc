//! Variable path resolution
//!
//! Paths are dotted and bracketed lookups into the JSON data context:
//! `user.name`, `items[0]`, `map["key with spaces"]`, `items.length`.
//! A `@{...}` reference may carry a fallback: `@{user.name | "guest"}`.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Empty variable path")]
    Empty,
    #[error("Malformed variable path '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

impl PathError {
    fn malformed(path: &str, reason: impl Into<String>) -> Self {
        PathError::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed variable path
#[derive(Debug, Clone, PartialEq)]
pub struct VarPath {
    segments: Vec<Segment>,
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-')
}

impl VarPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        let mut rest = path;
        let mut expect_key = true;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after
                    .find(']')
                    .ok_or_else(|| PathError::malformed(path, "missing ']'"))?;
                let inner = after[..close].trim();
                segments.push(Self::bracket_segment(path, inner)?);
                rest = &after[close + 1..];
                expect_key = false;
            } else if let Some(after) = rest.strip_prefix('.') {
                if expect_key {
                    return Err(PathError::malformed(path, "unexpected '.'"));
                }
                rest = after;
                expect_key = true;
                if rest.is_empty() {
                    return Err(PathError::malformed(path, "trailing '.'"));
                }
            } else {
                if !expect_key {
                    return Err(PathError::malformed(path, "expected '.' or '['"));
                }
                let len = rest
                    .find(|c: char| !is_key_char(c))
                    .unwrap_or(rest.len());
                if len == 0 {
                    let bad = rest.chars().next().unwrap_or(' ');
                    return Err(PathError::malformed(
                        path,
                        format!("unexpected character '{}'", bad),
                    ));
                }
                segments.push(Segment::Key(rest[..len].to_string()));
                rest = &rest[len..];
                expect_key = false;
            }
        }

        Ok(Self { segments })
    }

    fn bracket_segment(path: &str, inner: &str) -> Result<Segment, PathError> {
        let quoted = inner.len() >= 2
            && ((inner.starts_with('"') && inner.ends_with('"'))
                || (inner.starts_with('\'') && inner.ends_with('\'')));
        if quoted {
            return Ok(Segment::Key(inner[1..inner.len() - 1].to_string()));
        }
        inner
            .parse::<usize>()
            .map(Segment::Index)
            .map_err(|_| PathError::malformed(path, format!("invalid index '{}'", inner)))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Look the path up, `None` meaning undefined
    pub fn resolve<'d>(&self, data: &'d Value) -> Option<&'d Value> {
        self.segments
            .iter()
            .try_fold(data, |value, segment| lookup(value, segment))
    }

    /// Look the path up, producing owned values for computed segments
    /// such as `items.length`
    pub fn resolve_value(&self, data: &Value) -> Option<Value> {
        let (last, init) = self.segments.split_last()?;
        let parent = init
            .iter()
            .try_fold(data, |value, segment| lookup(value, segment))?;
        if let Some(found) = lookup(parent, last) {
            return Some(found.clone());
        }
        match (parent, last) {
            (Value::Array(items), Segment::Key(k)) if k == "length" => Some(Value::from(items.len())),
            (Value::String(s), Segment::Key(k)) if k == "length" => {
                Some(Value::from(s.chars().count()))
            }
            _ => None,
        }
    }
}

fn lookup<'d>(value: &'d Value, segment: &Segment) -> Option<&'d Value> {
    match (value, segment) {
        (Value::Object(map), Segment::Key(k)) => map.get(k),
        (Value::Object(map), Segment::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        (Value::Array(items), Segment::Key(k)) => k.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Resolve a path string against data
pub fn resolve(path: &str, data: &Value) -> Result<Option<Value>, PathError> {
    Ok(VarPath::parse(path)?.resolve_value(data))
}

/// The content of a `@{...}` marker: a path with an optional fallback
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub path: VarPath,
    pub default: Option<String>,
}

impl Reference {
    /// Parse `path` or `path | "fallback"` (quotes optional)
    pub fn parse(text: &str) -> Result<Self, PathError> {
        match split_default(text) {
            Some((path, default)) => Ok(Self {
                path: VarPath::parse(path)?,
                default: Some(unquote(default.trim())),
            }),
            None => Ok(Self {
                path: VarPath::parse(text)?,
                default: None,
            }),
        }
    }

    /// Resolved value, the fallback for undefined or null, or `None`
    pub fn resolve(&self, data: &Value) -> Option<Value> {
        match self.path.resolve_value(data) {
            Some(Value::Null) | None => self.default.clone().map(Value::String),
            found => found,
        }
    }
}

/// Split at the first `|` outside quotes and brackets
fn split_default(text: &str) -> Option<(&str, &str)> {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '|') => return Some((&text[..i], &text[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(text: &str) -> String {
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        text[1..text.len() - 1].to_string()
    } else {
        text.to_string()
    }
}

/// Render a value as output text
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(", "),
        _ => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = VarPath::parse(r#"users[0].tags["a b"].x"#).expect("Should parse");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("users".to_string()),
                Segment::Index(0),
                Segment::Key("tags".to_string()),
                Segment::Key("a b".to_string()),
                Segment::Key("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_paths() {
        assert_eq!(VarPath::parse("  "), Err(PathError::Empty));
        assert!(VarPath::parse("a..b").is_err());
        assert!(VarPath::parse("a.").is_err());
        assert!(VarPath::parse("a[x]").is_err());
        assert!(VarPath::parse("a[0").is_err());
        assert!(VarPath::parse("a b").is_err());
    }

    #[test]
    fn test_resolve() {
        let data = json!({"user": {"name": "Ada", "roles": ["admin", "dev"]}});
        assert_eq!(resolve("user.name", &data), Ok(Some(json!("Ada"))));
        assert_eq!(resolve("user.roles[1]", &data), Ok(Some(json!("dev"))));
        assert_eq!(resolve("user.roles.0", &data), Ok(Some(json!("admin"))));
        assert_eq!(resolve("user.roles.length", &data), Ok(Some(json!(2))));
        assert_eq!(resolve("user.missing.deeper", &data), Ok(None));
    }

    #[test]
    fn test_reference_default() {
        let data = json!({"name": null});
        let reference = Reference::parse(r#"name | "guest""#).expect("Should parse");
        assert_eq!(reference.resolve(&data), Some(json!("guest")));
        let bare = Reference::parse("missing | anon").expect("Should parse");
        assert_eq!(bare.resolve(&data), Some(json!("anon")));
        let quoted_pipe = Reference::parse(r#"x | "a|b""#).expect("Should parse");
        assert_eq!(quoted_pipe.default.as_deref(), Some("a|b"));
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!(null)), "");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(3.0)), "3");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!(["a", 1, true])), "a, 1, true");
        assert_eq!(stringify(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
