//! Section formatters selected by a section's `format` attribute

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::parser::args::Attributes;

/// A rendered section handed to a formatter
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    /// Heading level, 1 for top-level sections
    pub level: u8,
    /// Attributes without the inheritance and rendering controls
    pub attributes: Attributes,
    /// Rendered content, nested sections included
    pub content: String,
}

pub trait Formatter: Send + Sync {
    fn format_section(&self, section: &Section) -> String;
}

/// `# Title` headings, deeper for nested formatted sections
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_section(&self, section: &Section) -> String {
        let level = section.level.clamp(1, 6) as usize;
        let title = section
            .attributes
            .get("title")
            .map(str::to_string)
            .unwrap_or_else(|| humanize(&section.name));
        let mut out = format!("{} {}\n", "#".repeat(level), title);
        if !section.content.is_empty() {
            out.push('\n');
            out.push_str(&section.content);
            out.push('\n');
        }
        out
    }
}

/// `<name attr="...">content</name>` blocks
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlFormatter;

impl Formatter for XmlFormatter {
    fn format_section(&self, section: &Section) -> String {
        let tag = xml_name(&section.name);
        let attributes: String = section
            .attributes
            .iter()
            .map(|(k, v)| format!(" {}=\"{}\"", xml_name(k), escape_xml(v)))
            .collect();
        if section.content.is_empty() {
            format!("<{tag}{attributes}>\n</{tag}>\n")
        } else {
            format!("<{tag}{attributes}>\n{}\n</{tag}>\n", section.content)
        }
    }
}

/// One pretty-printed JSON object per section
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_section(&self, section: &Section) -> String {
        let attributes: Map<String, Value> = section
            .attributes
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        let value = json!({
            "section": section.name,
            "level": section.level,
            "attributes": attributes,
            "content": section.content,
        });
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        format!("{}\n", text)
    }
}

/// Content only
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn format_section(&self, section: &Section) -> String {
        if section.content.is_empty() {
            String::new()
        } else {
            format!("{}\n", section.content)
        }
    }
}

/// `getting_started` -> `Getting Started`
pub fn humanize(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn xml_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.chars().next() {
        None => "section".to_string(),
        Some(c) if c.is_alphabetic() || c == '_' => cleaned,
        Some(_) => format!("_{}", cleaned),
    }
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formatters keyed by the `format` attribute value
#[derive(Clone)]
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn Formatter>>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("formatters", &self.names())
            .finish()
    }
}

impl FormatterRegistry {
    /// `markdown`, `xml`, `json` and `plain`
    pub fn builtin() -> Self {
        let mut registry = Self {
            formatters: HashMap::new(),
        };
        registry.register("markdown", MarkdownFormatter);
        registry.register("xml", XmlFormatter);
        registry.register("json", JsonFormatter);
        registry.register("plain", PlainFormatter);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, formatter: impl Formatter + 'static) {
        self.formatters.insert(name.into(), Arc::new(formatter));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Formatter>> {
        self.formatters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formatters.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}
