//! Quill - a template language for authoring structured prompts
//!
//! This library provides a lexer, parser and renderer for quill templates:
//! text with `@{variable}` interpolation, control-flow directives, named
//! sections and template inheritance.
//!
//! # Example
//!
//! ```rust
//! use quill::render;
//! use serde_json::json;
//!
//! let out = render("Hello @{name}!", &json!({"name": "Ada"})).unwrap();
//! assert_eq!(out, "Hello Ada!");
//! ```

pub mod config;
pub mod directive;
pub mod error;
pub mod expr;
pub mod parser;
pub mod render;
pub mod template;
pub mod validate;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

pub use config::{ConfigError, EngineConfig};
pub use directive::{Branch, Descriptor, Directive, DirectiveRegistry, Execution};
pub use error::{Error, RuntimeError, SyntaxError, ValidationError, ValidationIssue};
pub use expr::evaluate;
pub use parser::ast::{Args, DirectiveNode, Node, Position, Token, TokenKind};
pub use render::format::{Formatter, FormatterRegistry, Section};
pub use render::RenderContext;
pub use template::{
    FileLoader, MemoryLoader, Template, TemplateError, TemplateLoader, TemplateRegistry,
};
pub use validate::{assert_valid, validate, ValidationReport};

use render::Renderer;

/// Compiles and renders templates with one configuration and one set of
/// directives, formatters and named templates
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    directives: DirectiveRegistry,
    formatters: FormatterRegistry,
    templates: TemplateRegistry,
    /// Compiled inline templates keyed by source
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine; named templates are read from `template_dir` when
    /// it is set, otherwise only registered sources are known
    pub fn new(config: EngineConfig) -> Self {
        let templates = match &config.template_dir {
            Some(dir) => TemplateRegistry::new(
                FileLoader::new(dir).with_extension(config.extension.clone()),
            ),
            None => TemplateRegistry::new(MemoryLoader::new()),
        };
        Self {
            config,
            directives: DirectiveRegistry::builtin(),
            formatters: FormatterRegistry::builtin(),
            templates,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve named templates through another loader
    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.templates = TemplateRegistry::new(loader);
        self
    }

    /// Add or replace a directive
    pub fn with_directive(mut self, directive: impl Directive + 'static) -> Self {
        self.directives.register(directive);
        self
    }

    /// Add or replace a section formatter
    pub fn with_formatter(
        mut self,
        name: impl Into<String>,
        formatter: impl Formatter + 'static,
    ) -> Self {
        self.formatters.register(name, formatter);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Tokenize source without parsing it
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, SyntaxError> {
        parser::tokenize(source, &self.directives, self.config.strict_directives)
    }

    /// Compile an inline template, served from the cache when enabled
    pub fn compile(&self, source: &str) -> Result<Arc<Template>, Error> {
        if self.config.cache {
            let cached = self
                .cache
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(source)
                .cloned();
            if let Some(template) = cached {
                tracing::debug!(bytes = source.len(), "template served from cache");
                return Ok(template);
            }
        }

        let template = Arc::new(self.build(None, source)?);
        if self.config.cache {
            self.cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(source.to_string(), Arc::clone(&template));
        }
        Ok(template)
    }

    /// Compile a named template without registering it
    pub fn compile_named(&self, name: &str, source: &str) -> Result<Template, Error> {
        self.build(Some(name.to_string()), source)
    }

    fn build(&self, name: Option<String>, source: &str) -> Result<Template, Error> {
        let root = parser::parse(source, &self.directives, self.config.strict_directives)?;
        let template = Template::new(name, root);
        tracing::debug!(
            template = template.display_name(),
            bytes = source.len(),
            "compiled template"
        );
        if self.config.validate {
            assert_valid(&template, &self.config, &self.formatters)?;
        }
        Ok(template)
    }

    /// Compile a source and register it under `name` for `@include` and
    /// `@extends`
    pub fn register_source(&self, name: &str, source: &str) -> Result<Arc<Template>, Error> {
        let template = self.compile_named(name, source)?;
        Ok(self.templates.register(name, template))
    }

    /// A named template, loaded and compiled on first use
    pub fn load(&self, name: &str) -> Result<Arc<Template>, Error> {
        self.templates
            .load(name, |name, source| self.compile_named(name, source))
    }

    /// Compile and render an inline template
    pub fn render(&self, source: &str, data: &Value) -> Result<String, Error> {
        let template = self.compile(source)?;
        self.render_template(&template, data)
    }

    /// Render a compiled template
    pub fn render_template(&self, template: &Template, data: &Value) -> Result<String, Error> {
        Renderer::new(self).render(template, data)
    }

    /// Load and render a named template
    pub fn render_named(&self, name: &str, data: &Value) -> Result<String, Error> {
        let template = self.load(name)?;
        self.render_template(&template, data)
    }

    /// Run the validation pass with this engine's configuration
    pub fn validate(&self, template: &Template) -> ValidationReport {
        validate::validate(template, &self.config, &self.formatters)
    }
}

/// Compile source with the default configuration
pub fn compile(source: &str) -> Result<Arc<Template>, Error> {
    Engine::default().compile(source)
}

/// Render source with the default configuration
///
/// # Example
///
/// ```rust
/// use quill::render;
/// use serde_json::json;
///
/// let out = render(
///     "@if admin\nFull access\n@else\nRead only\n@end\n",
///     &json!({"admin": false}),
/// )
/// .unwrap();
/// assert_eq!(out, "Read only\n");
/// ```
pub fn render(source: &str, data: &Value) -> Result<String, Error> {
    render_with_config(source, data, EngineConfig::default())
}

/// Render source with a custom configuration
///
/// # Example
///
/// ```rust
/// use quill::{render_with_config, EngineConfig};
/// use serde_json::json;
///
/// let config = EngineConfig::new().with_strict(true);
/// let result = render_with_config("@{missing}", &json!({}), config);
/// assert!(result.is_err());
/// ```
pub fn render_with_config(
    source: &str,
    data: &Value,
    config: EngineConfig,
) -> Result<String, Error> {
    Engine::new(config).render(source, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render("just text", &json!({})).unwrap(), "just text");
    }

    #[test]
    fn test_render_variable() {
        let out = render("Hi @{user.name}", &json!({"user": {"name": "Ada"}})).unwrap();
        assert_eq!(out, "Hi Ada");
    }

    #[test]
    fn test_compile_is_cached() {
        let engine = Engine::default();
        let a = engine.compile("@{x}").unwrap();
        let b = engine.compile("@{x}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_compile_without_cache() {
        let engine = Engine::new(EngineConfig::new().with_cache(false));
        let a = engine.compile("@{x}").unwrap();
        let b = engine.compile("@{x}").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_syntax_error_surfaces() {
        let err = render("@if ok\nunclosed", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn test_validation_on_compile() {
        let engine = Engine::new(EngineConfig::new().with_validation(true));
        let err = engine
            .compile("@section a(format=yaml)\nx\n@end\n")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_register_and_render_named() {
        let engine = Engine::default();
        engine.register_source("greet", "Hello @{name}").unwrap();
        assert!(engine.templates().has("greet"));
        let out = engine.render_named("greet", &json!({"name": "Bo"})).unwrap();
        assert_eq!(out, "Hello Bo");
    }

    #[test]
    fn test_missing_named_template() {
        let err = Engine::default().load("nope").unwrap_err();
        let runtime = err.as_runtime().expect("runtime error");
        assert_eq!(runtime.context("template"), Some("nope"));
    }

    #[test]
    fn test_tokenize_respects_strict_directives() {
        let lenient = Engine::new(EngineConfig::new().with_strict_directives(false));
        assert!(lenient.tokenize("text @if x\n@end").is_ok());
        assert!(Engine::default().tokenize("text @if x\n@end").is_err());
    }
}
