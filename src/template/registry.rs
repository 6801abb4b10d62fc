//! Template loaders and the registry of compiled templates

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::error::{Error, RuntimeError};
use crate::template::Template;

/// Errors that can occur while locating or loading a template
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    /// No loader knows the template
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// Error reading template file
    #[error("error reading template file {path}: {message}")]
    FileReadError {
        name: String,
        path: PathBuf,
        message: String,
    },

    /// Circular include/extends chain
    #[error("circular template reference: {chain}")]
    CircularReference { name: String, chain: String },

    /// Include/extends nesting beyond the configured limit
    #[error("maximum template depth of {limit} exceeded while loading {name}")]
    DepthExceeded { name: String, limit: usize },
}

impl TemplateError {
    /// Name of the template the error is about
    pub fn name(&self) -> &str {
        match self {
            TemplateError::NotFound { name }
            | TemplateError::FileReadError { name, .. }
            | TemplateError::CircularReference { name, .. }
            | TemplateError::DepthExceeded { name, .. } => name,
        }
    }
}

impl From<TemplateError> for RuntimeError {
    fn from(err: TemplateError) -> Self {
        let name = err.name().to_string();
        RuntimeError::new(err.to_string()).with_context("template", name)
    }
}

impl From<TemplateError> for Error {
    fn from(err: TemplateError) -> Self {
        Error::Runtime(err.into())
    }
}

/// Source of template text by name
pub trait TemplateLoader: Send + Sync + fmt::Debug {
    fn exists(&self, name: &str) -> bool;
    fn load_source(&self, name: &str) -> Result<String, TemplateError>;
}

/// Loads templates from a directory
#[derive(Debug, Clone)]
pub struct FileLoader {
    /// Base path for resolving relative names
    base_path: PathBuf,
    /// Extension appended to names that have none
    extension: Option<String>,
}

impl FileLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_string();
        self.extension = (!extension.is_empty()).then_some(extension);
        self
    }

    /// Resolve a template name to a file path
    pub fn resolve_path(&self, name: &str) -> PathBuf {
        let mut path = self.base_path.join(name);
        if path.extension().is_none() {
            if let Some(extension) = &self.extension {
                path.set_extension(extension);
            }
        }
        path
    }
}

impl TemplateLoader for FileLoader {
    fn exists(&self, name: &str) -> bool {
        self.resolve_path(name).is_file()
    }

    fn load_source(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.resolve_path(name);
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TemplateError::NotFound {
                name: name.to_string(),
            },
            _ => TemplateError::FileReadError {
                name: name.to_string(),
                path: path.clone(),
                message: e.to_string(),
            },
        })
    }
}

/// Serves template sources from memory
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl TemplateLoader for MemoryLoader {
    fn exists(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    fn load_source(&self, name: &str) -> Result<String, TemplateError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
            })
    }
}

/// Registry of compiled templates, filled on demand from a loader
#[derive(Debug)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Arc<Template>>>,
    loader: Box<dyn TemplateLoader>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(MemoryLoader::new())
    }
}

impl TemplateRegistry {
    pub fn new(loader: impl TemplateLoader + 'static) -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            loader: Box::new(loader),
        }
    }

    /// Whether a template is registered or can be loaded
    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name) || self.loader.exists(name)
    }

    /// A registered template
    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.read().get(name).cloned()
    }

    /// Register a compiled template, replacing any previous one
    pub fn register(&self, name: &str, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::clone(&template));
        template
    }

    /// Get a template, loading and compiling it on first use
    ///
    /// Two concurrent first loads may both compile; the last one registered
    /// wins.
    pub fn load<F>(&self, name: &str, compile: F) -> Result<Arc<Template>, Error>
    where
        F: FnOnce(&str, &str) -> Result<Template, Error>,
    {
        if let Some(template) = self.get(name) {
            return Ok(template);
        }
        let source = self.loader.load_source(name)?;
        let template = compile(name, &source)?;
        tracing::debug!(template = name, "loaded template");
        Ok(self.register(name, template))
    }

    /// Names of all registered templates
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Template>>> {
        self.templates.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::DirectiveNode;

    fn empty(name: &str) -> Template {
        Template::new(Some(name.to_string()), DirectiveNode::root(vec![]))
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = TemplateRegistry::default();
        registry.register("box", empty("box"));
        assert!(registry.has("box"));
        assert!(registry.get("box").is_some());
        assert_eq!(registry.names(), vec!["box".to_string()]);
    }

    #[test]
    fn test_registry_loads_once() {
        let registry = TemplateRegistry::new(MemoryLoader::new().with_template("a", "A"));
        assert!(registry.has("a"));
        assert!(registry.get("a").is_none());

        let first = registry
            .load("a", |name, _| Ok(empty(name)))
            .expect("Should load");
        let second = registry
            .load("a", |_, _| Err(Error::runtime("compiled twice")))
            .expect("Should be cached");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_template_carries_context() {
        let registry = TemplateRegistry::default();
        let err = registry
            .load("nope", |name, _| Ok(empty(name)))
            .unwrap_err();
        let runtime = err.as_runtime().expect("runtime error");
        assert_eq!(runtime.context("template"), Some("nope"));
        assert!(runtime.message.contains("template not found"));
    }

    #[test]
    fn test_file_loader_resolve_path() {
        let loader = FileLoader::new("/prompts").with_extension(".qt");
        assert_eq!(loader.resolve_path("base"), PathBuf::from("/prompts/base.qt"));
        assert_eq!(
            loader.resolve_path("shared/footer.txt"),
            PathBuf::from("/prompts/shared/footer.txt")
        );
    }

    #[test]
    fn test_file_loader_reads_files() {
        let dir = std::env::temp_dir().join(format!("quill-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        std::fs::write(dir.join("hello.qt"), "Hello").expect("write");

        let loader = FileLoader::new(&dir).with_extension("qt");
        assert!(loader.exists("hello"));
        assert_eq!(loader.load_source("hello").expect("Should read"), "Hello");
        assert!(matches!(
            loader.load_source("missing"),
            Err(TemplateError::NotFound { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
