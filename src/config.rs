//! Engine configuration
//!
//! Configuration can be built in code with the `with_*` builder methods or
//! loaded from a TOML file:
//!
//! ```toml
//! strict = true
//! template_dir = "prompts"
//! base_heading_level = 2
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Configuration options for compiling and rendering templates
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Strict rendering: condition errors are re-thrown, undefined variables,
    /// unknown formats and unmatched child sections are errors
    pub strict: bool,

    /// Reject directive keywords that do not start a statement
    pub strict_directives: bool,

    /// Cache compiled templates by source string
    pub cache: bool,

    /// Run the validation pass on every compiled template
    pub validate: bool,

    /// Deepest directive nesting accepted by validation
    pub max_nesting_depth: usize,

    /// Deepest include/extends recursion before rendering is aborted
    pub max_include_depth: usize,

    /// Markdown heading level of top-level sections
    pub base_heading_level: u8,

    /// Active model name for `model`-restricted sections
    pub model: Option<String>,

    /// Directory searched by the file loader
    pub template_dir: Option<PathBuf>,

    /// Extension appended to template names without one
    pub extension: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict: false,
            strict_directives: true,
            cache: true,
            validate: false,
            max_nesting_depth: 32,
            max_include_depth: 16,
            base_heading_level: 1,
            model: None,
            template_dir: None,
            extension: "qt".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Enable or disable strict rendering
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable or disable statement-boundary checks for directive keywords
    pub fn with_strict_directives(mut self, strict: bool) -> Self {
        self.strict_directives = strict;
        self
    }

    /// Enable or disable the compiled-template cache
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Enable or disable validation of compiled templates
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the nesting depth limit used by validation
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set the include/extends recursion limit
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Set the heading level of top-level sections
    pub fn with_base_heading_level(mut self, level: u8) -> Self {
        self.base_heading_level = level.max(1);
        self
    }

    /// Set the active model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the template directory for the file loader
    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }
}
