//! Template inheritance: override chains and the section-merge engine
//!
//! Rendering a template that `@extends` another works from the most
//! derived template towards the root:
//!
//! 1. every top-level `@section` of the current template is rendered
//!    eagerly into a [`SectionOverride`], at the heading level of the
//!    ancestor section it will land in;
//! 2. the overrides are merged into the chains handed down by more derived
//!    templates (a deeper replace wins, prepends from every level stack
//!    outermost first, appends root first);
//! 3. the ancestor is rendered with the merged chains in its
//!    [`SectionScope`]; each ancestor `@section` consumes its chain;
//! 4. sections marked `new` are appended after the ancestor's output.

use std::collections::{BTreeMap, HashSet};
use std::iter;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::directive::missing_args;
use crate::error::{Error, RuntimeError};
use crate::parser::args::{Attributes, SectionArgs};
use crate::parser::ast::{Args, DirectiveNode, Node};
use crate::render::format::Section;
use crate::render::RenderContext;
use crate::template::Template;

/// Attributes that steer inheritance and rendering and are never passed to
/// formatters
pub const CONTROL_ATTRIBUTES: &[&str] = &[
    "overridable",
    "override",
    "prepend",
    "append",
    "new",
    "format",
    "model",
];

/// Attributes that only describe how one level contributes
const MODE_ATTRIBUTES: &[&str] = &["override", "prepend", "append", "new"];

/// How a derived template's section applies to its ancestor's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    Replace,
    Prepend,
    Append,
    /// Not in the ancestor; appended after its output
    New,
}

impl OverrideMode {
    /// Mode from section attributes; a section without flags replaces
    pub fn from_attributes(attributes: &Attributes) -> Self {
        if attributes.flag("new") {
            OverrideMode::New
        } else if attributes.flag("override") {
            OverrideMode::Replace
        } else if attributes.flag("prepend") {
            OverrideMode::Prepend
        } else if attributes.flag("append") {
            OverrideMode::Append
        } else {
            OverrideMode::Replace
        }
    }
}

/// One template level's contribution to a section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionOverride {
    pub name: String,
    pub mode: OverrideMode,
    pub content: String,
    pub attributes: Attributes,
}

/// Contributions to one section name from every derived level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideChain {
    pub replace: Option<String>,
    /// Outermost (most derived) first
    pub prepends: Vec<String>,
    /// Nearest to the root first
    pub appends: Vec<String>,
    pub attributes: Attributes,
}

impl OverrideChain {
    /// A replace has been recorded; shallower replaces are shadowed
    pub fn is_resolved(&self) -> bool {
        self.replace.is_some()
    }

    /// Merge a contribution from a level closer to the root than every
    /// contribution already in the chain. Returns `false` if it is shadowed.
    ///
    /// Prepends and appends from every level are kept around whichever
    /// content wins.
    pub fn merge_ancestor(&mut self, contribution: &SectionOverride) -> bool {
        match contribution.mode {
            OverrideMode::Replace if self.is_resolved() => return false,
            OverrideMode::Replace => self.replace = Some(contribution.content.clone()),
            OverrideMode::Prepend => self.prepends.push(contribution.content.clone()),
            OverrideMode::Append => self.appends.insert(0, contribution.content.clone()),
            OverrideMode::New => return false,
        }
        for (key, value) in contribution.attributes.without(MODE_ATTRIBUTES).iter() {
            self.attributes.insert_missing(key, value);
        }
        true
    }

    /// Final content of the section given the ancestor's own content
    pub fn apply(&self, base: &str) -> String {
        let base = self.replace.as_deref().unwrap_or(base);
        self.prepends
            .iter()
            .map(String::as_str)
            .chain(iter::once(base))
            .chain(self.appends.iter().map(String::as_str))
            .map(tidy)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Override chains by section name
pub type OverrideMap = BTreeMap<String, OverrideChain>;

/// Section state of one render call, kept beside the user data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionScope {
    /// Chains not yet consumed by an ancestor section
    pub overrides: OverrideMap,
    /// Heading level for the next formatted section
    pub level: u8,
    pub parent_section: Option<String>,
    /// Sections nested inside a replaced section
    pub replaced: HashSet<String>,
}

impl SectionScope {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_overrides(overrides: OverrideMap, level: u8) -> Self {
        Self {
            overrides,
            ..Self::new(level)
        }
    }
}

/// Strip surrounding line breaks
pub fn tidy(content: &str) -> &str {
    content.trim_matches(|c| c == '\n' || c == '\r')
}

fn section_args(node: &DirectiveNode) -> Result<&SectionArgs, Error> {
    match &node.args {
        Args::Section(args) => Ok(args),
        _ => Err(missing_args(node)),
    }
}

/// Whether a `model`-restricted section applies to the configured model
pub fn model_matches(config: &EngineConfig, attributes: &Attributes) -> bool {
    let models = attributes.list("model");
    match &config.model {
        Some(model) if !models.is_empty() => models.iter().any(|m| m == model),
        _ => true,
    }
}

/// Render a section's children with heading-level bookkeeping
///
/// `level` is the heading level of the section itself; nested sections go
/// one level deeper when it is formatted.
fn render_body(
    ctx: &mut RenderContext<'_, '_>,
    node: &DirectiveNode,
    name: &str,
    level: u8,
    formatted: bool,
) -> Result<String, Error> {
    let inner = if formatted {
        level.saturating_add(1)
    } else {
        level
    };
    let scope = ctx.scope();
    let parent = scope.parent_section.replace(name.to_string());
    let outer = std::mem::replace(&mut scope.level, inner);

    let result = ctx.render(&node.children, None);

    let scope = ctx.scope();
    scope.level = outer;
    scope.parent_section = parent;
    result
}

/// Depth of the section named `name` below formatted sections in `nodes`,
/// and whether the section itself is formatted
fn find_section(nodes: &[Node], name: &str, depth: u8) -> Option<(u8, bool)> {
    for node in nodes {
        let Node::Directive(directive) = node else {
            continue;
        };
        let mut inner = depth;
        if let Args::Section(args) = &directive.args {
            let formatted = args.attributes.get("format").is_some();
            if args.name == name {
                return Some((depth, formatted));
            }
            if formatted {
                inner = depth.saturating_add(1);
            }
        }
        if let Some(found) = find_section(&directive.children, name, inner) {
            return Some(found);
        }
    }
    None
}

/// `template` followed by the templates it extends, root last
///
/// Stops at a template that cannot be loaded or past the include depth;
/// rendering the ancestor reports those.
fn ancestry(ctx: &RenderContext<'_, '_>, template: Arc<Template>) -> Vec<Arc<Template>> {
    let mut chain = vec![template];
    while chain.len() <= ctx.config().max_include_depth {
        let target = match chain.last().and_then(|t| t.extends()).map(|e| &e.args) {
            Some(Args::Target(target)) => target.clone(),
            _ => break,
        };
        match ctx.load(&target) {
            Ok(parent) => chain.push(parent),
            Err(_) => break,
        }
    }
    chain
}

/// Where the ancestors render a section, searched from the root down
fn ancestor_placement(ancestry: &[Arc<Template>], name: &str) -> Option<(u8, bool)> {
    ancestry
        .iter()
        .rev()
        .find_map(|template| find_section(&template.root.children, name, 0))
}

/// Names of every section nested anywhere below `node`
fn nested_sections(nodes: &[Node], names: &mut HashSet<String>) {
    for node in nodes {
        if let Node::Directive(directive) = node {
            if let Args::Section(args) = &directive.args {
                names.insert(args.name.clone());
            }
            nested_sections(&directive.children, names);
        }
    }
}

/// Final output of a section: formatted if it has a `format`, otherwise
/// its content as a block of lines
fn section_output(
    ctx: &RenderContext<'_, '_>,
    name: &str,
    attributes: &Attributes,
    content: &str,
    level: u8,
) -> Result<String, Error> {
    let content = tidy(content);
    match attributes.get("format") {
        Some(format) => {
            let section = Section {
                name: name.to_string(),
                level,
                attributes: attributes.without(CONTROL_ATTRIBUTES),
                content: content.to_string(),
            };
            ctx.format_section(format, &section)
        }
        None if content.is_empty() => Ok(String::new()),
        None => Ok(format!("{}\n", content)),
    }
}

/// Execute a `@section` directive
pub fn render_section(
    ctx: &mut RenderContext<'_, '_>,
    node: &DirectiveNode,
) -> Result<String, Error> {
    let args = section_args(node)?;
    if !model_matches(ctx.config(), &args.attributes) {
        tracing::debug!(section = %args.name, "section skipped for the configured model");
        return Ok(String::new());
    }
    if ctx.scope().replaced.contains(&args.name) {
        return Ok(String::new());
    }

    let level = ctx.scope().level;
    let (content, attributes) = match ctx.scope().overrides.remove(&args.name) {
        None => {
            let formatted = args.attributes.get("format").is_some();
            let content = render_body(ctx, node, &args.name, level, formatted)?;
            (content, args.attributes.clone())
        }
        Some(chain) => {
            let mut attributes = args.attributes.clone();
            for (key, value) in chain.attributes.iter() {
                attributes.insert(key, value);
            }
            let base = if chain.is_resolved() {
                if !args.attributes.flag("overridable") {
                    return Err(RuntimeError::new(format!(
                        "Cannot override non-overridable section '{}'",
                        args.name
                    ))
                    .with_context("section", args.name.as_str())
                    .into());
                }
                nested_sections(&node.children, &mut ctx.scope().replaced);
                String::new()
            } else {
                let formatted = attributes.get("format").is_some();
                render_body(ctx, node, &args.name, level, formatted)?
            };
            (chain.apply(&base), attributes)
        }
    };

    section_output(ctx, &args.name, &attributes, &content, level)
}

/// Execute an `@extends` directive: render the ancestor with this
/// template's sections applied
pub fn render_extends(
    ctx: &mut RenderContext<'_, '_>,
    node: &DirectiveNode,
) -> Result<String, Error> {
    let target = match &node.args {
        Args::Target(target) => target.as_str(),
        _ => return Err(missing_args(node)),
    };
    let ancestor = ctx.load(target)?;
    let template = ctx.template();
    let ancestors = ancestry(ctx, Arc::clone(&ancestor));
    let level = ctx.scope().level;

    // Contributions render at the heading level of the ancestor section
    // they end up in, formatted if any level gives that section a format
    let mut contributions = Vec::new();
    for section in template.sections() {
        let args = section_args(section)?;
        if !model_matches(ctx.config(), &args.attributes) {
            continue;
        }
        let mode = OverrideMode::from_attributes(&args.attributes);
        let (depth, ancestor_formatted) = match mode {
            OverrideMode::New => (0, false),
            _ => ancestor_placement(&ancestors, &args.name).unwrap_or((0, false)),
        };
        let derived_formatted = ctx
            .scope()
            .overrides
            .get(&args.name)
            .is_some_and(|chain| chain.attributes.get("format").is_some());
        let formatted =
            args.attributes.get("format").is_some() || derived_formatted || ancestor_formatted;
        let content = render_body(
            ctx,
            section,
            &args.name,
            level.saturating_add(depth),
            formatted,
        )?;
        contributions.push(SectionOverride {
            name: args.name.clone(),
            mode,
            content,
            attributes: args.attributes.clone(),
        });
    }

    let mut merged = std::mem::take(&mut ctx.scope().overrides);
    let mut added = Vec::new();
    for contribution in contributions {
        if contribution.mode == OverrideMode::New {
            added.push(contribution);
            continue;
        }
        let chain = merged.entry(contribution.name.clone()).or_default();
        if !chain.merge_ancestor(&contribution) {
            tracing::debug!(
                section = %contribution.name,
                template = template.display_name(),
                "section shadowed by a more derived replacement"
            );
        }
    }
    tracing::trace!(template = target, sections = merged.len(), "merged override chains");

    let outer = std::mem::replace(ctx.scope(), SectionScope::with_overrides(merged, level));
    let rendered = ctx.render_template(&ancestor, None);
    let inner = std::mem::replace(ctx.scope(), outer);
    let mut output = rendered?;

    let unmatched: Vec<&String> = inner
        .overrides
        .keys()
        .filter(|name| !inner.replaced.contains(*name))
        .collect();
    for name in unmatched {
        if ctx.config().strict {
            return Err(RuntimeError::new(format!(
                "Section '{}' does not exist in '{}'; mark it new=true to add it",
                name, target
            ))
            .with_context("section", name.as_str())
            .with_context("template", target)
            .into());
        }
        tracing::warn!(
            section = %name,
            template = target,
            "dropping section with no counterpart in the extended template"
        );
    }

    for section in added {
        let text = section_output(ctx, &section.name, &section.attributes, &section.content, level)?;
        if text.is_empty() {
            continue;
        }
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&text);
    }

    Ok(output)
}
