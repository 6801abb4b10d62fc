//! Quill CLI
//!
//! Usage:
//!   quill [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -d, --data <FILE>         JSON data context (`-` reads stdin)
//!   -c, --config <FILE>       Engine configuration (TOML format)
//!   -I, --templates <DIR>     Directory for @include and @extends targets
//!   --strict                  Fail on undefined variables and bad conditions
//!   --lenient-directives      Accept directive keywords mid-line
//!   --check                   Validate the template and print the report
//!   --tokens                  Print the token stream
//!   -v, --verbose             Debug logging
//!   -h, --help                Print help

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use quill::{Engine, EngineConfig, Error};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Render quill prompt templates")]
struct Cli {
    /// Template file to render
    template: PathBuf,

    /// JSON data context (`-` reads stdin)
    #[arg(short, long)]
    data: Option<String>,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory searched for included and extended templates
    #[arg(short = 'I', long)]
    templates: Option<PathBuf>,

    /// Strict rendering
    #[arg(long)]
    strict: bool,

    /// Accept directive keywords that do not start a statement
    #[arg(long)]
    lenient_directives: bool,

    /// Validate only and print the report
    #[arg(long)]
    check: bool,

    /// Print the token stream instead of rendering
    #[arg(long)]
    tokens: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli);
    let engine = Engine::new(config);

    let filename = cli.template.display().to_string();
    let source = match fs::read_to_string(&cli.template) {
        Ok(content) => content,
        Err(e) => fail(format!("Error reading template '{}': {}", filename, e)),
    };

    if cli.tokens {
        match engine.tokenize(&source) {
            Ok(tokens) => {
                for token in tokens {
                    println!("{}", token);
                }
            }
            Err(e) => fail(e.report(&source, &filename)),
        }
        return;
    }

    let template = match engine.compile(&source) {
        Ok(template) => template,
        Err(e) => fail(describe(&e, &source, &filename)),
    };

    if cli.check {
        let report = engine.validate(&template);
        if report.valid {
            println!("{}: ok", filename);
            return;
        }
        for issue in &report.errors {
            eprintln!("{}:{}", filename, issue);
        }
        process::exit(1);
    }

    let data = match &cli.data {
        Some(path) => read_data(path),
        None => Value::Object(Default::default()),
    };

    // Errors here may come from other templates, so no excerpt
    match engine.render_template(&template, &data) {
        Ok(output) => print!("{}", output),
        Err(e) => fail(format!("Error: {}", e)),
    }
}

fn load_config(cli: &Cli) -> EngineConfig {
    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => fail(format!("Error loading config '{}': {}", path.display(), e)),
        },
        None => EngineConfig::default(),
    };

    if cli.strict {
        config = config.with_strict(true);
    }
    if cli.lenient_directives {
        config = config.with_strict_directives(false);
    }
    if let Some(dir) = &cli.templates {
        config = config.with_template_dir(dir);
    } else if config.template_dir.is_none() {
        let parent = cli.template.parent().unwrap_or(Path::new("."));
        config = config.with_template_dir(parent);
    }
    config
}

fn read_data(path: &str) -> Value {
    let text = if path == "-" {
        let mut buffer = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut buffer) {
            fail(format!("Error reading data from stdin: {}", e));
        }
        buffer
    } else {
        match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(format!("Error reading data file '{}': {}", path, e)),
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => fail(format!("Error parsing data '{}': {}", path, e)),
    }
}

/// Syntax errors in the rendered file get a source excerpt
fn describe(err: &Error, source: &str, filename: &str) -> String {
    match err {
        Error::Syntax(e) => e.report(source, filename),
        other => format!("Error: {}", other),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}
