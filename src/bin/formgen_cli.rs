//! formgen Command Line Interface
//!
//! Flattens exported model documents and resolves their form schemas.
//!
//! # Usage
//!
//! ```bash
//! # Print the flattened Type Dictionary
//! formgen_cli flatten --file TestModel.json --lib ./models
//!
//! # Resolve a root with user selections
//! formgen_cli resolve --file TestModel.json --root TestModel --selections sel.json
//!
//! # Emit the form schema, leaving enable predicates to the consumer
//! formgen_cli -o json schema --file TestModel.json --root TestModel --defer-enable
//! ```
//!
//! Logging follows `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use formgen::{
    EnablePolicy, EnableState, Engine, EngineConfig, FileSystemTypeResolver, Selections,
    StoredDefinition,
};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formgen_cli")]
#[command(version = "0.1.0")]
#[command(about = "Flatten model ASTs and resolve form schemas")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or pretty (default)
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,

    /// Engine config file (defaults to FORMGEN_CONFIG, then ./formgen.yaml)
    #[arg(long, global = true, env = "FORMGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Extra library root for type lookup (repeatable)
    #[arg(long = "lib", global = true)]
    libs: Vec<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten a model and print its Type Dictionary
    Flatten {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Resolve every instance path below a root
    Resolve {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Dictionary path of the class to resolve
        #[arg(short, long)]
        root: String,

        /// JSON object of instance path -> value
        #[arg(short, long)]
        selections: Option<PathBuf>,
    },

    /// Resolve a root and print its form schema
    Schema {
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long)]
        root: String,

        #[arg(short, long)]
        selections: Option<PathBuf>,

        /// Emit enable predicates instead of evaluating them
        #[arg(long)]
        defer_enable: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| match &cli.command {
        Commands::Flatten { file } => cmd_flatten(file.clone(), config, cli.format),
        Commands::Resolve {
            file,
            root,
            selections,
        } => cmd_resolve(file.clone(), root, selections.clone(), config, cli.format),
        Commands::Schema {
            file,
            root,
            selections,
            defer_enable,
        } => {
            let config = if *defer_enable {
                config.with_enable_policy(EnablePolicy::Defer)
            } else {
                config
            };
            cmd_schema(file.clone(), root, selections.clone(), config, cli.format)
        }
    });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "error": e }));
            } else {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_flatten(file: Option<PathBuf>, config: EngineConfig, format: OutputFormat) -> Result<(), String> {
    let engine = load_engine(file, config)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "roots": engine.roots(),
                "definitions": engine.dictionary(),
                "diagnostics": engine.diagnostics(),
            });
            print_json(&output)?;
        }
        OutputFormat::Pretty => {
            println!(
                "{} Flattened {} definition(s)",
                "OK".green(),
                engine.dictionary().len()
            );
            for definition in engine.dictionary().iter() {
                let kind = if definition.is_class() { "class" } else { "component" };
                println!("  {:<9} {} : {}", kind, definition.path.bold(), definition.data_type);
            }
            print_diagnostics(&engine);
        }
    }
    Ok(())
}

fn cmd_resolve(
    file: Option<PathBuf>,
    root: &str,
    selections: Option<PathBuf>,
    config: EngineConfig,
    format: OutputFormat,
) -> Result<(), String> {
    let engine = load_engine(file, config)?;
    let selections = read_selections(selections)?;
    let scope = engine
        .resolve(root, &selections)
        .map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Json => print_json(&scope)?,
        OutputFormat::Pretty => {
            println!("{} Resolved {} value(s) for {}", "OK".green(), scope.len(), root);
            for (path, value) in scope.iter() {
                println!("  {} = {}", path.bold(), value);
            }
            print_diagnostics(&engine);
        }
    }
    Ok(())
}

fn cmd_schema(
    file: Option<PathBuf>,
    root: &str,
    selections: Option<PathBuf>,
    config: EngineConfig,
    format: OutputFormat,
) -> Result<(), String> {
    let engine = load_engine(file, config)?;
    let selections = read_selections(selections)?;
    let schema = engine
        .schema(root, &selections)
        .map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Json => print_json(&schema)?,
        OutputFormat::Pretty => {
            println!("{} Schema for {}", "OK".green(), schema.root);
            for node in &schema.nodes {
                let enable = match &node.enable {
                    EnableState::Evaluated(true) => "enabled".green().to_string(),
                    EnableState::Evaluated(false) => "disabled".yellow().to_string(),
                    EnableState::Deferred(term) => format!("enable: {}", term),
                };
                let value = node
                    .value
                    .as_ref()
                    .map(|v| format!(" = {}", v))
                    .unwrap_or_default();
                println!("  {} : {}{} [{}]", node.path.bold(), node.type_name, value, enable);
            }
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn load_config(cli: &Cli) -> Result<EngineConfig, String> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).and_then(|c| {
            c.apply_overrides(|key| std::env::var(key).ok())
        }),
        None => EngineConfig::from_env(),
    }
    .map_err(|e| format!("{:#}", e))?;

    Ok(cli
        .libs
        .iter()
        .fold(config, |config, lib| config.with_library_root(lib)))
}

/// Load from a file, or from stdin with only the configured library roots
fn load_engine(file: Option<PathBuf>, config: EngineConfig) -> Result<Engine, String> {
    match file {
        Some(path) => Engine::load_file(&path, config)
            .map_err(|e| format!("Failed to load '{}': {}", path.display(), e)),
        None => {
            let source = read_stdin()?;
            let document = StoredDefinition::from_json_str(&source)
                .map_err(|e| format!("Invalid model document: {}", e))?;
            let resolver = FileSystemTypeResolver::new(config.library_roots.clone());
            Engine::load(&document, &resolver, config).map_err(|e| e.to_string())
        }
    }
}

fn read_stdin() -> Result<String, String> {
    if io::stdin().is_terminal() {
        return Err("No input provided. Use --file or pipe input via stdin.".to_string());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;
    Ok(buffer)
}

fn read_selections(path: Option<PathBuf>) -> Result<Selections, String> {
    let Some(path) = path else {
        return Ok(Selections::new());
    };
    let source = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let json: serde_json::Value = serde_json::from_str(&source)
        .map_err(|e| format!("Invalid selections JSON '{}': {}", path.display(), e))?;
    Selections::from_json(&json).map_err(|e| e.to_string())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))?
    );
    Ok(())
}

fn print_diagnostics(engine: &Engine) {
    for diagnostic in engine.diagnostics() {
        let label = if diagnostic.is_warning() {
            "warning".yellow().bold()
        } else {
            "note".cyan()
        };
        eprintln!("{}: {}", label, diagnostic);
    }
}
