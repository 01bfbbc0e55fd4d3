//! CLI subcommands: init, validate, run, get, digest, schema.

use crate::core::actions::{Action, Outcome};
use crate::core::runtime::Runtime;
use crate::core::{parser, types};
use crate::surface::digest;
use crate::surface::memory::MemorySurface;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter page bundle
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a page bundle
    Validate {
        /// Path to the page bundle (YAML, or JSON with a .json extension)
        #[arg(short, long, default_value = "page.yaml")]
        file: PathBuf,
    },

    /// Apply a list of actions and print the resulting surface
    Run {
        /// Path to the page bundle
        #[arg(short, long, default_value = "page.yaml")]
        file: PathBuf,

        /// JSON file holding a list of action descriptors
        #[arg(short, long)]
        actions: PathBuf,

        /// Instance the actions run against
        #[arg(short, long, default_value = "main")]
        instance: String,

        /// Value substituted for `$VALUE` in action parameters
        #[arg(long)]
        current: Option<String>,

        /// Print only the surface digest
        #[arg(long)]
        digest: bool,
    },

    /// Print a variable's resolved value
    Get {
        /// Qualified variable name (`ns#base.field`)
        variable: String,

        /// Path to the page bundle
        #[arg(short, long, default_value = "page.yaml")]
        file: PathBuf,

        /// Actions to apply first
        #[arg(short, long)]
        actions: Option<PathBuf>,

        #[arg(short, long, default_value = "main")]
        instance: String,
    },

    /// Print the BLAKE3 digest of the initial surface
    Digest {
        /// Path to the page bundle
        #[arg(short, long, default_value = "page.yaml")]
        file: PathBuf,
    },

    /// Print the JSON schema of the page bundle format
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Run {
            file,
            actions,
            instance,
            current,
            digest,
        } => cmd_run(&file, &actions, &instance, current.as_deref(), digest),
        Commands::Get {
            variable,
            file,
            actions,
            instance,
        } => cmd_get(&file, &variable, actions.as_deref(), &instance),
        Commands::Digest { file } => cmd_digest(&file),
        Commands::Schema => cmd_schema(),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let bundle_path = path.join("page.yaml");
    if bundle_path.exists() {
        return Err(format!("{} already exists", bundle_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let template = r#"instance: main

variables:
  counter:
    value: "0"
    dependencies:
      count:
        - dependency_type: Value

nodes:
  - id: count
    content: "0"

options:
  max_cascade_depth: 64
"#;
    std::fs::write(&bundle_path, template)
        .map_err(|e| format!("cannot write {}: {}", bundle_path.display(), e))?;

    println!("Initialized weft page at {}", path.display());
    println!("  Created: {}", bundle_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let bundle = parser::parse_bundle_file(file)?;
    let errors = parser::validate_bundle(&bundle);

    if errors.is_empty() {
        println!(
            "OK: {} ({} variables, {} nodes, {} external children)",
            bundle.instance,
            bundle.variables.len(),
            bundle.nodes.len(),
            bundle.external_children.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a bundle file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::PageBundle, String> {
    let bundle = parser::parse_bundle_file(file)?;
    let errors = parser::validate_bundle(&bundle);
    if errors.is_empty() {
        return Ok(bundle);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

fn load_actions(path: &Path) -> Result<Vec<Action>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("invalid actions in {}: {}", path.display(), e))
}

/// Build a runtime from `file` and run `actions` against `instance`.
fn load(
    file: &Path,
    actions: Option<&Path>,
    instance: &str,
    current: Option<&str>,
) -> Result<Runtime<MemorySurface>, String> {
    let bundle = parse_and_validate(file)?;
    let mut runtime = Runtime::from_bundle(&bundle);
    if let Some(path) = actions {
        let actions = load_actions(path)?;
        let current = current.map(types::Value::from_raw);
        let outcomes = runtime
            .dispatch_all(instance, &actions, current.as_ref())
            .map_err(|e| e.to_string())?;
        for outcome in outcomes {
            match outcome {
                Outcome::Applied(report) if !report.refused.is_empty() => {
                    eprintln!("  WARN: cascade refused {}", report.refused.join(", "));
                }
                Outcome::Message { function, data } => {
                    eprintln!("  host: {} {}", function, data);
                }
                _ => {}
            }
        }
    }
    Ok(runtime)
}

fn cmd_run(
    file: &Path,
    actions: &Path,
    instance: &str,
    current: Option<&str>,
    print_digest: bool,
) -> Result<(), String> {
    let runtime = load(file, Some(actions), instance, current)?;
    if print_digest {
        println!("{}", digest::digest(runtime.surface())?);
    } else {
        let json = serde_json::to_string_pretty(&runtime.surface().snapshot())
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", json);
    }
    Ok(())
}

fn cmd_get(file: &Path, variable: &str, actions: Option<&Path>, instance: &str) -> Result<(), String> {
    let runtime = load(file, actions, instance, None)?;
    let value = runtime
        .get_value(instance, variable)
        .map_err(|e| e.to_string())?;
    println!("{}", value.resolve_kind());
    Ok(())
}

fn cmd_digest(file: &Path) -> Result<(), String> {
    let runtime = load(file, None, "main", None)?;
    println!("{}", digest::digest(runtime.surface())?);
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::PageBundle);
    let json = serde_json::to_string_pretty(&schema)
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    println!("{}", json);
    Ok(())
}
