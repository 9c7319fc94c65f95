//! Prints the reconciled element tree of a FHIR StructureDefinition

mod config;
mod logging;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ferrum_models::{FhirVersion, StructureDefinition};
use ferrum_treeview::{EventRecorder, ExtensionType, Reconciler, StaticExtensionTypes};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CliConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum View {
    Snapshot,
    Differential,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Version {
    Dstu2,
    Stu3,
    R4,
    R5,
}

impl From<Version> for FhirVersion {
    fn from(version: Version) -> Self {
        match version {
            Version::Dstu2 => FhirVersion::Dstu2,
            Version::Stu3 => FhirVersion::Stu3,
            Version::R4 => FhirVersion::R4,
            Version::R5 => FhirVersion::R5,
        }
    }
}

#[derive(Parser)]
#[command(name = "fhir-treeview")]
#[command(about = "Reconcile a StructureDefinition and print its element tree", long_about = None)]
struct Cli {
    /// StructureDefinition JSON file
    input: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "snapshot")]
    view: View,

    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Treat every warning-level event as fatal
    #[arg(long)]
    strict: bool,

    /// Hide elements the profile removes (max = 0)
    #[arg(long)]
    strip_removed: bool,

    /// Override the FHIR version declared by the input
    #[arg(long, value_enum)]
    fhir_version: Option<Version>,

    /// JSON object mapping extension profile URLs to "simple" or "complex"
    #[arg(long)]
    extension_types: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn load_extension_types(path: Option<&Path>) -> Result<StaticExtensionTypes> {
    let mut resolver = StaticExtensionTypes::new();
    let Some(path) = path else {
        return Ok(resolver);
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read extension types from {}", path.display()))?;
    let types: HashMap<String, ExtensionType> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse extension types in {}", path.display()))?;
    for (url, extension_type) in types {
        resolver.insert(url, extension_type);
    }
    Ok(resolver)
}

fn load_structure_definition(path: &Path) -> Result<StructureDefinition> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    StructureDefinition::from_value(&value)
        .with_context(|| format!("{} is not a StructureDefinition", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.strict {
        config.treeview.events.strict = true;
    }
    if cli.strip_removed {
        config.treeview.strip_removed_elements = true;
    }
    logging::init_logging(&config.logging)?;

    let sd = load_structure_definition(&cli.input)?;
    let resolver = load_extension_types(cli.extension_types.as_deref())?;
    let reconciler = Reconciler::new(&config.treeview, &resolver);
    let mut events = EventRecorder::new(config.treeview.events.clone());

    let profile = match cli.fhir_version {
        Some(version) => reconciler.reconcile_with_version(&sd, version.into(), &mut events),
        None => reconciler.reconcile(&sd, &mut events),
    }
    .with_context(|| format!("Failed to reconcile {}", sd.url))?;

    let rows = match cli.view {
        View::Snapshot => profile.snapshot_rows(&mut events)?,
        View::Differential => profile
            .differential_rows(&mut events)?
            .with_context(|| format!("{} has no differential", sd.url))?,
    };

    match cli.format {
        Format::Text => print!("{}", render::render_rows(&rows)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }

    tracing::info!(rows = rows.len(), events = events.events().len(), "Done");
    Ok(())
}
