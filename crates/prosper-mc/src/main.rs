//! Command-line driver for the Prosper model-history workspace.
//!
//! Captures engineering models into the history store, fabricates
//! perturbed updates, restores earlier states and reports variable
//! histories. The automation host is the in-process simulated server,
//! which reads models written as `NAME = VALUE` text files.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Initialize structured logging (tracing), plain or JSON
//! 3. Load configuration from `prosper-mc.yaml` (defaults if absent)
//! 4. Bind the workflows to the host and the store
//! 5. Run the subcommand and print its report as JSON

mod error;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use prosper_bridge::SimulatedHost;
use prosper_core::{HistoryConfig, Workflows};
use prosper_types::{EntityName, SnapshotLabel};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "prosper-mc.yaml";

#[derive(Debug, Parser)]
#[command(name = "prosper-mc", version, about = "Model history for nodal-analysis models")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture the configured model, write perturbed updates, report and restore
    Exercise,

    /// Record the current state of every model in the models directory
    InitHistory,

    /// Capture one model into an entity under a fresh label
    Snapshot {
        /// Entity table to write (default: workflow.entity)
        #[arg(long)]
        entity: Option<String>,

        /// Model file to capture (default: workflow.model_path)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Print index-aligned variable histories as JSON
    Series {
        /// Entity table to read (default: workflow.entity)
        #[arg(long)]
        entity: Option<String>,

        /// Repeatable variable keys (default: every key)
        #[arg(long = "key")]
        keys: Vec<String>,
    },

    /// Write a stored snapshot back into a model
    Restore {
        /// Entity table to read (default: workflow.entity)
        #[arg(long)]
        entity: Option<String>,

        /// Snapshot label to restore
        #[arg(long)]
        label: String,

        /// Model file to restore into and save (default: workflow.model_path)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Run a long-running host command, waiting per the `wait` settings
    Run {
        /// Host command, e.g. `PROSPER.ANL.SYS.CALC`
        #[arg(long)]
        command: String,

        /// Model file to open first (default: workflow.model_path)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Save the model after the command finishes
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// List an entity's snapshot labels, oldest first
    Labels {
        /// Entity table to read (default: workflow.entity)
        #[arg(long)]
        entity: Option<String>,
    },

    /// List every entity with a history table
    Entities,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration loading or the subcommand fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse the command line.
    let cli = Cli::parse();

    // 2. Initialize structured logging.
    init_logging(cli.json);

    // 3. Load configuration.
    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(
        store = %config.store.path.display(),
        variables = %config.capture.variables_file.display(),
        "Configuration loaded"
    );

    // 4-5. Bind workflows and run.
    run(cli.cmd, &config).await.context("prosper-mc failed")
}

fn init_logging(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `path`, falling back to defaults if the file
/// does not exist.
fn load_config(path: &Path) -> Result<HistoryConfig, CliError> {
    if path.exists() {
        Ok(HistoryConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = HistoryConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

async fn run(cmd: Command, config: &HistoryConfig) -> Result<(), CliError> {
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(config, &host)?;
    let entity_or_default = |entity: Option<String>| -> Result<EntityName, CliError> {
        match entity {
            Some(name) => Ok(EntityName::parse(&name)?),
            None => Ok(config.workflow.entity()?),
        }
    };

    match cmd {
        Command::Exercise => print_json(&workflows.exercise().await?),
        Command::InitHistory => print_json(&workflows.initialize_history().await?),
        Command::Snapshot { entity, model } => {
            let entity = entity_or_default(entity)?;
            let model = model.unwrap_or_else(|| config.workflow.model_path.clone());
            print_json(&workflows.snapshot(&entity, Some(&model)).await?)
        }
        Command::Series { entity, keys } => {
            let entity = entity_or_default(entity)?;
            let report = workflows.series_report(&entity, &keys).await?;
            println!("{}", report.to_json()?);
            Ok(())
        }
        Command::Restore {
            entity,
            label,
            model,
        } => {
            let entity = entity_or_default(entity)?;
            let label = SnapshotLabel::parse(&label)?;
            let model = model.unwrap_or_else(|| config.workflow.model_path.clone());
            print_json(&workflows.restore(&entity, &label, Some(&model)).await?)
        }
        Command::Run {
            command,
            model,
            save,
        } => {
            let model = model.unwrap_or_else(|| config.workflow.model_path.clone());
            print_json(&workflows.run_command(&command, Some(&model), save).await?)
        }
        Command::Labels { entity } => {
            let entity = entity_or_default(entity)?;
            print_json(&workflows.store().list_snapshots(&entity).await?)
        }
        Command::Entities => print_json(&workflows.store().list_entities().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
