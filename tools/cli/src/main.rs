//! Coffer CLI - drive storage instances from the command line.
//!
//! Loads a storage configuration, attaches logging hooks to every
//! configured instance and runs a sequence of operations against one of
//! them before tearing everything down.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use coffer_common::Error;
use coffer_storage::{
    create_default_registry, hook, Operation, Storage, StorageConfig, DEFAULT_INSTANCE,
};

/// Instance configured when no config file is given.
const FALLBACK_INSTANCE: &str = "default";

#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Coffer - Pluggable storage instances")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file with "instances" and "settings".
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available provider selectors.
    Providers,

    /// List configured instances.
    Instances,

    /// Run operations against an instance.
    Run {
        /// Instance name (default: the "default instance" setting).
        #[arg(short, long)]
        instance: Option<String>,

        /// Steps such as "upload:a.txt:b.txt", "exists:b.txt", "remove:b.txt".
        #[arg(required = true)]
        steps: Vec<String>,
    },
}

/// One operation requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Upload { file: String, filename: String },
    Remove { filename: String },
    Exists { filename: String },
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let operation = Operation::from_str(parts[0])?;

        match (operation, &parts[1..]) {
            (Operation::Upload, [file, filename]) => Ok(Step::Upload {
                file: file.to_string(),
                filename: filename.to_string(),
            }),
            (Operation::Remove, [filename]) => Ok(Step::Remove {
                filename: filename.to_string(),
            }),
            (Operation::Exists, [filename]) => Ok(Step::Exists {
                filename: filename.to_string(),
            }),
            _ => Err(Error::InvalidConfiguration(format!(
                "Malformed step '{}'",
                s
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;
    let storage = Storage::with_config(create_default_registry(), config);

    match cli.command {
        Commands::Providers => {
            for name in storage.providers().providers() {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::Instances => {
            for name in storage.instances() {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::Run { instance, steps } => {
            let steps = steps
                .iter()
                .map(|s| s.parse::<Step>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid step")?;
            cmd_run(&storage, instance.as_deref(), &steps).await
        }
    }
}

/// Load configuration from `path`, or a single in-memory instance.
fn load_config(path: Option<&Path>) -> Result<StorageConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            StorageConfig::from_json(&json)
                .with_context(|| format!("Invalid configuration in {}", path.display()))
        }
        None => Ok(StorageConfig::new()
            .with_instance(FALLBACK_INSTANCE, serde_json::json!({ "provider": "memory" }))
            .with_setting(DEFAULT_INSTANCE, FALLBACK_INSTANCE)),
    }
}

/// Log every operation on every configured instance.
fn install_logging_hooks(storage: &Storage) -> Result<()> {
    for operation in [Operation::Upload, Operation::Remove, Operation::Exists] {
        storage
            .pre(
                None,
                operation,
                hook(|ctx| async move {
                    info!(instance = %ctx.instance, filename = %ctx.filename, "{} started", ctx.operation);
                    Ok(())
                }),
            )
            .context("Failed to attach hooks")?;
        storage
            .post(
                None,
                operation,
                hook(|ctx| async move {
                    info!(instance = %ctx.instance, filename = %ctx.filename, "{} finished", ctx.operation);
                    Ok(())
                }),
            )
            .context("Failed to attach hooks")?;
    }
    Ok(())
}

/// Run steps in order, stopping at the first failure, then tear down.
async fn run_steps(storage: &Storage, instance: Option<&str>, steps: &[Step]) -> Result<Vec<String>> {
    let client = storage
        .get(instance)
        .context("Invalid instance")?
        .await
        .context("Failed to initialize instance")?;

    let mut output = Vec::new();
    for step in steps {
        let line = match step {
            Step::Upload { file, filename } => {
                client
                    .upload(file, filename)
                    .await
                    .with_context(|| format!("Upload of {} failed", filename))?;
                format!("uploaded {} as {}", file, filename)
            }
            Step::Remove { filename } => {
                client
                    .remove(filename)
                    .await
                    .with_context(|| format!("Removal of {} failed", filename))?;
                format!("removed {}", filename)
            }
            Step::Exists { filename } => {
                let present = client
                    .exists(filename)
                    .await
                    .with_context(|| format!("Lookup of {} failed", filename))?;
                format!("{} {}", filename, if present { "exists" } else { "is missing" })
            }
        };
        output.push(line);
    }

    Ok(output)
}

/// Name of the instance a run targets, if one can be determined.
fn target_instance(storage: &Storage, instance: Option<&str>) -> Option<String> {
    instance.map(String::from).or_else(|| {
        storage
            .setting(DEFAULT_INSTANCE)
            .and_then(|value| value.as_str().map(String::from))
    })
}

/// Reject uploads without a target name on the instance being driven.
fn install_instance_hooks(storage: &Storage, instance: &str) -> Result<()> {
    storage
        .pre(
            Some(instance),
            Operation::Upload,
            hook(|ctx| async move {
                if ctx.filename.is_empty() {
                    Err(Error::Hook(format!("{} needs a target name", ctx.instance)))
                } else {
                    Ok(())
                }
            }),
        )
        .with_context(|| format!("Failed to attach hooks to {}", instance))?;
    Ok(())
}

/// Combine the outcome of the steps with the outcome of teardown.
///
/// A step failure is reported first; a teardown failure is attached to it.
fn finish_run(
    result: Result<Vec<String>>,
    teardown: coffer_common::Result<()>,
) -> Result<Vec<String>> {
    match (result, teardown) {
        (Ok(lines), Ok(())) => Ok(lines),
        (Err(err), Ok(())) => Err(err),
        (Ok(_), Err(teardown)) => Err(anyhow::Error::new(teardown).context("Teardown failed")),
        (Err(err), Err(teardown)) => Err(err.context(format!("Teardown also failed: {}", teardown))),
    }
}

async fn cmd_run(storage: &Storage, instance: Option<&str>, steps: &[Step]) -> Result<()> {
    install_logging_hooks(storage)?;
    if let Some(name) = target_instance(storage, instance) {
        install_instance_hooks(storage, &name)?;
    }

    let result = run_steps(storage, instance, steps).await;
    let teardown = storage.exit().await;

    for line in finish_run(result, teardown)? {
        println!("{}", line);
    }

    Ok(())
}
