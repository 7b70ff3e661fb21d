// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use forest_pipeline::utils::logging::{format_info, format_warning};
use forest_pipeline::{
    Config, ConsoleObserver, EventFormat, InvocationMode, PipelineDefinition, PipelineRunner,
    RunPhase, RunSummary, UnitRegistry, Validator, event_channel,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "forest-pipeline")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Runs forestry imagery processing pipelines step by step", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    /// Overrides runner.project_root from the configuration
    #[arg(long, value_name = "DIR", env = "FOREST_PIPELINE_ROOT")]
    project_root: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline definition
    Run {
        /// Pipeline document with a `pipeline_steps` array
        #[arg(short, long, value_name = "FILE")]
        pipeline: PathBuf,

        /// Zero-based index of the first step to run
        #[arg(long, default_value_t = 0)]
        start_index: usize,

        /// Replaces every `.tif` input parameter with this image
        #[arg(short, long, value_name = "TIF")]
        input: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Check a pipeline definition without running it
    Validate {
        #[arg(short, long, value_name = "FILE")]
        pipeline: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

impl From<OutputFormat> for EventFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Pretty => EventFormat::Pretty,
            OutputFormat::Json => EventFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    forest_pipeline::utils::logging::init_logger(cli.color, cli.verbose);
    if !cli.color {
        colored::control::set_override(false);
    }

    info!("Loading configuration from: {}", cli.config.display());

    let mut config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::default_config()
    };

    if let Some(root) = cli.project_root {
        config.runner.project_root = root;
    }
    Validator::validate_directory(&config.runner.project_root)
        .context("Invalid project root")?;

    match cli.command {
        Commands::Run {
            pipeline,
            start_index,
            input,
            format,
        } => {
            cmd_run(config, pipeline, start_index, input, format.into(), cli.color).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&config, pipeline)?;
        }
    }

    Ok(())
}

async fn cmd_run(
    config: Config,
    pipeline: PathBuf,
    start_index: usize,
    input: Option<PathBuf>,
    format: EventFormat,
    color: bool,
) -> Result<()> {
    let mut definition =
        PipelineDefinition::load(&pipeline).context("Failed to load pipeline definition")?;

    if let Some(image) = input {
        Validator::validate_file_path(&image).context("Invalid input image")?;
        definition = definition.with_input_image(&image);
    }

    let total = definition.len();
    let registry = UnitRegistry::from_config(&config.detection);
    let runner = PipelineRunner::new(config, registry);

    let (events, receiver) = event_channel();
    let handle = runner
        .start(definition, start_index, events)
        .context("Failed to start pipeline")?;

    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                format_warning("Stop requested; finishing the current step first")
            );
            cancel.cancel();
        }
    });

    let observer = ConsoleObserver::new(total, start_index.min(total), color, format)
        .consume(receiver)
        .await;
    let summary = handle.join().await.context("Pipeline worker failed")?;

    log_final_stats(&summary, observer.detections());

    match summary.phase() {
        RunPhase::Completed => Ok(()),
        RunPhase::Cancelled => Err(anyhow::anyhow!("Pipeline cancelled by operator")),
        _ => {
            let reason = observer
                .last_failure()
                .map(|m| Validator::truncate_text(m, 400))
                .or(summary.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            error!("Pipeline failed: {}", reason);
            Err(anyhow::anyhow!("Pipeline failed: {}", reason))
        }
    }
}

fn cmd_validate(config: &Config, pipeline: PathBuf) -> Result<()> {
    let definition =
        PipelineDefinition::load(&pipeline).context("Failed to load pipeline definition")?;
    let registry = UnitRegistry::from_config(&config.detection);
    let steps = registry
        .resolve(&definition)
        .context("Pipeline definition is invalid")?;

    if steps.is_empty() {
        return Err(anyhow::anyhow!("Pipeline contains no steps"));
    }

    for step in &steps {
        let mode = match step.spec.mode {
            InvocationMode::External => "external",
            InvocationMode::InProcess(_) => "in-process",
        };
        let kind = if step.is_detection() { ", detection" } else { "" };
        println!(
            "{}",
            format_info(&format!(
                "{}. {} [{}{}] {}",
                step.descriptor.index,
                step.descriptor.name,
                mode,
                kind,
                step.descriptor.unit
            ))
        );
    }

    let missing = Validator::missing_units(&definition, &registry, &config.runner.project_root);
    for (index, path) in &missing {
        warn!("Step {} unit not found: {}", index, path.display());
    }

    if missing.is_empty() {
        info!("Pipeline definition is valid ({} steps)", steps.len());
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} unit(s) not found", missing.len()))
    }
}

fn log_final_stats(summary: &RunSummary, detections_seen: usize) {
    let stats = &summary.stats;
    info!("=== Pipeline Run Summary ===");
    info!("Run: {} (started {})", summary.run_id, summary.started_at.to_rfc3339());
    info!("Outcome: {:?}", summary.phase());
    info!("Duration: {:.2} seconds", stats.duration_secs());
    info!("Steps completed: {}", stats.steps_completed);
    info!("Steps failed: {}", stats.steps_failed);
    info!("Steps skipped: {}", stats.steps_skipped);
    info!("Steps not run: {}", stats.steps_not_run());
    info!("Success rate: {:.2}%", stats.success_rate());
    info!(
        "Detection pairs: {} (observed {})",
        stats.detections_found, detections_seen
    );
    info!("============================");
}
