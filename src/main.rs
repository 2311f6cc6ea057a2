use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use conveyor::artifact::feature_name_from_spec;
use conveyor::config::Config;
use conveyor::handlers::HandlerRegistry;
use conveyor::orchestrator::PipelineOrchestrator;
use conveyor::stage::reference_pipeline;
use conveyor::ui::OrchestratorUI;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(version, about = "Sequential pipeline orchestrator for feature development")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Iteration cap for the delegated implementation loop
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline against a feature specification
    Run {
        /// Path to the feature specification (e.g. docs/todo/FEAT47_specification.md)
        spec_path: PathBuf,

        /// Emit the summary as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the pipeline's stages in execution order
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { spec_path, json } => {
            run_pipeline(&cli, project_dir, spec_path, *json).await?;
        }
        Commands::Stages => cmd_stages(),
    }

    Ok(())
}

async fn run_pipeline(cli: &Cli, project_dir: PathBuf, spec_path: &PathBuf, json: bool) -> Result<()> {
    let config = Config::new(project_dir, cli.verbose, cli.max_iterations)?;
    config.ensure_directories()?;

    let feature = feature_name_from_spec(spec_path);
    let stages = reference_pipeline();
    let registry = HandlerRegistry::production(&config, &feature);

    let ui = if json {
        None
    } else {
        Some(Arc::new(OrchestratorUI::new(
            stages.len() as u64,
            config.verbose,
        )))
    };

    let mut orchestrator =
        PipelineOrchestrator::new(stages, registry, &config.artifact_dir);
    if let Some(ui) = &ui {
        orchestrator = orchestrator.with_ui(ui.clone());
    }

    let outcome = orchestrator.run(spec_path).await;
    if let Some(ui) = &ui {
        ui.finish();
    }

    // A halted run still has a summary; only wiring defects lack one.
    let summary = match (&outcome, orchestrator.summary()) {
        (_, Some(summary)) => summary,
        (Err(err), None) => anyhow::bail!("pipeline failed before producing a run: {err}"),
        (Ok(_), None) => unreachable!("successful run always has a summary"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary.render());
    }

    if let Err(err) = outcome {
        anyhow::bail!("pipeline aborted: {err}");
    }
    if summary.overall != "COMPLETED" {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_stages() {
    println!("{}", style("Pipeline stages, in execution order:").bold());
    for stage in reference_pipeline() {
        let outputs = if stage.outputs.is_empty() {
            "findings only".to_string()
        } else {
            stage
                .outputs
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  {}. {:<24} {:<14} produces: {}",
            style(stage.ordinal).yellow(),
            stage.name,
            format!("[{:?}]", stage.handler),
            outputs
        );
    }
}
