//! Scriptorium CLI entry point.
//!
//! This binary is the composition root for the workspace:
//!
//! 1. **Load configuration** from `scriptorium.toml` (defaults when absent)
//!    and apply command-line overrides.
//! 2. **Wire observability**: `tracing-subscriber` with an env filter, human
//!    or JSON output, and an optional OTLP span exporter.
//! 3. **Construct infrastructure**: the Ollama provider, the LLM gateway and
//!    the in-memory stores, injected into the [`nodes::Orchestrator`].
//! 4. **Run and export**: drive the book to a terminal outcome, cancel on
//!    Ctrl-C, and write the manuscript to the output directory.

mod config;
mod export;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use llm::OllamaProvider;
use nodes::{ChannelEventSink, FanoutEventSink, LlmGateway, Orchestrator, TracingEventSink};
use pipeline::{
    ChapterStatus, EventSink, InMemoryProjectStore, InMemorySummaryStore, PipelineEvent,
    ProjectBrief, ProjectId, ProjectState, ProjectStore, StoryBible,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{load_story_bible, CliConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "scriptorium", version)]
#[command(about = "Writes a novel chapter by chapter with a local language model")]
struct Cli {
    /// Configuration file. Missing files mean defaults.
    #[arg(long, global = true, default_value = "scriptorium.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a project from planning to the last chapter.
    Run(RunArgs),
    /// Load and validate the configuration, then print it.
    ValidateConfig,
    /// Check that the model server is reachable and has the configured model.
    Check,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    genre: String,
    #[arg(long)]
    premise: String,
    #[arg(long, default_value_t = 10)]
    chapters: u32,
    /// TOML file of `[[facts]]` grounding every agent call.
    #[arg(long)]
    bible: Option<PathBuf>,
    /// Overrides `pipeline.resource.model`.
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = "manuscript")]
    output: PathBuf,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = CliConfig::load(&cli.config)?;
    match cli.command {
        Command::Run(args) => {
            if let Some(format) = args.log_format {
                config.observability.log_format = format;
            }
            if let Some(model) = &args.model {
                config.pipeline.resource.model = model.clone();
            }
            let telemetry = telemetry::init(&config.observability)?;
            let result = run(config, args).await;
            telemetry.shutdown();
            result
        }
        Command::ValidateConfig => {
            config.pipeline.validate()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let telemetry = telemetry::init(&config.observability)?;
            let result = check(&config).await;
            telemetry.shutdown();
            result.map(|()| ExitCode::SUCCESS)
        }
    }
}

async fn check(config: &CliConfig) -> Result<()> {
    let provider = OllamaProvider::new(&config.llm)?;
    let models = provider
        .list_models()
        .await
        .with_context(|| format!("model server at {} is unreachable", config.llm.base_url))?;
    let wanted = &config.pipeline.resource.model;
    if !models.iter().any(|m| m == wanted) {
        bail!(
            "model {wanted} is not available on {} (found: {})",
            config.llm.base_url,
            models.join(", ")
        );
    }
    println!("{} serves {wanted}", config.llm.base_url);
    Ok(())
}

async fn run(config: CliConfig, args: RunArgs) -> Result<ExitCode> {
    config.pipeline.validate()?;
    let bible = match &args.bible {
        Some(path) => load_story_bible(path)?,
        None => StoryBible::default(),
    };

    let provider = Arc::new(OllamaProvider::new(&config.llm)?);
    match provider.list_models().await {
        Ok(models) if !models.contains(&config.pipeline.resource.model) => warn!(
            model = %config.pipeline.resource.model,
            "configured model is not listed by the server"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, base_url = %config.llm.base_url, "model server preflight failed"),
    }
    let gateway = Arc::new(LlmGateway::new(provider, config.pipeline.resource.clone())?);

    let store = Arc::new(InMemoryProjectStore::new());
    let summaries = Arc::new(InMemorySummaryStore::new());
    let (progress, progress_rx) = ChannelEventSink::new();
    let events: Arc<dyn EventSink> = Arc::new(
        FanoutEventSink::new(vec![Arc::new(TracingEventSink)]).with(Arc::new(progress)),
    );
    let orchestrator = Orchestrator::new(
        gateway,
        store.clone(),
        summaries,
        events,
        config.pipeline.clone(),
    );

    let state = ProjectState::new(
        ProjectId::generate(),
        ProjectBrief {
            title: args.title,
            genre: args.genre,
            premise: args.premise,
        },
        args.chapters,
        bible,
        config.pipeline.revision.clone(),
    );
    let id = state.id.clone();
    info!(project = %id, chapters = state.target_chapters, "starting project");

    cancel_on_ctrl_c(orchestrator.cancellation_token());
    let printer = tokio::spawn(print_progress(progress_rx));
    let outcome = orchestrator.run_project(state.clone()).await;
    // The orchestrator holds the last sender; dropping it ends the printer.
    drop(orchestrator);
    if let Err(e) = printer.await {
        warn!(error = %e, "progress printer stopped abnormally");
    }

    let final_state = store.load_project(&id).await?.unwrap_or(state);
    let report = export::export_manuscript(&*store, &final_state, &outcome, &args.output).await?;
    println!(
        "{outcome}; wrote {} chapter(s) to {}",
        report.chapter_files.len(),
        args.output.display()
    );

    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the in-flight call");
            token.cancel();
        }
    });
}

async fn print_progress(mut events: UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::ChapterFinalized {
                chapter,
                status: ChapterStatus::Accepted,
                score,
                ..
            } => match score {
                Some(score) => println!("chapter {chapter} accepted ({score:.1})"),
                None => println!("chapter {chapter} accepted"),
            },
            PipelineEvent::ChapterFinalized {
                chapter,
                failure: Some(failure),
                ..
            } => println!("chapter {chapter} failed: {failure}"),
            PipelineEvent::RevisionTriggered {
                chapter,
                attempt,
                score,
                ..
            } => println!("chapter {chapter} scored {score:.1}; starting attempt {attempt}"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "scriptorium",
            "--config",
            "book.toml",
            "run",
            "--title",
            "The Atlas",
            "--genre",
            "literary fiction",
            "--premise",
            "Maps that change.",
            "--chapters",
            "12",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("book.toml"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.chapters, 12);
        assert_eq!(args.log_format, Some(LogFormat::Json));
        assert_eq!(args.output, PathBuf::from("manuscript"));
    }

    #[test]
    fn test_run_requires_a_brief() {
        assert!(Cli::try_parse_from(["scriptorium", "run", "--title", "x"]).is_err());
    }
}
