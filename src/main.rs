// src/main.rs
// pr-council - review a pull request with several models at once

use anyhow::{Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use pr_council::config::{CouncilConfig, CredentialEnv, load_dotenv};
use pr_council::diff::CommitPatch;
use pr_council::llm::BackendRegistry;
use pr_council::pipeline::ChunkSummary;
use pr_council::{CouncilError, ReviewOutcome, ReviewPipeline, ReviewSettings};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pr-council")]
#[command(about = "Review pull request diffs with several LLM backends in parallel")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.pr-council/config.toml)
    #[arg(long, global = true, env = "PR_COUNCIL_CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a unified diff
    Review {
        /// Diff file, or - for stdin
        #[arg(long)]
        diff: String,

        /// Keep generated files
        #[arg(long)]
        no_filter: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Review the commit history of one file
    History {
        /// JSON array of commits touching the file
        #[arg(long)]
        commits: PathBuf,

        /// File the commits are about
        #[arg(long)]
        path: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show how a diff would be chunked, without calling any model
    Chunks {
        /// Diff file, or - for stdin
        #[arg(long)]
        diff: String,

        /// Keep generated files
        #[arg(long)]
        no_filter: bool,
    },

    /// Validate the configuration
    CheckConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Backend id to run (repeatable; overrides review.selected_backends)
    #[arg(long = "backend")]
    backends: Vec<String>,

    /// Backend id for the synthesis pass
    #[arg(long)]
    synthesize: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(source)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<CouncilConfig> {
    let mut config = CouncilConfig::load(path)?;
    config.apply_env(&CredentialEnv::from_env());

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        bail!("invalid configuration\n{}", validation.report());
    }
    Ok(config)
}

fn review_settings(config: &CouncilConfig, run: &RunArgs, no_filter: bool) -> ReviewSettings {
    let mut settings = ReviewSettings::from_config(config);
    if !run.backends.is_empty() {
        settings.backends = run.backends.clone();
    }
    if run.synthesize.is_some() {
        settings.synthesis_backend = run.synthesize.clone();
    }
    if no_filter {
        settings.filter = None;
    }
    settings
}

/// Cancellation token fired by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial results");
            trigger.cancel();
        }
    });
    token
}

fn write_report(outcome: &ReviewOutcome, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }

    let failures = outcome.failures();
    let total: usize = outcome.reports.iter().map(|r| r.outputs.len()).sum();
    eprintln!(
        "{} of {} sections succeeded across {} backend(s)",
        total - failures.len(),
        total,
        outcome.reports.len()
    );
    for failure in &failures {
        eprintln!(
            "  failed: {} part {} ({}: {})",
            failure.backend_id,
            failure.chunk_index + 1,
            failure.kind,
            failure.message
        );
    }
    if let Some(synthesis) = &outcome.synthesis {
        if let Some(failure) = synthesis.result.as_failure() {
            eprintln!("  synthesis by {} failed ({})", synthesis.backend_id, failure);
        }
    }
    Ok(())
}

fn explain_empty(err: &CouncilError) {
    if let CouncilError::EmptyInput { excluded } = err {
        if !excluded.is_empty() {
            eprintln!(
                "All changed files look generated ({}). Re-run with --no-filter to review them anyway.",
                excluded.join(", ")
            );
        }
    }
}

async fn run_review(config: &CouncilConfig, diff: &str, no_filter: bool, run: RunArgs) -> Result<()> {
    let diff_text = read_input(diff)?;
    let registry = Arc::new(BackendRegistry::from_config(config)?);
    let pipeline = ReviewPipeline::new(registry, review_settings(config, &run, no_filter));
    let cancel = ctrl_c_token();

    let outcome = match pipeline.review_diff(&diff_text, cancel.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            explain_empty(&e);
            return Err(e.into());
        }
    };
    write_report(&outcome, run.output.as_deref())?;

    if cancel.is_cancelled() {
        return Err(CouncilError::Cancelled.into());
    }
    Ok(())
}

async fn run_history(config: &CouncilConfig, commits: &Path, path: &str, run: RunArgs) -> Result<()> {
    let commits: Vec<CommitPatch> = serde_json::from_str(&std::fs::read_to_string(commits)?)?;
    let registry = Arc::new(BackendRegistry::from_config(config)?);
    let pipeline = ReviewPipeline::new(registry, review_settings(config, &run, true));
    let cancel = ctrl_c_token();

    let outcome = pipeline.review_history(path, &commits, cancel.clone()).await?;
    write_report(&outcome, run.output.as_deref())?;

    if cancel.is_cancelled() {
        return Err(CouncilError::Cancelled.into());
    }
    Ok(())
}

fn run_chunks(config: &CouncilConfig, diff: &str, no_filter: bool) -> Result<()> {
    let diff_text = read_input(diff)?;
    let mut settings = ReviewSettings::from_config(config);
    if no_filter {
        settings.filter = None;
    }
    let pipeline = ReviewPipeline::new(Arc::new(BackendRegistry::new()), settings);

    let plan = match pipeline.plan_diff(&diff_text) {
        Ok(plan) => plan,
        Err(e) => {
            explain_empty(&e);
            return Err(e.into());
        }
    };
    let chunks: Vec<ChunkSummary> = plan.chunks.iter().map(ChunkSummary::from).collect();
    let json = serde_json::json!({
        "chunks": chunks,
        "excluded": plan.excluded,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    let mut config = CouncilConfig::load(path)?;
    config.apply_env(&CredentialEnv::from_env());

    let validation = config.validate();
    println!("{}", validation.report());
    if !validation.is_valid() {
        bail!("configuration has {} error(s)", validation.errors.len());
    }

    let registry = BackendRegistry::from_config(&config)?;
    println!("Backends: {}", registry.ids().join(", "));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_files = load_dotenv();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for path in &env_files {
        debug!(path = %path.display(), "Loaded .env");
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Review {
            diff,
            no_filter,
            run,
        } => {
            let config = load_config(config_path)?;
            run_review(&config, &diff, no_filter, run).await?;
        }
        Commands::History { commits, path, run } => {
            let config = load_config(config_path)?;
            run_history(&config, &commits, &path, run).await?;
        }
        Commands::Chunks { diff, no_filter } => {
            let config = CouncilConfig::load(config_path)?;
            run_chunks(&config, &diff, no_filter)?;
        }
        Commands::CheckConfig => {
            run_check_config(config_path)?;
        }
    }

    Ok(())
}
