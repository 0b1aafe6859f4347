use std::process::ExitCode;
use std::sync::Arc;

use analyst::agents::{Orchestrator, SessionError};
use analyst::models::{AnalystConfig, FinalReport};
use analyst::tools::{export_report, ToolRegistry};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "analyst", about = "Multi-expert analysis with self-verifying claims")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/analyst.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the panel a question
    Run {
        question: String,

        /// Comma-separated expert names, replacing the configured defaults
        #[arg(long, value_delimiter = ',')]
        experts: Option<Vec<String>>,

        #[arg(long)]
        max_rounds: Option<u32>,

        /// Format the report with an exporter (markdown, json, ...)
        #[arg(long)]
        export: Option<String>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Continue an exhausted session from the store
    Resume {
        session_id: String,

        /// Extra rounds to allow
        #[arg(long, default_value_t = 1)]
        rounds: u32,

        #[arg(long)]
        export: Option<String>,

        #[arg(long)]
        pretty: bool,
    },
    /// List stored sessions
    Sessions,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the report. Respects RUST_LOG.
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = analyst::load_config(&cli.config)?;

    match cli.command {
        Command::Run {
            question,
            experts,
            max_rounds,
            export,
            pretty,
        } => {
            let (orchestrator, tools) = build(&config, pretty)?;
            let report = analyst::run_session(&orchestrator, &question, experts, max_rounds).await;
            finish(report, &tools, export.as_deref(), pretty).await
        }
        Command::Resume {
            session_id,
            rounds,
            export,
            pretty,
        } => {
            let session_id = Uuid::parse_str(&session_id)
                .with_context(|| format!("Invalid session id: {session_id}"))?;
            let store = analyst::open_store(&config)?
                .context("Resuming needs [store] sqlite_path in the config")?;
            let snapshot = store
                .lock()
                .map_err(|_| anyhow!("Session store lock poisoned"))?
                .load(session_id)?;
            let Some(snapshot) = snapshot else {
                bail!("No stored session {session_id}");
            };

            let (orchestrator, tools) = build(&config, pretty)?;
            let report = orchestrator
                .resume(snapshot, rounds)
                .await
                .map(|outcome| outcome.report);
            finish(report, &tools, export.as_deref(), pretty).await
        }
        Command::Sessions => {
            let store = analyst::open_store(&config)?
                .context("Listing sessions needs [store] sqlite_path in the config")?;
            let sessions = store
                .lock()
                .map_err(|_| anyhow!("Session store lock poisoned"))?
                .list()?;
            for s in sessions {
                println!(
                    "{}\t{}\t{}/{}\t{}\t{}",
                    s.session_id,
                    s.status,
                    s.round,
                    s.max_rounds,
                    s.saved_at.format("%Y-%m-%d %H:%M:%S"),
                    s.question
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Orchestrator wired to config, cancelled on Ctrl-C.
fn build(
    config: &AnalystConfig,
    pretty: bool,
) -> Result<(Orchestrator, Arc<ToolRegistry>)> {
    let tools = analyst::build_tools(config, pretty)?;
    let store = analyst::open_store(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current round as cancelled");
            on_signal.cancel();
        }
    });

    let orchestrator = analyst::build_orchestrator(config, tools.clone(), store)
        .context("Failed to build orchestrator")?
        .with_cancellation(cancel);
    Ok((orchestrator, tools))
}

async fn finish(
    report: Result<FinalReport, SessionError>,
    tools: &ToolRegistry,
    export: Option<&str>,
    pretty: bool,
) -> Result<ExitCode> {
    match report {
        Ok(report) => {
            info!(
                session_id = %report.session_id,
                status = %report.status,
                rounds = report.rounds,
                "Session finished"
            );
            println!("{}", render(&report, tools, export, pretty).await?);
            Ok(ExitCode::SUCCESS)
        }
        Err(SessionError::Failed(failed)) => {
            // The partial ledger still goes to stdout.
            let output = if pretty {
                serde_json::to_string_pretty(&failed)?
            } else {
                serde_json::to_string(&failed)?
            };
            println!("{output}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(anyhow!("Session failed: {e}")),
    }
}

async fn render(
    report: &FinalReport,
    tools: &ToolRegistry,
    export: Option<&str>,
    pretty: bool,
) -> Result<String> {
    match export {
        Some(target) => export_report(tools, target, report)
            .await
            .with_context(|| format!("Failed to export report as {target}")),
        None if pretty => Ok(serde_json::to_string_pretty(report)?),
        None => Ok(serde_json::to_string(report)?),
    }
}
