//! analysis-tracker CLI - submit media and follow analysis progress.

use analysis_tracker::{
    AnalysisClient, AnalysisType, ClientConfig, ProgressView, ProgressWatcher, ReconnectPolicy,
    WatchOutcome, WebSocketConnector,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "analysis-tracker")]
#[command(about = "Submit media for authenticity analysis and follow its progress", long_about = None)]
struct Cli {
    /// JSON config file, overridden by ANALYSIS_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and print the session id
    Submit {
        file: PathBuf,
        /// voice, video, document, liveness, scam or full
        #[arg(long = "type", default_value = "full")]
        analysis_type: AnalysisType,
        /// Follow progress after uploading
        #[arg(long)]
        watch: bool,
    },
    /// Follow an existing analysis session
    Watch {
        session_id: String,
        /// Reopen the channel with backoff after a connection loss
        #[arg(long)]
        reconnect: bool,
        /// Give up after this many seconds without a message
        #[arg(long)]
        idle_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command ended successfully
async fn run(cli: Cli) -> Result<bool> {
    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Submit {
            file,
            analysis_type,
            watch,
        } => {
            let client = AnalysisClient::from_config(&config)?;
            let submitted = client
                .submit_file(&file, analysis_type)
                .await
                .with_context(|| format!("Upload of {} failed", file.display()))?;
            println!("{}", submitted.session_id);

            if !watch {
                return Ok(true);
            }
            let idle_timeout = config.idle_timeout();
            watch_session(&config, &submitted.session_id, false, idle_timeout).await
        }
        Commands::Watch {
            session_id,
            reconnect,
            idle_timeout,
        } => {
            let idle_timeout = match idle_timeout {
                Some(secs) => Some(Duration::from_secs(secs)),
                None => config.idle_timeout(),
            };
            watch_session(&config, &session_id, reconnect, idle_timeout).await
        }
    }
}

async fn watch_session(
    config: &ClientConfig,
    session_id: &str,
    reconnect: bool,
    idle_timeout: Option<Duration>,
) -> Result<bool> {
    let connector = WebSocketConnector::from_config(config)?;
    let policy = reconnect.then(|| ReconnectPolicy::from_config(&config.reconnect));
    let watcher = ProgressWatcher::new(Box::new(connector))
        .with_reconnect(policy)
        .with_idle_timeout(idle_timeout);

    let stop = watcher.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, closing progress channel");
            stop.stop();
        }
    });

    let mut views = watcher.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_line = String::new();
        while views.changed().await.is_ok() {
            let line = views
                .borrow_and_update()
                .as_ref()
                .map(ProgressView::summary_line);
            if let Some(line) = line.filter(|line| *line != last_line) {
                println!("{}", line);
                last_line = line;
            }
        }
    });

    let report = watcher.watch(session_id).await;
    drop(watcher);
    let _ = printer.await;

    match report.outcome {
        WatchOutcome::Completed => Ok(true),
        WatchOutcome::Stopped => Ok(false),
        WatchOutcome::Failed | WatchOutcome::Disconnected => {
            if let Some(reason) = report.last_error {
                tracing::error!("Session {}: {}", session_id, reason);
            }
            Ok(false)
        }
    }
}
