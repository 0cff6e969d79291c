use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kiroku_api::traits::Provider;
use kiroku_core::config::AppConfig;
use kiroku_core::crossref::refresh::RefreshOutcome;
use kiroku_core::models::SyncOutcome;
use kiroku_runtime::{logging, parse_events, Admission, Runtime, RuntimeError};

#[derive(Parser)]
#[command(name = "kiroku")]
#[command(about = "Sync local anime playback to tracker accounts")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging for kiroku targets
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue playback events from a JSON-lines file and drain them
    Sync {
        #[arg(long)]
        events: PathBuf,
    },
    /// Download the cross-reference snapshot if it changed
    RefreshMapping,
    /// Resolve a series on one tracker
    Resolve {
        #[arg(long)]
        tracker: Provider,
        #[arg(long)]
        anidb: Option<u64>,
        #[arg(long)]
        title: String,
    },
    /// Search a tracker's catalog
    Search {
        #[arg(long)]
        tracker: Provider,
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init(&config.general, cli.verbose);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), RuntimeError> {
    let runtime = Arc::new(Runtime::new(config)?);

    match command {
        Commands::Sync { events } => {
            let content = tokio::fs::read_to_string(&events)
                .await
                .map_err(kiroku_core::error::KirokuError::from)?;
            let events = parse_events(&content)?;

            let mut skipped = 0;
            for event in events {
                if runtime.on_playback(event) == Admission::Skipped {
                    skipped += 1;
                }
            }

            let ctrl_c = {
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        runtime.shutdown();
                    }
                })
            };

            let report = runtime.drain().await.unwrap_or_default();
            ctrl_c.abort();

            for outcome in &report.outcomes {
                println!("{}", describe(outcome));
            }
            println!(
                "processed {} request(s), skipped {skipped}, {} left in queue",
                report.processed,
                runtime.pending()
            );
        }
        Commands::RefreshMapping => match runtime.refresh_mapping().await? {
            RefreshOutcome::Updated { bytes, records } => {
                println!("snapshot updated: {records} records ({bytes} bytes)")
            }
            RefreshOutcome::Unchanged { bytes } => println!("snapshot unchanged ({bytes} bytes)"),
        },
        Commands::Resolve {
            tracker,
            anidb,
            title,
        } => {
            let identity = runtime.resolve(tracker, anidb, &title).await?;
            println!(
                "{} {} \"{}\"",
                identity.provider, identity.remote_id, identity.titles.primary
            );
        }
        Commands::Search { tracker, text } => {
            for media in runtime.search(tracker, &text).await {
                let episodes = media
                    .episodes
                    .map_or_else(|| "?".to_string(), |n| n.to_string());
                println!("{:>8}  {}  ({episodes} eps)", media.id, media.titles.primary);
            }
        }
    }
    Ok(())
}

fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Updated {
            provider,
            remote_id,
            state,
        } => format!(
            "{provider}: {remote_id} -> {} ({} eps)",
            state.status, state.progress
        ),
        SyncOutcome::NoChange {
            provider,
            remote_id,
        } => format!("{provider}: {remote_id} already current"),
        SyncOutcome::Unresolved { provider, reason } => format!("{provider}: unresolved, {reason}"),
        SyncOutcome::Failed { provider, reason } => format!("{provider}: failed, {reason}"),
    }
}
