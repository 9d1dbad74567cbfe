//! `ftcp` — send or receive a single file over the FTCP wire protocol.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "ftcp", version, about = "Send or receive a single file over FTCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a file to a listening receiver.
    Send(commands::send::SendArgs),
    /// Listen for one incoming file transfer.
    Receive(commands::receive::ReceiveArgs),
}

/// Keeps the non-blocking file-sink writer alive for the process lifetime;
/// dropping it would silently stop flushing log lines to disk.
struct LoggingGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

fn init_logging(verbose: bool, log_path: Option<&PathBuf>) -> Result<LoggingGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard(guard))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (verbose, log_path) = match &cli.command {
        Command::Send(args) => (args.verbose, args.log.as_ref()),
        Command::Receive(args) => (args.verbose, args.log.as_ref()),
    };
    let _logging_guard = match init_logging(verbose, log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ftcp: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "transfer failed");
            eprintln!("ftcp: {e:#}");
            ExitCode::FAILURE
        }
    }
}
