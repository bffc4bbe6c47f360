mod cmd;
mod collector;
mod config;
mod enumerator;
mod error;
mod lock;
mod paths;
mod record;
mod scheduler;
mod stats;
mod status;
#[cfg(test)]
mod testing;

use std::fmt;
use std::process::ExitCode;

use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::fmt::time::FormatTime;

/// UTC wall clock, RFC 3339 with milliseconds.
struct UtcTime;

impl FormatTime for UtcTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        write!(w, "{}", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

#[derive(Parser)]
#[command(name = "collector", version, about = "Pod usage collector")]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'D', global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collector daemon until SIGTERM/SIGINT
    Start(Box<cmd::StartArgs>),
    /// List pod sandboxes once using the collector's filters
    Pods(cmd::PodsArgs),
    /// Report recorded pod usage
    Usage(cmd::UsageArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_timer(UtcTime)
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Start(args) => cmd::run_start(*args).await,
        Command::Pods(args) => cmd::run_pods(args).await,
        Command::Usage(args) => cmd::run_usage(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
