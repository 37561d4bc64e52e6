//! Frontail - follow a file in the browser, like `tail -f`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use frontail::config::{ConfigError, ConfigLoader};
use frontail::server::{cancel_on_signal, Gateway, StartupError};
use frontail::tail::TruncationPolicy;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TruncationArg {
    Hold,
    Restart,
}

impl From<TruncationArg> for TruncationPolicy {
    fn from(arg: TruncationArg) -> Self {
        match arg {
            TruncationArg::Hold => TruncationPolicy::Hold,
            TruncationArg::Restart => TruncationPolicy::Restart,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "frontail",
    about = "Stream a file to the browser, like tail -f",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind to.
    #[arg(long)]
    host: Option<String>,

    /// Config file (default: .frontail.toml, then the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What to do when the file shrinks below a client's position.
    #[arg(long, value_enum)]
    truncation: Option<TruncationArg>,

    /// File to follow.
    file: Option<PathBuf>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let loader = cli
        .config
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load()?;

    if let Some(file) = cli.file {
        config.target_path = file;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(truncation) = cli.truncation {
        config.truncation = truncation.into();
    }

    let shutdown = CancellationToken::new();
    let gateway = Gateway::new(config)?.with_shutdown(shutdown.clone());

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown));

    gateway.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            eprintln!("frontail: {e}");
            if matches!(e, StartupError::Config(ConfigError::Invalid(_))) {
                eprintln!("Usage: frontail [-p 8080] /path/filename");
            }
            ExitCode::FAILURE
        }
    }
}
