use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vacars::auth::CredentialStore;
use vacars::commands::{handle_chat, handle_login, handle_logout, handle_replay, handle_run};
use vacars::config::{AppConfig, config_path};
use vacars::log_format::CompactFlightLogFormat;

#[derive(Parser)]
#[command(name = "vacars", version, about = "ACARS companion for virtual airline pilots")]
struct Cli {
    /// Config file path (default: VACARS_CONFIG or ./vacars.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the simulator bridge and crew API and track the flight
    Run {
        /// Assigned flight id to report against
        #[arg(long)]
        flight: Option<String>,
        /// Track only; never submit the PIREP automatically
        #[arg(long)]
        no_submit: bool,
    },
    /// Replay a recorded telemetry file through the pipeline
    Replay {
        /// File with one JSON bridge frame per line
        file: PathBuf,
        /// Seconds between frames (0 = as fast as possible)
        #[arg(long, default_value_t = 0.0)]
        interval: f64,
    },
    /// Verify an API key and store it locally
    Login {
        /// Crew-center API key
        api_key: String,
    },
    /// Remove the stored API key
    Logout,
    /// Send a message to the crew chat
    Chat {
        /// Message text
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .event_format(CompactFlightLogFormat)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config.unwrap_or_else(config_path))?;
    let store = CredentialStore::default_location();

    match cli.command {
        Command::Run { flight, no_submit } => handle_run(&config, &store, flight, no_submit).await,
        Command::Replay { file, interval } => handle_replay(&config, &file, interval).await,
        Command::Login { api_key } => handle_login(&config, &store, &api_key).await,
        Command::Logout => handle_logout(&store),
        Command::Chat { message } => handle_chat(&config, &store, &message).await,
    }
}
