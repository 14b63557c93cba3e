//! MQTT session host - Main Entry Point
//!
//! Loads a session configuration, connects to the broker and keeps the
//! session alive until Ctrl-C.

use clap::{Parser, Subcommand};
use iot_session::config::SessionConfig;
use iot_session::engine::RumqttEngine;
use iot_session::error::SessionError;
use iot_session::observability::init_default_logging;
use iot_session::session::{MqttSession, SessionState};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// MQTT client session host
#[derive(Parser)]
#[command(name = "iot-session")]
#[command(about = "Managed MQTT client session with bounded connect retry")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "IOT_SESSION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and hold the session until Ctrl-C
    Connect,
    /// Validate configuration
    Config {
        /// Print the loaded configuration as JSON
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["session.toml", "config/session.toml"];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting iot-session v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Connect => run_session(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(config_path: Option<&Path>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(SessionConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(SessionConfig::load_from_file(path)?);
        }
    }

    Err("no configuration file found; pass one with -c/--config or create session.toml".into())
}

async fn run_session(config: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RumqttEngine::new();
    let mut session = MqttSession::create(config.session_params(), &engine)
        .await?
        .with_retry_policy(config.retry_policy())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down gracefully..."),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let report = session.connect_cancellable(shutdown_rx.clone()).await;
    match report {
        Ok(report) => {
            info!(attempts = report.attempts, "Session connected, waiting for Ctrl-C");
            watch_session(&session, shutdown_rx).await;
        }
        Err(SessionError::ConnectCancelled { attempts }) => {
            warn!(attempts, "Connect cancelled before the session came up");
        }
        Err(e) => return Err(e.into()),
    }

    let metrics = session.metrics();
    session.destroy();
    info!(
        session_id = %session.session_id(),
        metrics = %serde_json::to_string(&metrics)?,
        "Session destroyed"
    );
    Ok(())
}

/// Log state changes until shutdown is requested
async fn watch_session(session: &MqttSession, mut shutdown_rx: watch::Receiver<bool>) {
    let mut state_rx = session.state_receiver();
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                match state {
                    SessionState::Disconnected(reason) => warn!("Session disconnected: {}", reason),
                    SessionState::Connected => info!("Session connected"),
                    other => info!("Session state: {:?}", other),
                }
            }
        }
    }
}

fn handle_config_command(config: &SessionConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", serde_json::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
