//! Small radio telescope control daemon.
//!
//! Loads the configuration directory, opens the rotor, starts the background
//! loops and serves commands and status until a `quit` command arrives.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use srt_daemon::server::{run_command_listener, serve_http, ServerState};
use srt_daemon::status::run_status_publisher;
use srt_daemon::{ConfigDirectory, Daemon, DaemonParts, LoopTiming, StatusBroadcaster};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "srt_daemon")]
#[command(about = "Control daemon for a small radio telescope")]
#[command(version)]
struct Args {
    /// Directory holding config.json, sky_coords.csv and calibration.json
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    /// Settings file name inside the config directory
    #[arg(long, default_value = "config.json")]
    settings_file: String,

    /// Address the command and status listeners bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Override COMMAND_PORT from the settings file
    #[arg(long)]
    command_port: Option<u16>,

    /// Override STATUS_PORT from the settings file
    #[arg(long)]
    status_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ConfigDirectory::with_path(args.config_dir).with_settings_file(args.settings_file);
    info!("Loading configuration from {}", config.root_path().display());

    let parts = DaemonParts::from_config_directory(&config).context("Failed to start daemon")?;
    let command_port = args.command_port.unwrap_or(parts.settings.command_port);
    let status_port = args.status_port.unwrap_or(parts.settings.status_port);

    let timing = LoopTiming::default();
    let daemon = Daemon::start(parts, timing)?;
    let state = daemon.state();
    let commands = daemon.commands();

    let command_listener = TcpListener::bind((args.bind.as_str(), command_port))
        .await
        .with_context(|| format!("Failed to bind command port {command_port}"))?;
    let status_listener = TcpListener::bind((args.bind.as_str(), status_port))
        .await
        .with_context(|| format!("Failed to bind status port {status_port}"))?;

    let status = Arc::new(StatusBroadcaster::default());
    tokio::spawn(run_status_publisher(
        status.clone(),
        state.clone(),
        daemon.station_info().clone(),
        commands.clone(),
        timing.status_interval,
    ));
    tokio::spawn({
        let commands = commands.clone();
        async move {
            if let Err(e) = run_command_listener(command_listener, commands).await {
                error!("Command listener failed: {}", e);
            }
        }
    });
    tokio::spawn({
        let server = ServerState {
            queue: commands.clone(),
            status,
        };
        async move {
            if let Err(e) = serve_http(status_listener, server).await {
                error!("Status server failed: {}", e);
            }
        }
    });
    tokio::spawn({
        let commands = commands.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, queueing quit");
                commands.push("quit");
            }
        }
    });

    tokio::task::spawn_blocking(move || daemon.run())
        .await
        .context("Interpreter thread panicked")?;
    Ok(())
}
