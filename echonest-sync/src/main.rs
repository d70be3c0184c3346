//! EchoNest Sync - command line agent
//!
//! Keeps the local Spotify client in step with an EchoNest server.
//!
//! Usage:
//!   echonest-sync --server https://echone.st --token <TOKEN>
//!   echonest-sync -v   # Debug logging, settings from ~/.echonest-sync.yaml

mod config;
mod mpris;

use clap::Parser;
use echonest_core::status::{self, DisconnectReason};
use echonest_core::{DriftCorrector, EchoNestClient, Player, SyncAgent, SyncEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use config::Cli;
use mpris::SpotifyMpris;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = config::load(&cli).map_err(|e| {
        error!("{}", e);
        e
    })?;

    info!("echonest-sync");
    info!("  server:    {}", config.server);
    info!("  platform:  {}", std::env::consts::OS);
    info!("  drift:     {}s", config.drift_threshold);

    let player = SpotifyMpris::connect().await?;
    if !player.is_running().await {
        warn!("Spotify does not appear to be running, start it first");
    }

    let client = EchoNestClient::new(&config.server, config.token.clone())?;

    let (status_tx, status_rx) = status::channel();
    tokio::spawn(log_status(status_rx));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopped");
            shutdown.cancel();
        }
    });

    let mut agent = SyncAgent::new(client, player, DriftCorrector::new(config.drift_threshold))
        .with_status(status_tx);

    agent.run(cancel).await.map_err(|e| {
        error!("{}", e);
        e.into()
    })
}

fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("echonest_core={level}").parse()?)
                .add_directive(format!("echonest_sync={level}").parse()?)
                .add_directive("hyper_util=off".parse()?)
                .add_directive("reqwest=off".parse()?)
                .add_directive("hyper=off".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Surface status changes the way the tray icon used to
async fn log_status(mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Connected { reconnect: true } => info!("Reconnected to EchoNest"),
            SyncEvent::Connected { reconnect: false } => info!("Connected to EchoNest"),
            SyncEvent::Disconnected {
                reason: DisconnectReason::AuthFailed,
            } => error!("Disconnected: authentication failed"),
            SyncEvent::Disconnected { reason } => debug!("Disconnected: {:?}", reason),
            SyncEvent::TrackChanged { uri } => info!("Track changed: {}", uri),
            SyncEvent::ForeignSource { source } => info!("Server is playing from {}", source),
            SyncEvent::NothingPlaying => info!("Nothing playing"),
            SyncEvent::PlayerPaused { paused } => {
                info!("Playback {}", if paused { "paused" } else { "resumed" })
            }
            SyncEvent::DriftCorrected { local, server } => {
                debug!("Re-synced from {:.1}s to {:.1}s", local, server)
            }
            event => debug!("{:?}", event),
        }
    }
}
