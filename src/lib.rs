use log::{error, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

// Module declarations
pub mod config;
pub mod discord;
pub mod error;
pub mod presence;
pub mod session;
pub mod types;
pub mod websocket;

use config::Config;
use discord::DiscordPresence;
use presence::{spawn_presence_task, PresenceClient};
use session::SessionStateMachine;
use types::SessionState;
use websocket::SocketServer;

pub async fn run() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting presence relay...");

    let config = Config::from_env()?;
    let shutdown = CancellationToken::new();

    let presence_client = PresenceClient::new(DiscordPresence::new(config.client_id));
    let (presence, presence_task) = spawn_presence_task(presence_client, shutdown.clone());

    let session = SessionState::new(Mutex::new(SessionStateMachine::new(
        config.session_settings(),
    )));
    let server = SocketServer::bind(config.port, Arc::clone(&session), presence).await?;

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown_signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run(shutdown).await;

    if let Err(e) = presence_task.await {
        error!("Presence task failed: {}", e);
    }
    Ok(())
}
