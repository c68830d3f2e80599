//! Presence-service wrapper: reconnect-with-backoff and failure containment.
//!
//! The service handle is owned by one background task. Connection tasks send
//! it [`PresenceCommand`]s through a [`PresenceHandle`] and never wait on the
//! presence service themselves.

use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PresenceError;

/// Delay between two connection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Verb the presence display shows in front of the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Playing,
    Listening,
}

/// An activity as shown by the presence display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub details: String,
    pub state: String,
    pub start: i64,
    pub end: i64,
    pub large_image: String,
    pub large_text: String,
    pub button_label: String,
    pub button_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommand {
    Update(Activity),
    Clear,
}

/// A presence-display backend (Discord, or a fake in tests).
pub trait PresenceService: Send + 'static {
    fn connect(&mut self) -> impl Future<Output = Result<(), PresenceError>> + Send;

    fn update(
        &mut self,
        activity: &Activity,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    fn clear(&mut self) -> impl Future<Output = Result<(), PresenceError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}

pub struct PresenceClient<S> {
    service: S,
    retry_interval: Duration,
}

impl<S: PresenceService> PresenceClient<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            retry_interval: RECONNECT_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Retries forever; only returns once connected.
    pub async fn connect_with_retry(&mut self) {
        loop {
            match self.service.connect().await {
                Ok(()) => {
                    info!("Connected to presence service");
                    return;
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to presence service: {}. Retrying in {} seconds...",
                        e,
                        self.retry_interval.as_secs_f32()
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// Returns whether the activity was delivered. A failed update is dropped
    /// after reconnecting.
    pub async fn safe_update(&mut self, activity: &Activity) -> bool {
        match self.service.update(activity).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Presence update failed: {}. Attempting reconnect...", e);
                self.connect_with_retry().await;
                false
            }
        }
    }

    pub async fn safe_clear(&mut self) -> bool {
        match self.service.clear().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Presence clear failed: {}. Attempting reconnect...", e);
                self.connect_with_retry().await;
                false
            }
        }
    }

    pub async fn apply(&mut self, command: &PresenceCommand) -> bool {
        match command {
            PresenceCommand::Update(activity) => self.safe_update(activity).await,
            PresenceCommand::Clear => self.safe_clear().await,
        }
    }

    /// Clears the display and drops the connection; errors are ignored.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.service.clear().await {
            debug!("Presence clear on shutdown failed: {}", e);
        }
        self.service.disconnect().await;
    }
}

/// Cloneable sender side of the presence task.
#[derive(Debug, Clone)]
pub struct PresenceHandle {
    tx: mpsc::UnboundedSender<PresenceCommand>,
}

impl PresenceHandle {
    pub fn send(&self, command: PresenceCommand) {
        debug!("Queueing presence command: {:?}", command);
        if self.tx.send(command).is_err() {
            warn!("Presence task has stopped; command dropped");
        }
    }
}

#[cfg(test)]
impl PresenceHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<PresenceCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Spawns the task that owns the presence service. It connects first (with
/// retry), then applies commands in order until `shutdown` fires or every
/// handle is dropped.
pub fn spawn_presence_task<S: PresenceService>(
    client: PresenceClient<S>,
    shutdown: CancellationToken,
) -> (PresenceHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_presence_task(client, rx, shutdown));
    (PresenceHandle { tx }, task)
}

async fn run_presence_task<S: PresenceService>(
    mut client: PresenceClient<S>,
    mut rx: mpsc::UnboundedReceiver<PresenceCommand>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = shutdown.cancelled() => return,
        _ = client.connect_with_retry() => {}
    }

    loop {
        let command = tokio::select! {
            _ = shutdown.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            delivered = client.apply(&command) => {
                if !delivered {
                    debug!("Dropped presence command after reconnect: {:?}", command);
                }
            }
        }
    }

    client.shutdown().await;
    info!("Presence task stopped");
}
