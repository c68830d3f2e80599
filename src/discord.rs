//! Discord Rich Presence backend using discord-sdk

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use discord_sdk::{
    activity::{ActivityBuilder, ActivityKind as DiscordActivityKind, Assets, Button},
    wheel::{UserState, Wheel},
    Discord, Subscriptions,
};
use log::{info, warn};

use crate::error::PresenceError;
use crate::presence::{Activity, ActivityKind, PresenceService};

/// Timeout for waiting for Discord handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DiscordPresence {
    app_id: i64,
    discord: Option<Discord>,
    // Keeps the event receivers alive for as long as the connection.
    _wheel: Option<Wheel>,
}

impl DiscordPresence {
    pub fn new(app_id: i64) -> Self {
        Self {
            app_id,
            discord: None,
            _wheel: None,
        }
    }

    fn connected(&self) -> Result<&Discord, PresenceError> {
        self.discord.as_ref().ok_or(PresenceError::NotConnected)
    }
}

fn discord_kind(kind: ActivityKind) -> DiscordActivityKind {
    match kind {
        ActivityKind::Playing => DiscordActivityKind::Playing,
        ActivityKind::Listening => DiscordActivityKind::Listening,
    }
}

fn unix_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

impl PresenceService for DiscordPresence {
    async fn connect(&mut self) -> Result<(), PresenceError> {
        self.disconnect().await;

        let (wheel, handler) = Wheel::new(Box::new(|err| {
            warn!("Discord error: {:?}", err);
        }));
        let mut user_spoke = wheel.user();

        let discord = Discord::new(self.app_id, Subscriptions::ACTIVITY, Box::new(handler))
            .map_err(|e| PresenceError::Connect(format!("{:?}", e)))?;

        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            if user_spoke.0.changed().await.is_err() {
                Err(PresenceError::Connect("Discord connection closed".to_string()))
            } else {
                match &*user_spoke.0.borrow() {
                    UserState::Connected(user) => Ok(user.username.clone()),
                    UserState::Disconnected(err) => Err(PresenceError::Connect(format!(
                        "Discord disconnected: {:?}",
                        err
                    ))),
                }
            }
        })
        .await
        .unwrap_or(Err(PresenceError::HandshakeTimeout));

        match handshake {
            Ok(username) => {
                info!("Discord Rich Presence connected as {}", username);
                self.discord = Some(discord);
                self._wheel = Some(wheel);
                Ok(())
            }
            Err(e) => {
                discord.disconnect().await;
                Err(e)
            }
        }
    }

    async fn update(&mut self, activity: &Activity) -> Result<(), PresenceError> {
        let discord = self.connected()?;

        let builder = ActivityBuilder::new()
            .kind(discord_kind(activity.kind))
            .details(activity.details.clone())
            .state(activity.state.clone())
            .start_timestamp(unix_time(activity.start))
            .end_timestamp(unix_time(activity.end))
            .assets(Assets::default().large(
                activity.large_image.clone(),
                Some(activity.large_text.clone()),
            ))
            .button(Button {
                label: activity.button_label.clone(),
                url: activity.button_url.clone(),
            });

        discord
            .update_activity(builder)
            .await
            .map(|_| ())
            .map_err(|e| PresenceError::Request(format!("{:?}", e)))
    }

    async fn clear(&mut self) -> Result<(), PresenceError> {
        self.connected()?
            .clear_activity()
            .await
            .map(|_| ())
            .map_err(|e| PresenceError::Request(format!("{:?}", e)))
    }

    async fn disconnect(&mut self) {
        self._wheel = None;
        if let Some(discord) = self.discord.take() {
            discord.disconnect().await;
            info!("Discord Rich Presence disconnected");
        }
    }
}
