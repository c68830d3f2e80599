use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::session::SessionStateMachine;

/// A frame sent by the web client. Every field is optional; which ones are
/// present decides the event (see [`InboundMessage::classify`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub title: Option<String>,
    pub artist: Option<String>,
    #[serde(alias = "cover")]
    pub image: Option<String>,
    pub link: Option<String>,
    pub duration: Option<f64>,
    pub paused: Option<bool>,
    #[serde(rename = "currentTime")]
    pub current_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub image: String,
    pub link: Option<String>,
    pub duration: i64,
    pub position: Option<i64>,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    NewTrack(NewTrack),
    Seek { position: i64 },
    SetPaused(bool),
}

impl InboundMessage {
    /// Picks the event this message describes. A full set of track fields
    /// wins over a seek, which wins over a pause flag.
    pub fn classify(&self) -> Option<PlaybackEvent> {
        let position = whole_seconds(self.current_time);

        if let (Some(title), Some(artist), Some(image), Some(duration)) = (
            non_empty(&self.title),
            non_empty(&self.artist),
            non_empty(&self.image),
            whole_seconds(self.duration).filter(|d| *d > 0),
        ) {
            return Some(PlaybackEvent::NewTrack(NewTrack {
                title: title.to_string(),
                artist: artist.to_string(),
                image: image.to_string(),
                link: non_empty(&self.link).map(str::to_string),
                duration,
                position,
                paused: self.paused.unwrap_or(false),
            }));
        }

        if let Some(position) = position {
            return Some(PlaybackEvent::Seek { position });
        }

        self.paused.map(PlaybackEvent::SetPaused)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Longest duration or position accepted from a client.
pub const MAX_SECONDS: i64 = u32::MAX as i64;

/// Finite seconds in `0..=MAX_SECONDS`, truncated to an integer.
fn whole_seconds(value: Option<f64>) -> Option<i64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= MAX_SECONDS as f64)
        .map(|v| v.trunc() as i64)
}

/// The song currently shown. `start_time` is kept so that `now - start_time`
/// is the elapsed position while playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub image: String,
    pub link: String,
    pub duration: i64,
    pub start_time: i64,
    pub paused: bool,
    pub paused_at: Option<i64>,
}

impl Song {
    pub fn elapsed(&self, now: i64) -> i64 {
        match self.paused_at {
            Some(paused_at) if self.paused => paused_at.saturating_sub(self.start_time),
            _ => now.saturating_sub(self.start_time),
        }
    }

    pub fn end_time(&self) -> i64 {
        self.start_time.saturating_add(self.duration)
    }
}

/// Text acknowledgement sent back for every inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Paused,
    Updated,
    Invalid,
    Error(String),
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::Paused => f.write_str("paused"),
            Ack::Updated => f.write_str("updated"),
            Ack::Invalid => f.write_str("invalid"),
            Ack::Error(message) => write!(f, "error: {}", message),
        }
    }
}

// Shared state types
pub type SessionState = Arc<Mutex<SessionStateMachine>>;
