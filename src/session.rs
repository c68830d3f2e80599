//! Playback state machine.
//!
//! Holds the one current song and turns inbound messages into state changes
//! plus the presence command that must follow. Time is passed in as unix
//! seconds so transitions are deterministic.

use log::{debug, info};
use url::Url;

use crate::presence::{Activity, ActivityKind, PresenceCommand};
use crate::types::{Ack, InboundMessage, NewTrack, PlaybackEvent, Song};

pub const LISTEN_BUTTON_LABEL: &str = "Listen";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Values the state machine needs from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub image_base: Url,
    pub default_link: Url,
    pub large_text: String,
}

/// Result of applying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub ack: Ack,
    pub command: Option<PresenceCommand>,
}

impl Transition {
    fn invalid() -> Self {
        Self {
            ack: Ack::Invalid,
            command: None,
        }
    }
}

pub struct SessionStateMachine {
    settings: SessionSettings,
    song: Option<Song>,
}

impl SessionStateMachine {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            song: None,
        }
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        match &self.song {
            None => PlaybackState::Idle,
            Some(song) if song.paused => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }

    pub fn apply(&mut self, message: &InboundMessage, now: i64) -> Transition {
        match message.classify() {
            Some(PlaybackEvent::NewTrack(track)) => self.new_track(track, now),
            Some(PlaybackEvent::Seek { position }) => self.seek(position, now),
            Some(PlaybackEvent::SetPaused(true)) => self.pause(now),
            Some(PlaybackEvent::SetPaused(false)) => self.resume(now),
            None => Transition::invalid(),
        }
    }

    fn new_track(&mut self, track: NewTrack, now: i64) -> Transition {
        let song = Song {
            image: resolve_image(&self.settings.image_base, &track.image),
            link: resolve_link(&self.settings.default_link, track.link.as_deref()),
            title: track.title,
            artist: track.artist,
            duration: track.duration,
            start_time: now.saturating_sub(track.position.unwrap_or(0)),
            paused: track.paused,
            paused_at: track.paused.then_some(now),
        };
        info!("Now playing: '{}' by '{}'", song.title, song.artist);
        self.song = Some(song);

        if track.paused {
            self.cleared()
        } else {
            self.updated()
        }
    }

    fn seek(&mut self, position: i64, now: i64) -> Transition {
        let Some(song) = self.song.as_mut() else {
            debug!("Seek to {}s ignored: no song", position);
            return Transition::invalid();
        };
        song.start_time = now.saturating_sub(position);
        debug!("Seeked '{}' to {}s", song.title, position);

        if song.paused {
            // Position stays frozen at the seek target until resume.
            song.paused_at = Some(now);
            self.cleared()
        } else {
            self.updated()
        }
    }

    fn pause(&mut self, now: i64) -> Transition {
        let Some(song) = self.song.as_mut() else {
            return Transition::invalid();
        };
        if !song.paused || song.paused_at.is_none() {
            song.paused = true;
            song.paused_at = Some(now);
        }
        debug!("Paused '{}' at {}s", song.title, song.elapsed(now));
        self.cleared()
    }

    fn resume(&mut self, now: i64) -> Transition {
        let Some(song) = self.song.as_mut() else {
            return Transition::invalid();
        };
        if let Some(paused_at) = song.paused_at.take() {
            song.start_time = song
                .start_time
                .saturating_add(now.saturating_sub(paused_at));
        }
        song.paused = false;
        debug!("Resumed '{}' at {}s", song.title, song.elapsed(now));
        self.updated()
    }

    fn updated(&self) -> Transition {
        Transition {
            ack: Ack::Updated,
            command: self.activity().map(PresenceCommand::Update),
        }
    }

    fn cleared(&self) -> Transition {
        Transition {
            ack: Ack::Paused,
            command: Some(PresenceCommand::Clear),
        }
    }

    pub fn activity(&self) -> Option<Activity> {
        let song = self.song.as_ref()?;
        Some(Activity {
            kind: ActivityKind::Listening,
            details: song.title.clone(),
            state: song.artist.clone(),
            start: song.start_time,
            end: song.end_time(),
            large_image: song.image.clone(),
            large_text: self.settings.large_text.clone(),
            button_label: LISTEN_BUTTON_LABEL.to_string(),
            button_url: song.link.clone(),
        })
    }
}

/// Absolute URLs pass through untouched; anything else is joined onto `base`.
pub fn resolve_image(base: &Url, image: &str) -> String {
    if Url::parse(image).is_ok() {
        return image.to_string();
    }
    match base.join(image) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}{}", base, image),
    }
}

/// Only absolute http(s) links are usable as a button target.
pub fn resolve_link(default: &Url, link: Option<&str>) -> String {
    link.and_then(|link| Url::parse(link).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string())
        .unwrap_or_else(|| default.to_string())
}
