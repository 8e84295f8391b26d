//! Normalized playback events.
//!
//! Both ingest paths (webhook push and session-list polling) are reduced to a
//! single [`PlaybackEvent`] shape before they reach a session tracker.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SessionKey;

/// Where a playback event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A periodic session-list poll.
    Poll,
    Play,
    Pause,
    Resume,
    Stop,
}

impl SourceKind {
    /// Canonical name, also used as the tape annotation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }

    /// Whether this kind came from a push notification rather than a poll.
    #[must_use]
    pub const fn is_push(&self) -> bool {
        !matches!(self, Self::Poll)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(Self::Poll),
            "play" | "media.play" => Ok(Self::Play),
            "pause" | "media.pause" => Ok(Self::Pause),
            "resume" | "media.resume" => Ok(Self::Resume),
            "stop" | "media.stop" => Ok(Self::Stop),
            _ => Err(UnknownSourceKind(s.to_string())),
        }
    }
}

impl Serialize for SourceKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unrecognized source kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown playback event kind: {0}")]
pub struct UnknownSourceKind(pub String);

/// A single observation of a playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    /// The session this event belongs to.
    pub session_key: SessionKey,
    /// Playback position in milliseconds, when the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_ms: Option<u64>,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
    /// Which ingest path produced the event.
    pub source: SourceKind,
}

impl PlaybackEvent {
    pub fn new(
        session_key: SessionKey,
        offset_ms: Option<u64>,
        timestamp: DateTime<Utc>,
        source: SourceKind,
    ) -> Self {
        Self {
            session_key,
            offset_ms,
            timestamp,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        let variants = [
            SourceKind::Poll,
            SourceKind::Play,
            SourceKind::Pause,
            SourceKind::Resume,
            SourceKind::Stop,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed: SourceKind = s.parse().expect("should parse");
            assert_eq!(parsed, *variant, "roundtrip failed for {variant:?}");
        }
    }

    #[test]
    fn webhook_spellings_parse() {
        assert_eq!("media.play".parse::<SourceKind>().unwrap(), SourceKind::Play);
        assert_eq!("media.stop".parse::<SourceKind>().unwrap(), SourceKind::Stop);
        assert_eq!(
            "media.resume".parse::<SourceKind>().unwrap(),
            SourceKind::Resume
        );
    }

    #[test]
    fn unknown_kind_errors() {
        let err = "media.scrobble".parse::<SourceKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown playback event kind: media.scrobble");
    }

    #[test]
    fn event_keeps_missing_offset_distinct_from_zero() {
        let json = r#"{
            "session_key": "/library/metadata/7",
            "timestamp": "2024-01-01T00:00:00Z",
            "source": "stop"
        }"#;
        let event: PlaybackEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.offset_ms, None);

        let json = r#"{
            "session_key": "/library/metadata/7",
            "offset_ms": 0,
            "timestamp": "2024-01-01T00:00:00Z",
            "source": "poll"
        }"#;
        let event: PlaybackEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.offset_ms, Some(0));
        assert!(!event.source.is_push());
    }
}
