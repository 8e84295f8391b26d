//! Webhook payload normalization.
//!
//! The media server posts a multipart form whose JSON field describes the
//! event. Only the playback events (`media.play`, `media.pause`,
//! `media.resume`, `media.stop`) are turned into [`PlaybackEvent`]s; anything
//! else is an [`IngestError`] the caller logs and drops.

use chrono::{DateTime, Utc};
use pt_core::{PlaybackEvent, SessionKey, SourceKind, ValidationError};
use serde::Deserialize;
use thiserror::Error;

const MEDIA_EVENT_PREFIX: &str = "media.";

/// Why a webhook payload was not turned into an event.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("undecodable webhook payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ignoring webhook event {0:?}")]
    UnknownEvent(String),
    #[error("webhook event {0:?} carries no metadata")]
    MissingMetadata(String),
    #[error("invalid session key: {0}")]
    InvalidKey(#[from] ValidationError),
}

#[derive(Debug, Deserialize)]
struct Hook {
    event: String,
    #[serde(rename = "Metadata", default)]
    metadata: Option<HookMetadata>,
}

#[derive(Debug, Deserialize)]
struct HookMetadata {
    #[serde(default)]
    key: String,
    #[serde(rename = "viewOffset", alias = "ViewOffset", default)]
    view_offset: Option<u64>,
}

/// Parses a webhook JSON payload received now.
pub fn parse_webhook(payload: &str) -> Result<PlaybackEvent, IngestError> {
    parse_webhook_at(payload, Utc::now())
}

/// Parses a webhook JSON payload received at `received`.
pub fn parse_webhook_at(payload: &str, received: DateTime<Utc>) -> Result<PlaybackEvent, IngestError> {
    let hook: Hook = serde_json::from_str(payload)?;

    let source = hook
        .event
        .strip_prefix(MEDIA_EVENT_PREFIX)
        .and_then(|_| hook.event.parse::<SourceKind>().ok())
        .filter(SourceKind::is_push)
        .ok_or_else(|| IngestError::UnknownEvent(hook.event.clone()))?;
    let metadata = hook
        .metadata
        .ok_or_else(|| IngestError::MissingMetadata(hook.event.clone()))?;
    let key = SessionKey::new(metadata.key)?;

    if metadata.view_offset.is_none() {
        tracing::warn!(session = %key, %source, "webhook event without view offset");
    }
    Ok(PlaybackEvent::new(key, metadata.view_offset, received, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_event_with_offset() {
        let at = Utc::now();
        let event = parse_webhook_at(
            r#"{"event": "media.play", "user": true, "Metadata": {"key": "/library/metadata/5", "viewOffset": 9000, "librarySectionType": "show"}}"#,
            at,
        )
        .unwrap();
        assert_eq!(event.source, SourceKind::Play);
        assert_eq!(event.session_key.as_str(), "/library/metadata/5");
        assert_eq!(event.offset_ms, Some(9000));
        assert_eq!(event.timestamp, at);
    }

    #[test]
    fn stop_without_offset() {
        let event = parse_webhook(r#"{"event": "media.stop", "Metadata": {"key": "/library/metadata/5"}}"#)
            .unwrap();
        assert_eq!(event.source, SourceKind::Stop);
        assert_eq!(event.offset_ms, None);
    }

    #[test]
    fn every_playback_event_is_accepted() {
        for (name, kind) in [
            ("media.pause", SourceKind::Pause),
            ("media.resume", SourceKind::Resume),
        ] {
            let payload = format!(r#"{{"event": "{name}", "Metadata": {{"key": "/k"}}}}"#);
            assert_eq!(parse_webhook(&payload).unwrap().source, kind);
        }
    }

    #[test]
    fn other_events_are_rejected() {
        for name in ["library.new", "media.scrobble", "media.rate", "play", "poll"] {
            let payload = format!(r#"{{"event": "{name}", "Metadata": {{"key": "/k"}}}}"#);
            assert!(
                matches!(parse_webhook(&payload), Err(IngestError::UnknownEvent(ref e)) if e == name),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(parse_webhook("{"), Err(IngestError::Json(_))));
        assert!(matches!(
            parse_webhook(r#"{"event": "media.play"}"#),
            Err(IngestError::MissingMetadata(_))
        ));
        assert!(matches!(
            parse_webhook(r#"{"event": "media.play", "Metadata": {"viewOffset": 1}}"#),
            Err(IngestError::InvalidKey(_))
        ));
    }
}
