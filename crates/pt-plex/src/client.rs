//! HTTP client for the media server.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pt_core::{PlaybackEvent, SessionKey, SourceKind};
use pt_session::{MediaDescription, MediaResolver, ResolveError};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const SESSIONS_PATH: &str = "/status/sessions";
const TOKEN_HEADER: &str = "X-Plex-Token";

/// Media server client errors.
#[derive(Debug, Error)]
pub enum PlexError {
    /// The configured server URL is unusable.
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with an error status.
    #[error("{path} returned {status}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Anything that can list the sessions currently playing.
pub trait SessionSource: Send + Sync {
    fn sessions(&self) -> impl Future<Output = Result<Vec<PlaybackEvent>, PlexError>> + Send;
}

/// Media server API client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct PlexClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for PlexClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl PlexClient {
    /// Creates a client for the server at `server_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an absolute http(s) URL or the HTTP
    /// client fails to build.
    pub fn new(
        server_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlexError> {
        let parsed = reqwest::Url::parse(server_url).map_err(|e| PlexError::InvalidUrl {
            url: server_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlexError::InvalidUrl {
                url: server_url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PlexError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: server_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<String, PlexError> {
        let url = format!("{}{path}", self.base_url);
        tracing::trace!(%url, "GET");
        let mut request = self.http.get(&url).header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Status {
                path: path.to_string(),
                status,
            });
        }
        Ok(response.text().await?)
    }

    /// Lists active sessions as poll events stamped with the poll instant.
    pub async fn list_sessions(&self) -> Result<Vec<PlaybackEvent>, PlexError> {
        let polled_at = Utc::now();
        let body = self.get(SESSIONS_PATH).await?;
        parse_sessions(&body, polled_at)
    }

    /// Looks up the file and duration behind a metadata key.
    pub async fn describe_media(&self, key: &SessionKey) -> Result<Option<MediaDescription>, PlexError> {
        let body = self.get(key.as_str()).await?;
        parse_description(&body)
    }
}

impl SessionSource for PlexClient {
    fn sessions(&self) -> impl Future<Output = Result<Vec<PlaybackEvent>, PlexError>> + Send {
        self.list_sessions()
    }
}

impl MediaResolver for PlexClient {
    async fn describe(&self, key: &SessionKey) -> Result<MediaDescription, ResolveError> {
        match self.describe_media(key).await {
            Ok(Some(media)) => Ok(media),
            Ok(None) => Err(ResolveError::NotFound(key.clone())),
            Err(e) => Err(ResolveError::Lookup(Box::new(e))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    key: String,
    #[serde(rename = "viewOffset", default)]
    view_offset: Option<u64>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(rename = "Media", default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    duration: Option<u64>,
    #[serde(rename = "Part", default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    file: String,
}

fn parse_container(body: &str) -> Result<MediaContainer, PlexError> {
    serde_json::from_str::<Envelope>(body)
        .map(|envelope| envelope.container)
        .map_err(|e| PlexError::InvalidResponse(e.to_string()))
}

/// Decodes a session list response.
///
/// Entries with an empty key are skipped; a missing view offset is kept as
/// an event without an offset.
pub fn parse_sessions(body: &str, polled_at: DateTime<Utc>) -> Result<Vec<PlaybackEvent>, PlexError> {
    let container = parse_container(body)?;
    let mut events = Vec::with_capacity(container.metadata.len());
    for item in container.metadata {
        let Ok(key) = SessionKey::new(item.key) else {
            tracing::warn!("session without a key, skipped");
            continue;
        };
        if item.view_offset.is_none() {
            tracing::warn!(session = %key, "session without view offset");
        }
        events.push(PlaybackEvent::new(key, item.view_offset, polled_at, SourceKind::Poll));
    }
    Ok(events)
}

/// Decodes a metadata response into the media it describes.
///
/// Returns `None` when the response names no media file.
pub fn parse_description(body: &str) -> Result<Option<MediaDescription>, PlexError> {
    let container = parse_container(body)?;
    let Some(item) = container.metadata.into_iter().next() else {
        return Ok(None);
    };
    let Some(media) = item.media.into_iter().next() else {
        return Ok(None);
    };
    let Some(part) = media.parts.into_iter().next() else {
        return Ok(None);
    };
    let duration_ms = item.duration.or(media.duration).unwrap_or_default();
    Ok(Some(MediaDescription {
        file: part.file,
        duration_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSIONS: &str = r#"{
        "MediaContainer": {
            "size": 2,
            "Metadata": [
                {"key": "/library/metadata/10", "viewOffset": 125000, "type": "episode"},
                {"key": "/library/metadata/11", "type": "movie"},
                {"key": "", "viewOffset": 5}
            ]
        }
    }"#;

    const METADATA: &str = r#"{
        "MediaContainer": {
            "Metadata": [{
                "key": "/library/metadata/10",
                "duration": 1800000,
                "Media": [{
                    "id": 1,
                    "duration": 1799000,
                    "Part": [{"id": 2, "file": "/media/tv/show.s01e01.mkv"}]
                }]
            }]
        }
    }"#;

    #[test]
    fn sessions_become_poll_events() {
        let at = Utc::now();
        let events = parse_sessions(SESSIONS, at).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].session_key.as_str(), "/library/metadata/10");
        assert_eq!(events[0].offset_ms, Some(125_000));
        assert_eq!(events[0].source, SourceKind::Poll);
        assert_eq!(events[0].timestamp, at);
        assert_eq!(events[1].offset_ms, None);
    }

    #[test]
    fn empty_container_has_no_sessions() {
        let events = parse_sessions(r#"{"MediaContainer": {"size": 0}}"#, Utc::now()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_sessions_body_is_an_error() {
        assert!(matches!(
            parse_sessions("<MediaContainer/>", Utc::now()),
            Err(PlexError::InvalidResponse(_))
        ));
    }

    #[test]
    fn description_uses_item_duration_and_first_part() {
        let media = parse_description(METADATA).unwrap().unwrap();
        assert_eq!(media.file, "/media/tv/show.s01e01.mkv");
        assert_eq!(media.duration_ms, 1_800_000);
    }

    #[test]
    fn description_falls_back_to_media_duration() {
        let body = r#"{"MediaContainer": {"Metadata": [
            {"key": "/k", "Media": [{"duration": 42000, "Part": [{"file": "/a.mkv"}]}]}
        ]}}"#;
        let media = parse_description(body).unwrap().unwrap();
        assert_eq!(media.duration_ms, 42_000);
    }

    #[test]
    fn description_without_parts_is_none() {
        let body = r#"{"MediaContainer": {"Metadata": [{"key": "/k", "Media": []}]}}"#;
        assert!(parse_description(body).unwrap().is_none());
        assert!(parse_description(r#"{"MediaContainer": {}}"#).unwrap().is_none());
    }

    #[test]
    fn client_rejects_bad_urls() {
        assert!(matches!(
            PlexClient::new("not a url", None, DEFAULT_TIMEOUT),
            Err(PlexError::InvalidUrl { .. })
        ));
        assert!(matches!(
            PlexClient::new("ftp://host", None, DEFAULT_TIMEOUT),
            Err(PlexError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let client = PlexClient::new(
            "http://127.0.0.1:32400/",
            Some("secret-token".to_string()),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
        assert_eq!(client.base_url(), "http://127.0.0.1:32400");
    }
}
