//! Looking up what a session is playing.

use std::future::Future;

use pt_core::{Offset, SessionKey};
use thiserror::Error;

/// The media file behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// Path of the media file as the server knows it.
    pub file: String,
    /// Full duration in milliseconds.
    pub duration_ms: u64,
}

impl MediaDescription {
    pub fn duration(&self) -> Offset {
        Offset::from_millis(self.duration_ms)
    }
}

/// Errors from resolving a session's media.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The server did not describe any media for the key.
    #[error("no media found for {0}")]
    NotFound(SessionKey),
    /// The lookup itself failed.
    #[error("media lookup failed: {0}")]
    Lookup(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves session keys to media descriptions.
///
/// Implemented by the media server client; trackers call it once at startup.
pub trait MediaResolver: Send + Sync + 'static {
    fn describe(
        &self,
        key: &SessionKey,
    ) -> impl Future<Output = Result<MediaDescription, ResolveError>> + Send;
}
