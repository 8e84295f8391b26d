//! Media server integration.
//!
//! - [`PlexClient`]: lists sessions and resolves session keys to media files
//! - [`parse_webhook`]: turns push notifications into playback events
//! - [`serve_hooks`]: the HTTP endpoint the server posts those notifications to
//! - [`run_poller`]: the session-list poll loop with backoff

pub mod client;
pub mod hook;
pub mod poller;
pub mod webhook;

pub use client::{DEFAULT_TIMEOUT, PlexClient, PlexError, SessionSource, parse_description, parse_sessions};
pub use hook::{HOOK_PATH, hook_router, serve_hooks};
pub use poller::{Backoff, PollConfig, PollError, run_poller};
pub use webhook::{IngestError, parse_webhook, parse_webhook_at};
