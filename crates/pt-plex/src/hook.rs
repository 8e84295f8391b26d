//! The webhook receiver.
//!
//! The media server posts each notification as a multipart form with the JSON
//! in a field named `payload` (thumbnails ride along in other fields). The
//! server always gets a 200; payloads that are not playback events are logged
//! and dropped.

use std::io;

use axum::Router;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::routing::post;
use pt_session::{MediaResolver, Registry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::webhook::{IngestError, parse_webhook};

/// Where the media server is told to post.
pub const HOOK_PATH: &str = "/hook";

const PAYLOAD_FIELD: &str = "payload";

/// Routes webhook posts into `registry`.
pub fn hook_router<R: MediaResolver>(registry: Registry<R>) -> Router {
    Router::new()
        .route(HOOK_PATH, post(receive::<R>))
        .with_state(registry)
}

/// Serves [`hook_router`] on `listener` until `cancel` fires.
pub async fn serve_hooks<R: MediaResolver>(
    listener: TcpListener,
    registry: Registry<R>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, path = HOOK_PATH, "webhook receiver listening");
    axum::serve(listener, hook_router(registry))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    tracing::info!("webhook receiver stopped");
    Ok(())
}

async fn receive<R: MediaResolver>(
    State(registry): State<Registry<R>>,
    mut form: Multipart,
) -> &'static str {
    match read_payload(&mut form).await {
        Ok(Some(payload)) => ingest(&registry, &payload),
        Ok(None) => tracing::warn!("webhook without a payload field"),
        Err(e) => tracing::warn!(error = %e, "unreadable webhook form"),
    }
    "OK"
}

async fn read_payload(form: &mut Multipart) -> Result<Option<String>, MultipartError> {
    while let Some(field) = form.next_field().await? {
        if field.name() == Some(PAYLOAD_FIELD) {
            return field.text().await.map(Some);
        }
    }
    Ok(None)
}

fn ingest<R: MediaResolver>(registry: &Registry<R>, payload: &str) {
    match parse_webhook(payload) {
        Ok(event) => {
            registry.dispatch(event);
        }
        Err(IngestError::UnknownEvent(name)) => tracing::debug!(event = %name, "webhook ignored"),
        Err(e) => tracing::warn!(error = %e, "webhook dropped"),
    }
}
