//! Serve command: take webhooks, poll the media server and track sessions
//! until stopped.

use anyhow::{Context, Result};
use pt_plex::{PlexClient, run_poller, serve_hooks};
use pt_session::Registry;
use tokio::net::TcpListener;

use crate::Config;

/// Runs until Ctrl-C, or until the poller or the webhook receiver stops.
///
/// Either way every live session is finalized before returning.
pub async fn run(config: &Config) -> Result<()> {
    let client = PlexClient::new(&config.server_url, config.token.clone(), config.request_timeout())
        .context("failed to create media server client")?;
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;
    let registry = Registry::new(client.clone(), config.store(), config.tracker_config());
    let cancel = registry.cancellation_token().child_token();

    tracing::info!(server = %client.base_url(), store = ?config.store().location(), "serving");

    let poller = {
        let registry = registry.clone();
        let cancel = cancel.clone();
        let poll = config.poll_config();
        tokio::spawn(async move {
            let outcome = run_poller(&client, &registry, poll, cancel.clone()).await;
            cancel.cancel();
            outcome
        })
    };
    let receiver = {
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = serve_hooks(listener, registry, cancel.clone()).await;
            cancel.cancel();
            outcome
        })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("interrupted, shutting down"),
                Err(e) => tracing::warn!(error = %e, "cannot listen for interrupt, shutting down"),
            }
            cancel.cancel();
        }
        () = cancel.cancelled() => tracing::warn!("event source stopped, shutting down"),
    }

    let polled = poller.await;
    let received = receiver.await;
    registry.shutdown().await;
    polled
        .context("poller task failed")?
        .context("gave up polling the media server")?;
    received
        .context("webhook receiver task failed")?
        .context("webhook receiver failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_server_url_fails_fast() {
        let config = Config {
            server_url: "plex.lan:32400".to_string(),
            ..Config::default()
        };
        let err = run(&config).await.unwrap_err();
        assert!(err.to_string().contains("media server client"));
    }

    #[tokio::test]
    async fn unusable_listen_address_fails_fast() {
        let config = Config {
            listen_addr: "no port here".to_string(),
            ..Config::default()
        };
        let err = run(&config).await.unwrap_err();
        assert!(err.to_string().contains("failed to listen on no port here"));
    }
}
