//! The session-list poll loop.

use std::time::Duration;

use pt_session::{MediaResolver, Registry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::client::{PlexError, SessionSource};

/// Poll loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait between polls while something is playing.
    pub interval: Duration,
    /// Added to the wait after each failure or empty session list.
    pub backoff: Duration,
    /// Empty session lists stop growing the wait once it reaches this.
    pub idle_max: Duration,
    /// More consecutive failures than this end the loop.
    pub failure_ceiling: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2500),
            backoff: Duration::from_millis(50),
            idle_max: Duration::from_secs(30),
            failure_ceiling: 100,
        }
    }
}

/// The poll loop gave up.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("{failures} consecutive failures listing sessions")]
    FailureCeiling {
        failures: u32,
        #[source]
        last: PlexError,
    },
}

/// The wait between polls and the failure count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    config: PollConfig,
    wait: Duration,
    failures: u32,
}

impl Backoff {
    pub const fn new(config: PollConfig) -> Self {
        Self {
            config,
            wait: config.interval,
            failures: 0,
        }
    }

    /// How long to wait before the next poll.
    pub const fn wait(&self) -> Duration {
        self.wait
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed poll.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::FailureCeiling`] once the ceiling is exceeded.
    pub fn failed(&mut self, error: PlexError) -> Result<(), PollError> {
        self.failures += 1;
        self.wait += self.config.backoff;
        if self.failures > self.config.failure_ceiling {
            return Err(PollError::FailureCeiling {
                failures: self.failures,
                last: error,
            });
        }
        tracing::warn!(failures = self.failures, wait = ?self.wait, error = %error, "listing sessions failed");
        Ok(())
    }

    /// Records a successful poll that found `sessions` sessions.
    pub fn polled(&mut self, sessions: usize) {
        self.failures = 0;
        if sessions > 0 {
            self.wait = self.config.interval;
        } else if self.wait < self.config.idle_max {
            self.wait += self.config.backoff;
        }
    }
}

/// Polls the session list and dispatches one event per playing session.
///
/// Runs until `cancel` fires.
///
/// # Errors
///
/// Returns [`PollError::FailureCeiling`] after too many consecutive failures.
pub async fn run_poller<S, R>(
    source: &S,
    registry: &Registry<R>,
    config: PollConfig,
    cancel: CancellationToken,
) -> Result<(), PollError>
where
    S: SessionSource,
    R: MediaResolver,
{
    let mut backoff = Backoff::new(config);
    tracing::info!(interval = ?config.interval, "poller started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(backoff.wait()) => {}
        }

        let listed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            listed = source.sessions() => listed,
        };
        match listed {
            Ok(events) => {
                tracing::debug!(sessions = events.len(), "polled");
                backoff.polled(events.len());
                for event in events {
                    registry.dispatch(event);
                }
            }
            Err(e) => backoff.failed(e)?,
        }
    }
    tracing::info!("poller stopped");
    Ok(())
}
