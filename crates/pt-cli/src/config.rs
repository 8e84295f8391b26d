//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pt_plex::PollConfig;
use pt_session::TrackerConfig;
use pt_store::WatchLogStore;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the media server.
    pub server_url: String,
    /// Media server access token.
    pub token: Option<String>,
    /// Address the webhook receiver listens on.
    pub listen_addr: String,
    /// Shared directory for watch logs; unset keeps them beside the media.
    pub watchlog_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub poll_backoff_ms: u64,
    pub poll_idle_max_ms: u64,
    pub poll_failure_ceiling: u32,
    pub request_timeout_ms: u64,
    /// Seconds between liveness ticks.
    pub tick_secs: u64,
    /// Ticks without progress before a session is closed.
    pub idle_ticks: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("listen_addr", &self.listen_addr)
            .field("watchlog_dir", &self.watchlog_dir)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_backoff_ms", &self.poll_backoff_ms)
            .field("poll_idle_max_ms", &self.poll_idle_max_ms)
            .field("poll_failure_ceiling", &self.poll_failure_ceiling)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("tick_secs", &self.tick_secs)
            .field("idle_ticks", &self.idle_ticks)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let poll = PollConfig::default();
        let tracker = TrackerConfig::default();
        Self {
            server_url: "http://127.0.0.1:32400".to_string(),
            token: None,
            listen_addr: "0.0.0.0:8081".to_string(),
            watchlog_dir: None,
            poll_interval_ms: millis(poll.interval),
            poll_backoff_ms: millis(poll.backoff),
            poll_idle_max_ms: millis(poll.idle_max),
            poll_failure_ceiling: poll.failure_ceiling,
            request_timeout_ms: millis(pt_plex::DEFAULT_TIMEOUT),
            tick_secs: tracker.tick.as_secs(),
            idle_ticks: tracker.idle_ticks,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // PT_SERVER_URL, PT_TOKEN, PT_LISTEN_ADDR, PT_WATCHLOG_DIR, ...
        figment = figment.merge(Env::prefixed("PT_"));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    fn validate(&self) -> Result<(), figment::Error> {
        if self.tick_secs == 0 {
            return Err(figment::Error::from("tick_secs must be at least 1".to_string()));
        }
        if self.idle_ticks == 0 {
            return Err(figment::Error::from("idle_ticks must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn store(&self) -> WatchLogStore {
        WatchLogStore::from_dir(self.watchlog_dir.clone())
    }

    pub const fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            backoff: Duration::from_millis(self.poll_backoff_ms),
            idle_max: Duration::from_millis(self.poll_idle_max_ms),
            failure_ceiling: self.poll_failure_ceiling,
        }
    }

    pub const fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            tick: Duration::from_secs(self.tick_secs),
            idle_ticks: self.idle_ticks,
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Returns the platform-specific config directory for playtape.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("playtape"))
}
