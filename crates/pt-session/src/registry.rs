//! The registry of live session trackers.
//!
//! One mutex guards the key-to-tracker map and the serial counter. A tracker
//! is in the map exactly as long as it has not terminated: it removes itself
//! (by key and serial, so a newer tracker for the same key is left alone)
//! before it closes its mailbox. A producer that races with that shutdown
//! gets its event handed back and retries through [`Registry::ensure`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pt_core::{Offset, PlaybackEvent, SessionKey};
use pt_store::WatchLogStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::control::{SessionControl, SessionSnapshot};
use crate::resolver::MediaResolver;
use crate::tracker::{SessionTracker, TrackerConfig};

/// How often a producer retries after racing with a terminating tracker.
const DISPATCH_ATTEMPTS: usize = 3;

/// A producer's handle on one tracker.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    key: SessionKey,
    serial: u64,
    mailbox: mpsc::UnboundedSender<PlaybackEvent>,
    control: Arc<SessionControl>,
}

impl TrackerHandle {
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    pub const fn serial(&self) -> u64 {
        self.serial
    }

    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    /// Queues an event, handing it back if the tracker is gone.
    pub fn send(&self, event: PlaybackEvent) -> Result<(), PlaybackEvent> {
        self.mailbox.send(event).map_err(|e| e.0)
    }
}

#[derive(Debug, Default)]
struct Sessions {
    by_key: HashMap<SessionKey, TrackerHandle>,
    next_serial: u64,
}

/// State shared by the registry and every tracker it spawned.
pub(crate) struct Shared<R> {
    sessions: Mutex<Sessions>,
    pub(crate) resolver: R,
    pub(crate) store: WatchLogStore,
    pub(crate) config: TrackerConfig,
    pub(crate) cancel: CancellationToken,
    tasks: TaskTracker,
}

impl<R> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes the tracker for `key` if it is still the one with `serial`.
    pub(crate) fn remove(&self, key: &SessionKey, serial: u64) -> bool {
        let mut sessions = self.lock();
        match sessions.by_key.get(key) {
            Some(handle) if handle.serial == serial => {
                sessions.by_key.remove(key);
                tracing::debug!(session = %key, serial, "deregistered");
                true
            }
            _ => false,
        }
    }

    fn control_for(&self, serial: u64) -> Option<Arc<SessionControl>> {
        self.lock()
            .by_key
            .values()
            .find(|handle| handle.serial == serial)
            .map(|handle| Arc::clone(&handle.control))
    }
}

/// Live session trackers, keyed by session.
pub struct Registry<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for Registry<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: MediaResolver> Registry<R> {
    pub fn new(resolver: R, store: WatchLogStore, config: TrackerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: Mutex::new(Sessions::default()),
                resolver,
                store,
                config,
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Returns the tracker for `key`, spawning one if none is live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ensure(&self, key: &SessionKey) -> TrackerHandle {
        let mut sessions = self.shared.lock();
        if let Some(handle) = sessions.by_key.get(key) {
            return handle.clone();
        }

        sessions.next_serial += 1;
        let serial = sessions.next_serial;
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(SessionControl::new());
        let handle = TrackerHandle {
            key: key.clone(),
            serial,
            mailbox: tx,
            control: Arc::clone(&control),
        };
        sessions.by_key.insert(key.clone(), handle.clone());

        let tracker = SessionTracker::new(Arc::clone(&self.shared), key.clone(), serial, control, rx);
        self.shared.tasks.spawn(tracker.run());
        tracing::debug!(session = %key, serial, "spawned tracker");
        handle
    }

    /// Routes an event to its session's tracker. Returns whether it was queued.
    pub fn dispatch(&self, event: PlaybackEvent) -> bool {
        if self.shared.cancel.is_cancelled() {
            tracing::debug!(session = %event.session_key, "shutting down, event dropped");
            return false;
        }
        let mut event = event;
        for attempt in 1..=DISPATCH_ATTEMPTS {
            let handle = self.ensure(&event.session_key);
            match handle.send(event) {
                Ok(()) => return true,
                Err(returned) => {
                    tracing::debug!(session = %returned.session_key, serial = handle.serial, attempt, "tracker closed, retrying");
                    event = returned;
                }
            }
        }
        tracing::warn!(session = %event.session_key, source = %event.source, "no tracker accepted event, dropped");
        false
    }
}

impl<R> Registry<R> {
    /// The handle for `key`, if a tracker is live.
    pub fn get(&self, key: &SessionKey) -> Option<TrackerHandle> {
        self.shared.lock().by_key.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().by_key.is_empty()
    }

    /// Copies of every live session's state, oldest first.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<_> = self
            .shared
            .lock()
            .by_key
            .values()
            .map(|handle| SessionSnapshot::capture(handle.serial, &handle.key, &handle.control))
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.serial);
        snapshots
    }

    /// Sets the start override of session `serial` to its current position.
    pub fn override_start(&self, serial: u64) -> Option<Offset> {
        let offset = self.shared.control_for(serial)?.override_start();
        tracing::info!(serial, start = %offset, "start overridden");
        Some(offset)
    }

    /// Returns `false` if no live session has `serial`.
    pub fn set_prefer(&self, serial: u64, prefer: bool) -> bool {
        self.shared
            .control_for(serial)
            .map(|control| control.set_prefer(prefer))
            .is_some()
    }

    /// Returns `false` if no live session has `serial`.
    pub fn set_autoprocess(&self, serial: u64, autoprocess: bool) -> bool {
        self.shared
            .control_for(serial)
            .map(|control| control.set_autoprocess(autoprocess))
            .is_some()
    }

    /// The token that stops every tracker. Child tokens make good poller tokens.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Stops every tracker and waits until each has written its watch log.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        tracing::info!("all trackers finished");
    }
}
