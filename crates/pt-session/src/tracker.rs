//! The per-session tracker task.
//!
//! Each live session key gets one [`SessionTracker`] running as its own tokio
//! task. It resolves the media once, loads the file's previous watch log,
//! then feeds mailbox events and liveness ticks into a [`TapeRecorder`] until
//! the session goes quiet, the mailbox closes, or the process shuts down.
//! On the way out it deregisters, drains what was already queued and writes
//! the merged watch log. Dropping a tracker that never got that far (its
//! task panicked) still deregisters it.

use std::sync::Arc;
use std::time::Duration;

use pt_core::{Note, Offset, PlaybackEvent, SessionKey, SessionSummary, WatchLog};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::control::SessionControl;
use crate::recorder::{DEFAULT_IDLE_TICKS, Observation, TapeRecorder};
use crate::registry::Shared;
use crate::resolver::{MediaDescription, MediaResolver};

/// Timing of the liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Period of the liveness tick.
    pub tick: Duration,
    /// Ticks without an offset-bearing event before the session ends.
    pub idle_ticks: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            idle_ticks: DEFAULT_IDLE_TICKS,
        }
    }
}

/// Why the watch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Idle,
    Closed,
    Cancelled,
}

/// One pass of the watch loop.
enum Step {
    Event(PlaybackEvent),
    Tick,
    Exit(Exit),
}

/// What the tracker learned before watching.
struct History {
    media: MediaDescription,
    prior: Option<WatchLog>,
}

pub(crate) struct SessionTracker<R: MediaResolver> {
    key: SessionKey,
    serial: u64,
    control: Arc<SessionControl>,
    mailbox: mpsc::UnboundedReceiver<PlaybackEvent>,
    shared: Arc<Shared<R>>,
    recorder: Option<TapeRecorder>,
}

impl<R: MediaResolver> SessionTracker<R> {
    pub(crate) fn new(
        shared: Arc<Shared<R>>,
        key: SessionKey,
        serial: u64,
        control: Arc<SessionControl>,
        mailbox: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> Self {
        let recorder = TapeRecorder::new(shared.config.idle_ticks);
        Self {
            key,
            serial,
            control,
            mailbox,
            shared,
            recorder: Some(recorder),
        }
    }

    pub(crate) async fn run(self) {
        let span = tracing::info_span!("session", session = %self.key, serial = self.serial);
        self.watch().instrument(span).await;
    }

    async fn watch(mut self) {
        tracing::info!("tracker started");
        let Some(history) = self.start().await else {
            self.abandon();
            return;
        };

        let cancel = self.shared.cancel.clone();
        let period = self.shared.config.tick;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Exit(Exit::Cancelled),
                _ = ticker.tick() => Step::Tick,
                event = self.mailbox.recv() => event.map_or(Step::Exit(Exit::Closed), Step::Event),
            };
            match step {
                Step::Event(event) => self.apply(&event),
                Step::Tick => {
                    let idle = self.recorder.as_mut().is_some_and(TapeRecorder::tick);
                    if idle {
                        break Exit::Idle;
                    }
                }
                Step::Exit(exit) => break exit,
            }
        };

        tracing::info!(?exit, "tracker stopping");
        self.terminate(history);
    }

    /// Resolves the media and loads its previous watch log.
    async fn start(&mut self) -> Option<History> {
        // Not raced against cancellation: events queued before shutdown still
        // need the media to be written out.
        let media = match self.shared.resolver.describe(&self.key).await {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!(error = %e, "cannot resolve media, abandoning session");
                return None;
            }
        };
        tracing::info!(file = %media.file, duration = %media.duration(), "resolved media");
        self.control.set_file(media.file.clone());

        let prior = match self.shared.store.load(&media.file) {
            Ok(prior) => prior,
            Err(e) => {
                tracing::warn!(file = %media.file, error = %e, "cannot read previous watch log, abandoning session");
                return None;
            }
        };
        if prior.as_ref().is_some_and(|log| log.note == Note::Prefer) {
            self.control.set_prefer(true);
        }
        Some(History { media, prior })
    }

    fn apply(&mut self, event: &PlaybackEvent) {
        if let Some(recorder) = self.recorder.as_mut() {
            observe(recorder, &self.control, event);
        }
    }

    /// Leaves the registry and stops accepting events.
    ///
    /// Returns the recorder with every event that was queued before the
    /// mailbox closed applied, or `None` if this already happened.
    fn retire(&mut self) -> Option<TapeRecorder> {
        let mut recorder = self.recorder.take()?;
        self.shared.remove(&self.key, self.serial);
        self.mailbox.close();
        let mut drained = 0_usize;
        while let Ok(event) = self.mailbox.try_recv() {
            observe(&mut recorder, &self.control, &event);
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "applied queued events");
        }
        Some(recorder)
    }

    fn abandon(&mut self) {
        if let Some(recorder) = self.retire() {
            tracing::info!(points = recorder.positions().len(), "session abandoned without a watch log");
        }
    }

    fn terminate(&mut self, history: History) {
        let Some(recorder) = self.retire() else {
            return;
        };
        let History { media, prior } = history;
        let summary = SessionSummary {
            filename: media.file.clone(),
            known_duration: media.duration(),
            points: recorder.tape(),
            control: self.control.snapshot(),
            nil_stop: recorder.nil_stop(),
        };

        let Some(log) = pt_core::build(prior, summary) else {
            tracing::info!(file = %media.file, "too few points, no watch log written");
            return;
        };
        match self.shared.store.save(&media.file, &log) {
            Ok(path) => tracing::info!(
                path = %path.display(),
                note = %log.note,
                points = log.tape.len(),
                skips = log.skips.len(),
                "watch log written"
            ),
            Err(e) => tracing::warn!(file = %media.file, error = %e, "failed to write watch log"),
        }
    }
}

impl<R: MediaResolver> Drop for SessionTracker<R> {
    fn drop(&mut self) {
        // Normal exits have already retired; this catches a panicking task.
        if self.shared.remove(&self.key, self.serial) {
            tracing::warn!(session = %self.key, serial = self.serial, "tracker ended without retiring");
        }
    }
}

fn observe(recorder: &mut TapeRecorder, control: &SessionControl, event: &PlaybackEvent) {
    let observation = recorder.observe(event);
    tracing::trace!(source = %event.source, offset = ?event.offset_ms, ?observation, "event");
    if observation == Observation::Recorded {
        if let Some(offset) = event.offset_ms {
            control.set_current_position(Offset::from_millis(offset));
        }
    }
}
