//! Event filtering and liveness counting for a single session.
//!
//! [`TapeRecorder`] is the synchronous heart of a session tracker. It decides
//! which events become tape points and keeps the stop counter that ends a
//! session nobody reports on any more. The tracker task feeds it events and
//! liveness ticks one at a time.

use chrono::{DateTime, Utc};
use pt_core::{Offset, PlaybackEvent, SourceKind, TapePoint};

/// Ticks (or tick-equivalents) without an offset-bearing event before a session ends.
pub const DEFAULT_IDLE_TICKS: u32 = 7;

/// A stop event counts as this many ticks.
pub const STOP_TICK_WEIGHT: u32 = 3;

/// A zero offset after a position beyond this (ms) is a known reporting quirk.
pub const SPURIOUS_ZERO_AFTER_MS: u64 = 13_000;

/// What happened to an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Appended to the tape.
    Recorded,
    /// Same offset as the last recorded point.
    Duplicate,
    /// The event carried no offset.
    NoOffset,
    /// A zero offset that does not fit the tape so far.
    SpuriousZero,
}

/// A position accepted onto the tape, still in server units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPosition {
    pub offset_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub source: SourceKind,
}

impl RecordedPosition {
    fn to_tape_point(&self) -> TapePoint {
        TapePoint::new(
            Offset::from_millis(self.offset_ms),
            Some(self.timestamp),
            Some(self.source.as_str().to_string()),
        )
    }
}

/// Accumulates a session's tape.
#[derive(Debug)]
pub struct TapeRecorder {
    positions: Vec<RecordedPosition>,
    stop_counter: u32,
    idle_limit: u32,
    nil_stop: bool,
}

impl Default for TapeRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TICKS)
    }
}

impl TapeRecorder {
    pub const fn new(idle_limit: u32) -> Self {
        Self {
            positions: Vec::new(),
            stop_counter: 0,
            idle_limit,
            nil_stop: false,
        }
    }

    /// Counts one liveness tick. Returns `true` once the session should end.
    pub fn tick(&mut self) -> bool {
        self.stop_counter = self.stop_counter.saturating_add(1);
        self.stop_counter >= self.idle_limit
    }

    /// Applies one event to the tape.
    pub fn observe(&mut self, event: &PlaybackEvent) -> Observation {
        if event.source == SourceKind::Stop {
            self.stop_counter = self.stop_counter.saturating_add(STOP_TICK_WEIGHT);
            if event.offset_ms.is_none() {
                self.nil_stop = true;
            }
            tracing::debug!(stop_counter = self.stop_counter, "stop received");
        } else if self.stop_counter > 0 && event.offset_ms.is_some() {
            self.stop_counter = 0;
        }

        let Some(offset) = event.offset_ms else {
            tracing::info!(source = %event.source, "event without offset");
            return Observation::NoOffset;
        };

        let last = self.last_offset_ms();
        if offset == 0
            && last.is_some_and(|last| last > SPURIOUS_ZERO_AFTER_MS)
            && !matches!(event.source, SourceKind::Stop | SourceKind::Play)
        {
            tracing::warn!(source = %event.source, last_ms = ?last, "unexplained zero offset");
            return Observation::SpuriousZero;
        }

        if last == Some(offset) {
            return Observation::Duplicate;
        }

        self.positions.push(RecordedPosition {
            offset_ms: offset,
            timestamp: event.timestamp,
            source: event.source,
        });
        Observation::Recorded
    }

    /// The most recently recorded offset, in milliseconds.
    pub fn last_offset_ms(&self) -> Option<u64> {
        self.positions.last().map(|p| p.offset_ms)
    }

    pub const fn stop_counter(&self) -> u32 {
        self.stop_counter
    }

    /// Whether a stop without an offset was seen.
    pub const fn nil_stop(&self) -> bool {
        self.nil_stop
    }

    pub fn positions(&self) -> &[RecordedPosition] {
        &self.positions
    }

    /// The recorded tape in watch log form.
    pub fn tape(&self) -> Vec<TapePoint> {
        self.positions
            .iter()
            .map(RecordedPosition::to_tape_point)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pt_core::SessionKey;

    fn event(offset_ms: Option<u64>, source: SourceKind) -> PlaybackEvent {
        PlaybackEvent::new(
            SessionKey::new("/library/metadata/1").unwrap(),
            offset_ms,
            Utc::now(),
            source,
        )
    }

    fn offsets(recorder: &TapeRecorder) -> Vec<u64> {
        recorder.positions().iter().map(|p| p.offset_ms).collect()
    }

    #[test]
    fn seven_ticks_end_the_session() {
        let mut recorder = TapeRecorder::default();
        for _ in 0..6 {
            assert!(!recorder.tick());
        }
        assert!(recorder.tick());
    }

    #[test]
    fn offset_event_resets_stop_counter() {
        let mut recorder = TapeRecorder::default();
        for _ in 0..6 {
            recorder.tick();
        }
        recorder.observe(&event(Some(1000), SourceKind::Poll));
        assert_eq!(recorder.stop_counter(), 0);
        assert!(!recorder.tick());
    }

    #[test]
    fn offsetless_event_does_not_reset_stop_counter() {
        let mut recorder = TapeRecorder::default();
        recorder.tick();
        recorder.tick();
        assert_eq!(
            recorder.observe(&event(None, SourceKind::Pause)),
            Observation::NoOffset
        );
        assert_eq!(recorder.stop_counter(), 2);
        assert!(recorder.positions().is_empty());
    }

    #[test]
    fn stop_weighs_three_ticks() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(5000), SourceKind::Stop));
        assert_eq!(recorder.stop_counter(), 3);
        assert!(!recorder.nil_stop());
        // Stop with an offset is still recorded but does not reset the counter.
        assert_eq!(offsets(&recorder), vec![5000]);

        for _ in 0..3 {
            assert!(!recorder.tick());
        }
        assert!(recorder.tick());
    }

    #[test]
    fn stop_without_offset_sets_nil_stop() {
        let mut recorder = TapeRecorder::default();
        assert_eq!(
            recorder.observe(&event(None, SourceKind::Stop)),
            Observation::NoOffset
        );
        assert!(recorder.nil_stop());
        assert_eq!(recorder.stop_counter(), 3);
    }

    #[test]
    fn spurious_zero_after_thirteen_seconds_is_dropped() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(13_001), SourceKind::Poll));
        assert_eq!(
            recorder.observe(&event(Some(0), SourceKind::Poll)),
            Observation::SpuriousZero
        );
        assert_eq!(
            recorder.observe(&event(Some(0), SourceKind::Pause)),
            Observation::SpuriousZero
        );
        assert_eq!(offsets(&recorder), vec![13_001]);
    }

    #[test]
    fn zero_from_play_or_stop_is_accepted() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(60_000), SourceKind::Poll));
        assert_eq!(
            recorder.observe(&event(Some(0), SourceKind::Play)),
            Observation::Recorded
        );

        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(60_000), SourceKind::Poll));
        assert_eq!(
            recorder.observe(&event(Some(0), SourceKind::Stop)),
            Observation::Recorded
        );
        assert_eq!(offsets(&recorder), vec![60_000, 0]);
    }

    #[test]
    fn zero_near_start_is_accepted() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(13_000), SourceKind::Poll));
        assert_eq!(
            recorder.observe(&event(Some(0), SourceKind::Poll)),
            Observation::Recorded
        );
    }

    #[test]
    fn duplicates_are_not_appended() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(1000), SourceKind::Poll));
        assert_eq!(
            recorder.observe(&event(Some(1000), SourceKind::Pause)),
            Observation::Duplicate
        );
        recorder.observe(&event(Some(2000), SourceKind::Poll));
        recorder.observe(&event(Some(1000), SourceKind::Poll));
        assert_eq!(offsets(&recorder), vec![1000, 2000, 1000]);
    }

    #[test]
    fn duplicate_still_resets_stop_counter() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(1000), SourceKind::Poll));
        recorder.tick();
        recorder.observe(&event(Some(1000), SourceKind::Poll));
        assert_eq!(recorder.stop_counter(), 0);
    }

    #[test]
    fn tape_is_annotated_with_source() {
        let mut recorder = TapeRecorder::default();
        recorder.observe(&event(Some(1500), SourceKind::Play));
        let tape = recorder.tape();
        assert_eq!(tape.len(), 1);
        assert_eq!(tape[0].offset, Offset::from_secs(1.5));
        assert_eq!(tape[0].info.as_deref(), Some("play"));
        assert!(tape[0].timestamp.is_some());
    }
}
