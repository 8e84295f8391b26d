//! Control state shared between a tracker and the control surface.
//!
//! The tracker updates the current position as it records; the control
//! surface reads snapshots and flips individual settings. Both sides go
//! through the same lock, and readers only ever receive copies.

use std::sync::{Mutex, OnceLock, PoisonError};

use pt_core::{ControlState, Offset, SessionKey};

/// Lock-guarded control state for one session.
#[derive(Debug, Default)]
pub struct SessionControl {
    state: Mutex<ControlState>,
    file: OnceLock<String>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_lock<T>(&self, f: impl FnOnce(&mut ControlState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> ControlState {
        self.with_lock(|state| *state)
    }

    pub fn set_prefer(&self, prefer: bool) {
        self.with_lock(|state| state.prefer = prefer);
    }

    pub fn set_autoprocess(&self, autoprocess: bool) {
        self.with_lock(|state| state.autoprocess = autoprocess);
    }

    pub fn set_current_position(&self, position: Offset) {
        self.with_lock(|state| state.current_position = position);
    }

    /// Moves the start override to the current position and returns it.
    pub fn override_start(&self) -> Offset {
        self.with_lock(|state| {
            state.start_override = state.current_position;
            state.start_override
        })
    }

    /// The media file, once the tracker has resolved it.
    pub fn file(&self) -> Option<&str> {
        self.file.get().map(String::as_str)
    }

    pub(crate) fn set_file(&self, file: String) {
        if let Err(file) = self.file.set(file) {
            tracing::debug!(%file, "media file already set, kept the first");
        }
    }
}

/// What the control surface sees of one live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub serial: u64,
    pub key: SessionKey,
    pub file: Option<String>,
    pub current_position: Offset,
    pub start_override: Offset,
    pub prefer: bool,
    pub autoprocess: bool,
}

impl SessionSnapshot {
    pub(crate) fn capture(serial: u64, key: &SessionKey, control: &SessionControl) -> Self {
        let state = control.snapshot();
        Self {
            serial,
            key: key.clone(),
            file: control.file().map(str::to_string),
            current_position: state.current_position,
            start_override: state.start_override,
            prefer: state.prefer,
            autoprocess: state.autoprocess,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn override_start_uses_current_position() {
        let control = SessionControl::new();
        control.set_current_position(Offset::from_secs(42.5));
        assert_eq!(control.override_start(), Offset::from_secs(42.5));

        control.set_current_position(Offset::from_secs(100.0));
        let state = control.snapshot();
        assert_eq!(state.start_override, Offset::from_secs(42.5));
        assert_eq!(state.current_position, Offset::from_secs(100.0));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let control = SessionControl::new();
        let before = control.snapshot();
        control.set_prefer(true);
        control.set_autoprocess(true);
        assert!(!before.prefer);
        assert!(!before.autoprocess);
        let after = control.snapshot();
        assert!(after.prefer);
        assert!(after.autoprocess);
    }

    #[test]
    fn file_is_set_once() {
        let control = SessionControl::new();
        assert_eq!(control.file(), None);
        control.set_file("/media/a.mkv".to_string());
        control.set_file("/media/b.mkv".to_string());
        assert_eq!(control.file(), Some("/media/a.mkv"));
    }

    #[test]
    fn concurrent_writers_do_not_clobber_other_fields() {
        let control = Arc::new(SessionControl::new());
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let control = Arc::clone(&control);
                std::thread::spawn(move || {
                    for step in 0..1000u32 {
                        if i % 2 == 0 {
                            control.set_current_position(Offset::from_secs(f64::from(step)));
                        } else {
                            control.set_prefer(true);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let state = control.snapshot();
        assert!(state.prefer);
        assert_eq!(state.current_position, Offset::from_secs(999.0));
    }
}
