//! Live playback session tracking.
//!
//! - [`Registry`]: maps session keys to running trackers and exposes the
//!   control surface
//! - [`TapeRecorder`]: decides which events become tape points and when a
//!   session has gone quiet
//! - [`SessionControl`]: per-session settings shared with the control surface
//! - [`MediaResolver`]: how a tracker learns which file it is recording

pub mod control;
pub mod recorder;
pub mod registry;
pub mod resolver;
pub mod tracker;

pub use control::{SessionControl, SessionSnapshot};
pub use recorder::{Observation, RecordedPosition, TapeRecorder};
pub use registry::{Registry, TrackerHandle};
pub use resolver::{MediaDescription, MediaResolver, ResolveError};
pub use tracker::TrackerConfig;
