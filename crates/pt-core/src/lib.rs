//! Core domain logic for playback tape analysis.
//!
//! This crate contains the fundamental types and logic for:
//! - Offsets: the `HH:MM:SS.mmm` timestamps used throughout the watch log
//! - Events: the normalized shape every ingest path produces
//! - Detection: segmenting a tape into skip and consecutive regions
//! - Watch logs: merging a finished session into the persisted record

pub mod detect;
pub mod event;
pub mod timescale;
pub mod types;
pub mod watchlog;

pub use detect::{Region, Regions, detect_regions, filter_consec};
pub use event::{PlaybackEvent, SourceKind, UnknownSourceKind};
pub use timescale::{Offset, TimestampError};
pub use types::{SessionKey, ValidationError};
pub use watchlog::{ControlState, Note, SessionSummary, Special, TapePoint, WatchLog, build};
