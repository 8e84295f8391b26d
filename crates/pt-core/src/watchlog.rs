//! The watch log: the persisted per-file record of what was watched.
//!
//! A watch log accumulates the playback tape of every session that played a
//! given file. Each time a session ends, [`build`] merges the new observations
//! into the previous log (if any), applies the session's control settings and
//! recomputes the skip and consecutive regions from the full tape.
//!
//! ## On-disk format
//!
//! ```json
//! {
//!   "filename": "/media/show.mkv",
//!   "note": "noskip",
//!   "special": { "override-start": "00:00:42.000", "autoprocess": true },
//!   "knownDuration": "00:30:00.000",
//!   "tape": ["00:00:42.000//play", "00:00:45.000//poll"],
//!   "skips": [{ "begin": "00:01:00.000", "end": "00:03:00.000" }],
//!   "consec": [{ "begin": "00:00:42.000", "end": "00:01:00.000", "point-count": 7 }]
//! }
//! ```
//!
//! Capitalized `Tape`/`Skips`/`Consec` keys and `null` lists are accepted when
//! loading logs written by older tooling.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::detect::{Region, detect_regions, filter_consec};
use crate::timescale::Offset;

/// Fewer total tape points than this and the session is not worth keeping.
pub const MIN_TAPE_POINTS: usize = 5;

/// Stopping more than this many seconds before the end marks the log partial.
pub const PARTIAL_THRESHOLD: f64 = 150.0;

/// Stopping less than this many seconds before the end counts as finished.
pub const COMPLETE_THRESHOLD: f64 = 10.0;

/// Tape annotation for the synthetic end-of-file point.
pub const NIL_STOP_INFO: &str = "nilstop";

/// Summary classification of a watch log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Note {
    /// No classification.
    #[default]
    #[serde(rename = "")]
    Unmarked,
    /// Freshly created log.
    Unknown,
    /// Playback stopped well before the end.
    Partial,
    /// No skips were detected.
    #[serde(rename = "noskip")]
    NoSkip,
    /// The user asked for this log to be preferred over other chapter sources.
    Prefer,
}

impl Note {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unmarked => "",
            Self::Unknown => "unknown",
            Self::Partial => "partial",
            Self::NoSkip => "noskip",
            Self::Prefer => "prefer",
        }
    }

    #[must_use]
    pub const fn is_unmarked(&self) -> bool {
        matches!(self, Self::Unmarked)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User overrides recorded alongside the tape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Special {
    /// Everything before this offset is treated as not part of the content.
    #[serde(
        rename = "override-start",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub override_start: Option<Offset>,
    /// Downstream processing may run without confirmation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub autoprocess: bool,
}

/// One recorded playback position.
#[derive(Debug, Clone, PartialEq)]
pub struct TapePoint {
    pub offset: Offset,
    /// When the position was observed. Not persisted.
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form annotation, usually the event source.
    pub info: Option<String>,
}

impl TapePoint {
    pub fn new(offset: Offset, timestamp: Option<DateTime<Utc>>, info: Option<String>) -> Self {
        Self {
            offset,
            timestamp,
            info,
        }
    }
}

impl Serialize for TapePoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.info.as_deref() {
            Some(info) if !info.is_empty() => {
                serializer.serialize_str(&format!("{}//{info}", self.offset))
            }
            _ => serializer.serialize_str(&self.offset.to_timestamp()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TapePointRepr {
    Text(String),
    Seconds(f64),
}

impl<'de> Deserialize<'de> for TapePoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match TapePointRepr::deserialize(deserializer)? {
            TapePointRepr::Text(text) => {
                let (stamp, info) = match text.split_once("//") {
                    Some((stamp, info)) => (stamp, Some(info.to_string())),
                    None => (text.as_str(), None),
                };
                let offset = stamp.parse().map_err(serde::de::Error::custom)?;
                Ok(Self::new(offset, None, info))
            }
            TapePointRepr::Seconds(seconds) => Ok(Self::new(Offset::from_secs(seconds), None, None)),
        }
    }
}

/// Per-session settings shared between a tracker and the control surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub prefer: bool,
    pub start_override: Offset,
    pub current_position: Offset,
    pub autoprocess: bool,
}

/// The persisted record for one media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchLog {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Note::is_unmarked")]
    pub note: Note,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<Special>,
    #[serde(rename = "knownDuration", default)]
    pub known_duration: Offset,
    #[serde(rename = "knownSize", default, skip_serializing_if = "Option::is_none")]
    pub known_size: Option<i64>,
    #[serde(
        rename = "knownModTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub known_mod_time: Option<String>,
    #[serde(default, alias = "Tape", deserialize_with = "null_as_empty")]
    pub tape: Vec<TapePoint>,
    #[serde(default, alias = "Skips", deserialize_with = "null_as_empty")]
    pub skips: Vec<Region>,
    #[serde(default, alias = "Consec", deserialize_with = "null_as_empty")]
    pub consec: Vec<Region>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl WatchLog {
    /// Creates an empty log for a file that has never been watched.
    pub fn fresh() -> Self {
        Self {
            note: Note::Unknown,
            ..Self::default()
        }
    }

    /// Returns the special record, creating it if needed.
    pub fn special_mut(&mut self) -> &mut Special {
        self.special.get_or_insert_with(Special::default)
    }

    /// The tape as bare offsets.
    pub fn offsets(&self) -> Vec<Offset> {
        self.tape.iter().map(|p| p.offset).collect()
    }

    /// Re-derives skip and consecutive regions from the tape.
    pub fn recompute_regions(&mut self) {
        let regions = detect_regions(&self.offsets());
        self.skips = regions.skips;
        self.consec = regions.consec;
    }

    /// Consecutive regions reliable enough to be used as chapters.
    pub fn chapter_candidates(&self) -> Vec<Region> {
        filter_consec(&self.consec)
    }
}

/// Everything a finished session contributes to its file's watch log.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub filename: String,
    pub known_duration: Offset,
    /// Points recorded during the session, in order.
    pub points: Vec<TapePoint>,
    /// Control settings as they stood when the session ended.
    pub control: ControlState,
    /// The session ended with a stop event that carried no offset.
    pub nil_stop: bool,
}

/// Merges a finished session into the file's previous watch log.
///
/// Returns `None` when the combined tape is too short to be worth keeping.
pub fn build(prior: Option<WatchLog>, session: SessionSummary) -> Option<WatchLog> {
    let SessionSummary {
        filename,
        known_duration,
        points,
        mut control,
        nil_stop,
    } = session;

    let mut log = match prior {
        None => WatchLog::fresh(),
        Some(mut prior) => {
            match prior.note {
                Note::Prefer => control.prefer = true,
                Note::Partial => prior.note = Note::Unmarked,
                _ => {}
            }
            prior
        }
    };
    log.filename = filename;
    log.known_duration = known_duration;

    let start = control.start_override;
    if start > Offset::ZERO {
        log.special_mut().override_start = Some(start);
        for (idx, point) in log.tape.iter_mut().enumerate() {
            if point.offset < start {
                tracing::warn!(
                    position = idx,
                    from = %point.offset,
                    to = %start,
                    "overriding start in restored tape"
                );
                point.offset = start;
            }
        }
    }
    if control.autoprocess {
        log.special_mut().autoprocess = true;
    }

    for mut point in points {
        if point.offset < start {
            tracing::warn!(from = %point.offset, to = %start, "overriding start");
            point.offset = start;
        }
        log.tape.push(point);
    }

    if log.tape.len() < MIN_TAPE_POINTS {
        tracing::debug!(points = log.tape.len(), file = %log.filename, "tape too short, discarding");
        return None;
    }
    let last = log.tape.last()?.offset;

    let remaining = known_duration.seconds() - last.seconds();
    if remaining > PARTIAL_THRESHOLD {
        tracing::warn!(file = %log.filename, remaining, "did not watch full duration, marking partial");
        log.note = Note::Partial;
    } else if remaining < COMPLETE_THRESHOLD && nil_stop {
        tracing::warn!(file = %log.filename, end = %known_duration, "adding nilstop point");
        log.tape.push(TapePoint::new(
            known_duration,
            None,
            Some(NIL_STOP_INFO.to_string()),
        ));
    }

    log.recompute_regions();

    if log.skips.is_empty() {
        log.note = Note::NoSkip;
    }
    for (idx, skip) in log.skips.iter().enumerate() {
        tracing::info!(idx, region = %skip.display_string(), "skip");
    }
    for (idx, region) in log.consec.iter().enumerate() {
        tracing::info!(idx, region = %region.display_string(), "consecutive");
    }

    if control.prefer {
        log.note = Note::Prefer;
    }

    Some(log)
}
