//! Playback offsets and their `HH:MM:SS.mmm` text form.
//!
//! Offsets are stored as floating point seconds. The text form is the one used
//! by the watch log and by the chapter tooling downstream of it: zero padded
//! hours, minutes and seconds with exactly three millisecond digits. Hours are
//! not capped at two digits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing an `HH:MM:SS.mmm` timestamp.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The input did not have exactly three `:`-separated fields.
    #[error("malformed timestamp {input:?}: expected HH:MM:SS.mmm")]
    Malformed { input: String },
    /// One of the fields was not a valid number.
    #[error("invalid {field} in timestamp {input:?}")]
    InvalidField { input: String, field: &'static str },
}

/// A position within a media file, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Offset(f64);

impl Offset {
    /// The start of the file.
    pub const ZERO: Self = Self(0.0);

    /// Creates an offset from floating point seconds.
    #[must_use]
    pub const fn from_secs(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Creates an offset from the integer milliseconds reported by the media server.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "playback offsets are far below 2^52 ms"
    )]
    pub fn from_millis(millis: u64) -> Self {
        Self(millis as f64 / 1000.0)
    }

    /// Returns the offset in seconds.
    #[must_use]
    pub const fn seconds(self) -> f64 {
        self.0
    }

    /// Formats the offset as `HH:MM:SS.mmm`.
    ///
    /// The value is rounded to whole milliseconds before it is split into
    /// fields, so `59.9996` becomes `00:01:00.000`. Negative and non-finite
    /// values format as zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is checked to be finite and positive before the cast"
    )]
    pub fn to_timestamp(self) -> String {
        let total_ms = if self.0.is_finite() && self.0 > 0.0 {
            (self.0 * 1000.0).round() as u64
        } else {
            0
        };
        let millis = total_ms % 1000;
        let total_secs = total_ms / 1000;
        let secs = total_secs % 60;
        let minutes = (total_secs / 60) % 60;
        let hours = total_secs / 3600;
        format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
    }

    /// Parses an `HH:MM:SS.mmm` timestamp.
    ///
    /// The seconds field may carry any number of fractional digits.
    #[expect(
        clippy::cast_precision_loss,
        reason = "hour and minute counts are small"
    )]
    pub fn parse_timestamp(input: &str) -> Result<Self, TimestampError> {
        let mut fields = input.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(TimestampError::Malformed {
                input: input.to_string(),
            });
        };

        let invalid = |field| TimestampError::InvalidField {
            input: input.to_string(),
            field,
        };
        let hours: u64 = hours.parse().map_err(|_| invalid("hours"))?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid("minutes"))?;
        let seconds: f64 = seconds.parse().map_err(|_| invalid("seconds"))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(invalid("seconds"));
        }

        Ok(Self(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds))
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_timestamp())
    }
}

impl FromStr for Offset {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_timestamp(s)
    }
}

impl From<f64> for Offset {
    fn from(seconds: f64) -> Self {
        Self(seconds)
    }
}

impl Serialize for Offset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_timestamp())
    }
}

/// Accepted on-disk representations: the text form, or plain seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum OffsetRepr {
    Text(String),
    Seconds(f64),
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match OffsetRepr::deserialize(deserializer)? {
            OffsetRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            OffsetRepr::Seconds(seconds) => Ok(Self(seconds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn formats_known_values() {
        let cases = [
            (5.77, "00:00:05.770"),
            (65.433, "00:01:05.433"),
            (3990.5, "01:06:30.500"),
            (0.0, "00:00:00.000"),
            (59.9996, "00:01:00.000"),
            (360_000.0, "100:00:00.000"),
        ];
        for (seconds, expected) in cases {
            assert_eq!(Offset::from_secs(seconds).to_timestamp(), expected);
        }
    }

    #[test]
    fn negative_and_nan_format_as_zero() {
        assert_eq!(Offset::from_secs(-3.0).to_timestamp(), "00:00:00.000");
        assert_eq!(Offset::from_secs(f64::NAN).to_timestamp(), "00:00:00.000");
    }

    #[test]
    fn parse_then_format_is_identity_for_formatter_output() {
        for text in [
            "00:00:05.770",
            "00:01:05.433",
            "01:06:30.500",
            "00:59:59.999",
            "12:34:56.001",
        ] {
            let parsed = Offset::parse_timestamp(text).unwrap();
            assert_eq!(parsed.to_timestamp(), text);
        }
    }

    proptest! {
        #[test]
        fn format_then_parse_is_within_a_millisecond(seconds in 0.0..360_000.0_f64) {
            let text = Offset::from_secs(seconds).to_timestamp();
            let back = Offset::parse_timestamp(&text).unwrap();
            prop_assert!(
                (back.seconds() - seconds).abs() < 0.001,
                "{} -> {} -> {}",
                seconds,
                text,
                back.seconds()
            );
        }
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(matches!(
            Offset::parse_timestamp("05.770"),
            Err(TimestampError::Malformed { .. })
        ));
        assert!(matches!(
            Offset::parse_timestamp("00:00:00:01.0"),
            Err(TimestampError::Malformed { .. })
        ));
        assert!(matches!(
            Offset::parse_timestamp("aa:00:01.0"),
            Err(TimestampError::InvalidField { field: "hours", .. })
        ));
        assert!(matches!(
            Offset::parse_timestamp("00:00:x"),
            Err(TimestampError::InvalidField {
                field: "seconds",
                ..
            })
        ));
    }

    #[test]
    fn from_millis_converts_to_seconds() {
        assert!((Offset::from_millis(13_500).seconds() - 13.5).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_uses_text_form_and_accepts_numbers() {
        let json = serde_json::to_string(&Offset::from_secs(65.433)).unwrap();
        assert_eq!(json, "\"00:01:05.433\"");

        let from_text: Offset = serde_json::from_str("\"01:06:30.500\"").unwrap();
        assert!((from_text.seconds() - 3990.5).abs() < 1e-9);

        let from_number: Offset = serde_json::from_str("12.25").unwrap();
        assert!((from_number.seconds() - 12.25).abs() < f64::EPSILON);

        assert!(serde_json::from_str::<Offset>("\"nope\"").is_err());
    }
}
