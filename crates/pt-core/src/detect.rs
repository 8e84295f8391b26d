//! Skip and consecutive-region detection over a playback tape.
//!
//! # Algorithm Summary
//!
//! A single forward pass over the recorded offsets, looking at the step
//! between each pair of neighbours:
//!
//! 1. A forward step above [`SKIP_THRESHOLD`] is a skip. It closes the open
//!    consecutive region and opens (or extends) a skip region.
//! 2. A positive step up to the threshold is continuous viewing and opens or
//!    extends the consecutive region.
//! 3. A backward step beyond [`REWIND_THRESHOLD`] is a real rewind. It pulls
//!    the open skip region's end back, and restarts the open consecutive
//!    region at the new offset unless that offset lies inside a consecutive
//!    region that was already closed.
//! 4. Zero steps and small backward jitter change nothing.
//!
//! At most one skip region and one consecutive region are open at a time.

use serde::{Deserialize, Serialize};

use crate::timescale::Offset;

/// Forward steps strictly larger than this (seconds) are skips.
pub const SKIP_THRESHOLD: f64 = 12.0;

/// Backward steps strictly smaller than this (seconds) are rewinds.
pub const REWIND_THRESHOLD: f64 = -4.0;

/// Minimum point count for a consecutive region to count as a chapter candidate.
pub const MIN_CHAPTER_POINTS: u32 = 5;

/// Minimum span (seconds) for a consecutive region to count as a chapter candidate.
pub const MIN_CHAPTER_SPAN: f64 = 15.0;

/// A span of the media file.
///
/// Skip regions and consecutive regions share this shape; which list a region
/// lives in decides what it means. Only consecutive regions carry a point count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(alias = "Begin")]
    pub begin: Offset,
    #[serde(alias = "End")]
    pub end: Offset,
    /// Number of forward steps that extended this region.
    #[serde(
        rename = "point-count",
        alias = "PointCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub point_count: Option<u32>,
}

impl Region {
    /// Creates a region without a point count.
    #[must_use]
    pub const fn new(begin: Offset, end: Offset) -> Self {
        Self {
            begin,
            end,
            point_count: None,
        }
    }

    /// Length of the region in seconds.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.end.seconds() - self.begin.seconds()
    }

    /// Whether `offset` lies within the region, bounds included.
    #[must_use]
    pub fn contains(&self, offset: Offset) -> bool {
        self.begin <= offset && offset <= self.end
    }

    /// Renders the region as `[begin=>end]`.
    #[must_use]
    pub fn display_string(&self) -> String {
        format!("[{}=>{}]", self.begin, self.end)
    }
}

/// Output of [`detect_regions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Regions {
    /// Skip regions, in the order they were opened.
    pub skips: Vec<Region>,
    /// Consecutive regions, in the order they were opened.
    pub consec: Vec<Region>,
}

/// Segments a tape of offsets into skip and consecutive regions.
///
/// Never fails: empty and single-point tapes produce empty lists.
pub fn detect_regions(tape: &[Offset]) -> Regions {
    let mut skips: Vec<Region> = Vec::new();
    let mut consec: Vec<Region> = Vec::new();
    let mut open_skip: Option<usize> = None;
    let mut open_consec: Option<usize> = None;

    for pair in tape.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        let step = current.seconds() - previous.seconds();

        if step > SKIP_THRESHOLD {
            open_consec = None;
            match open_skip {
                Some(idx) if skips[idx].end >= previous => skips[idx].end = current,
                _ => {
                    skips.push(Region::new(previous, current));
                    open_skip = Some(skips.len() - 1);
                }
            }
        } else if step > 0.0 {
            if let Some(idx) = open_consec {
                let region = &mut consec[idx];
                region.end = current;
                region.point_count = Some(region.point_count.unwrap_or(0) + 1);
            } else {
                consec.push(Region {
                    begin: previous,
                    end: current,
                    point_count: Some(1),
                });
                open_consec = Some(consec.len() - 1);
            }
        } else if step < REWIND_THRESHOLD {
            if let Some(idx) = open_skip {
                if skips[idx].end > current {
                    skips[idx].end = current;
                }
            }
            if let Some(idx) = open_consec {
                let already_counted = consec[..idx].iter().any(|r| r.contains(current));
                if consec[idx].begin > current && !already_counted {
                    consec[idx] = Region {
                        begin: current,
                        end: current,
                        point_count: Some(0),
                    };
                }
            }
        }
    }

    tracing::trace!(
        points = tape.len(),
        skips = skips.len(),
        consec = consec.len(),
        "detected regions"
    );
    Regions { skips, consec }
}

/// Keeps only consecutive regions that are reliable enough to mark chapters.
///
/// When any region carries a point count, regions with fewer than
/// [`MIN_CHAPTER_POINTS`] are dropped. Regions shorter than
/// [`MIN_CHAPTER_SPAN`] are always dropped.
pub fn filter_consec(regions: &[Region]) -> Vec<Region> {
    let has_point_count = regions
        .iter()
        .any(|r| r.point_count.is_some_and(|count| count > 0));

    regions
        .iter()
        .filter(|r| !has_point_count || r.point_count.unwrap_or(0) >= MIN_CHAPTER_POINTS)
        .filter(|r| r.span() >= MIN_CHAPTER_SPAN)
        .copied()
        .collect()
}
