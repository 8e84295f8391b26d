//! Inspect command for showing what a watch log recorded.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use pt_core::{Offset, Region, WatchLog};
use pt_store::read_watch_log;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Report<'a> {
    filename: &'a str,
    note: &'a str,
    duration: Offset,
    tape_points: usize,
    skips: &'a [Region],
    consec: &'a [Region],
    chapter_candidates: Vec<Region>,
}

impl<'a> Report<'a> {
    fn new(log: &'a WatchLog) -> Self {
        Self {
            filename: &log.filename,
            note: log.note.as_str(),
            duration: log.known_duration,
            tape_points: log.tape.len(),
            skips: &log.skips,
            consec: &log.consec,
            chapter_candidates: log.chapter_candidates(),
        }
    }
}

/// Loads a watch log, failing if it does not exist.
pub fn load(path: &Path) -> Result<WatchLog> {
    read_watch_log(path)?.with_context(|| format!("no watch log at {}", path.display()))
}

pub fn run<W: Write>(writer: &mut W, path: &Path, json: bool) -> Result<()> {
    let log = load(path)?;
    let report = Report::new(&log);

    if json {
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "file: {}", report.filename)?;
    writeln!(
        writer,
        "note: {}",
        if report.note.is_empty() { "-" } else { report.note }
    )?;
    writeln!(writer, "duration: {}", report.duration)?;
    writeln!(writer, "tape: {} points", report.tape_points)?;
    if let Some(special) = &log.special {
        if let Some(start) = special.override_start {
            writeln!(writer, "start override: {start}")?;
        }
        if special.autoprocess {
            writeln!(writer, "autoprocess: yes")?;
        }
    }

    write_regions(writer, "skips", report.skips)?;
    write_regions(writer, "consecutive", report.consec)?;
    write_regions(writer, "chapter candidates", &report.chapter_candidates)?;
    Ok(())
}

fn write_regions<W: Write>(writer: &mut W, label: &str, regions: &[Region]) -> Result<()> {
    if regions.is_empty() {
        writeln!(writer, "{label}: none")?;
        return Ok(());
    }
    writeln!(writer, "{label}:")?;
    for region in regions {
        match region.point_count {
            Some(count) => writeln!(writer, "  {} {count} points", region.display_string())?,
            None => writeln!(writer, "  {}", region.display_string())?,
        }
    }
    Ok(())
}
