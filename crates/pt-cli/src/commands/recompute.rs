//! Recompute skip and consecutive regions of a stored watch log.
//!
//! The tape is the source of truth; regions are always derived from it, so
//! rewriting them is safe after the detector changes or a tape is edited by
//! hand.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use pt_store::write_watch_log;

use super::inspect::load;

pub fn run<W: Write>(writer: &mut W, path: &Path) -> Result<()> {
    let mut log = load(path)?;
    let before = (log.skips.len(), log.consec.len());
    log.recompute_regions();
    tracing::debug!(
        skips_before = before.0,
        consec_before = before.1,
        skips = log.skips.len(),
        consec = log.consec.len(),
        "recomputed regions"
    );

    write_watch_log(path, &log).with_context(|| format!("failed to write {}", path.display()))?;
    writeln!(
        writer,
        "{}: {} skip(s), {} consecutive region(s) from {} points",
        path.display(),
        log.skips.len(),
        log.consec.len(),
        log.tape.len()
    )?;
    Ok(())
}
