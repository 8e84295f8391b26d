//! Path command for locating a media file's watch log.

use std::io::Write;

use anyhow::Result;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, media: &str) -> Result<()> {
    let path = config.store().path_for(media)?;
    writeln!(writer, "{}", path.display())?;
    Ok(())
}
