//! CLI subcommand implementations.

pub mod inspect;
pub mod path;
pub mod recompute;
pub mod serve;
