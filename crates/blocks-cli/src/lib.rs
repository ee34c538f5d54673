//! Command-line inspector for block builder snapshots.

pub mod commands;
pub mod logging;
pub mod render;
