//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "block-builder",
    version,
    about = "Inspect, check and rewind block builder state snapshots",
    long_about = "Inspect, check and rewind block builder state snapshots.\n\n\
                  A snapshot is the JSON produced by exporting a state store: \
                  every component record plus the undo history and its cursor."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the component tree.
    Inspect(InspectArgs),

    /// Check parent/child consistency; exits with 1 when errors are found.
    Check(SnapshotArg),

    /// List history entries and the undo cursor.
    History(SnapshotArg),

    /// Undo the last N steps and emit the resulting snapshot.
    Rewind(RewindArgs),
}

#[derive(Parser)]
pub struct SnapshotArg {
    /// Path to a snapshot JSON file.
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,
}

#[derive(Parser)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: SnapshotArg,

    /// Print the tree as JSON.
    #[arg(long = "json", conflicts_with = "outline")]
    pub json: bool,

    /// Print a plain indented outline instead of a table.
    #[arg(long = "outline")]
    pub outline: bool,
}

#[derive(Parser)]
pub struct RewindArgs {
    #[command(flatten)]
    pub input: SnapshotArg,

    /// Number of steps to undo.
    #[arg(long = "steps", default_value_t = 1)]
    pub steps: usize,

    /// Write the rewound snapshot here instead of stdout.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
