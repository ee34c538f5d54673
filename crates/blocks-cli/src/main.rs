//! block-builder: inspect, check and rewind state snapshots.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;

use blocks_cli::commands::{InspectFormat, run_check, run_history, run_inspect, run_rewind};
use blocks_cli::logging::{LogConfig, LogFormat, init_logging};
use blocks_cli::render::integrity_summary;

mod cli;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(cli.command) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Inspect(args) => {
            let format = if args.json {
                InspectFormat::Json
            } else if args.outline {
                InspectFormat::Outline
            } else {
                InspectFormat::Table
            };
            print!("{}", run_inspect(&args.input.snapshot, format)?);
            Ok(0)
        }
        Command::Check(args) => {
            let report = run_check(&args.snapshot)?;
            print!("{}", integrity_summary(&report));
            Ok(i32::from(report.has_errors()))
        }
        Command::History(args) => {
            print!("{}", run_history(&args.snapshot)?);
            Ok(0)
        }
        Command::Rewind(args) => {
            let outcome = run_rewind(&args.input.snapshot, args.steps, args.output.as_deref())?;
            if args.output.is_none() {
                println!("{}", outcome.snapshot.to_json_pretty()?);
            }
            if outcome.undone < args.steps {
                eprintln!(
                    "note: undid {} of {} requested steps; history exhausted",
                    outcome.undone, args.steps
                );
            }
            Ok(0)
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
