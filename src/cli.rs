//! Command-line interface for botpool.
use std::{fmt, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::constants::DEFAULT_LOG_LINES;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// A slot number as typed by the user (1-based), stored zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotArg(usize);

impl SlotArg {
    /// Zero-based slot index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 + 1)
    }
}

impl FromStr for SlotArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.parse::<usize>() {
            Ok(0) => Err("slot numbers start at 1".into()),
            Ok(number) => Ok(SlotArg(number - 1)),
            Err(_) => Err(format!("invalid slot number '{trimmed}'")),
        }
    }
}

/// Command-line interface for botpool.
#[derive(Parser)]
#[command(name = "botpool", version, author)]
#[command(about = "Supervise a fixed pool of bot scripts", long_about = None)]
pub struct Cli {
    /// Path to the settings file (defaults to `botpool.yaml`, then the user config dir).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Disable ANSI colors in tables.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for botpool.
#[derive(Subcommand)]
pub enum Commands {
    /// Show every slot with its current state.
    List {
        /// Print the slots as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Point a slot at an executable.
    Configure {
        /// Slot number (1-based).
        slot: SlotArg,
        /// Script or binary to supervise.
        path: String,
    },

    /// Change a slot's display name.
    Rename {
        /// Slot number (1-based).
        slot: SlotArg,
        /// New display name.
        name: String,
    },

    /// Launch a slot's bot.
    Start {
        /// Slot number (1-based).
        slot: SlotArg,
    },

    /// Terminate a slot's bot and all of its descendants.
    Stop {
        /// Slot number (1-based).
        slot: SlotArg,
    },

    /// Stop a slot's bot, confirm it is gone, then start it again.
    Restart {
        /// Slot number (1-based).
        slot: SlotArg,
    },

    /// Re-check one slot, or every configured slot, against the process table.
    Refresh {
        /// Slot number (1-based). All slots when omitted.
        slot: Option<SlotArg>,
    },

    /// Run `git pull` in a slot's directory.
    Update {
        /// Slot number (1-based).
        slot: SlotArg,
    },

    /// Show the most recent activity log entries.
    Log {
        /// Number of entries to show.
        #[arg(short, long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// Run the interactive control loop.
    Console,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
