//! Human-readable rendering of the pool.
use std::fmt::Write as _;

use chrono::Utc;

use crate::{
    record::{BotRecord, RunState},
    scheduler::ElapsedBoard,
};

const GREEN_BOLD: &str = "\x1b[1;32m"; // Bright Green
const RED_BOLD: &str = "\x1b[1;31m"; // Bright Red
const YELLOW_BOLD: &str = "\x1b[1;33m"; // Yellow/Gold
const RESET: &str = "\x1b[0m"; // Reset color

const ELAPSED_PLACEHOLDER: &str = "--:--:--";

/// Formats a duration in seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Renders slot tables and activity log excerpts.
#[derive(Debug, Clone, Copy)]
pub struct StatusRenderer {
    color: bool,
}

impl StatusRenderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn state_label(&self, state: RunState) -> String {
        let label = format!("{:<12}", state.as_ref());
        match state {
            RunState::Running => self.paint(GREEN_BOLD, &label),
            RunState::Stopped => self.paint(RED_BOLD, &label),
            RunState::Unconfigured => label,
        }
    }

    /// Elapsed readout for a record: the scheduler's published value when
    /// present, otherwise computed from `started_at`.
    fn elapsed_for(record: &BotRecord, board: Option<&ElapsedBoard>) -> String {
        board
            .and_then(|board| board.get(record.slot_index()))
            .or_else(|| record.elapsed_secs(Utc::now()).map(format_elapsed))
            .unwrap_or_else(|| ELAPSED_PLACEHOLDER.to_string())
    }

    /// One line per slot: number, state, elapsed time, name and path.
    pub fn render_pool(&self, records: &[BotRecord], board: Option<&ElapsedBoard>) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>4}  {:<12}  {:<8}  {:<20}  PATH",
            "SLOT", "STATE", "ELAPSED", "NAME"
        );

        for record in records {
            let name = if record.is_configured() {
                record.display_name().to_string()
            } else {
                "-".to_string()
            };
            let path = record
                .executable_path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string());

            let _ = writeln!(
                out,
                "{:>4}  {}  {:<8}  {:<20}  {}",
                record.slot_index() + 1,
                self.state_label(record.run_state()),
                Self::elapsed_for(record, board),
                name,
                path
            );
        }
        out
    }

    /// Multi-line detail for a single slot, in the style of `systemctl status`.
    pub fn render_slot(&self, record: &BotRecord, board: Option<&ElapsedBoard>) -> String {
        let slot = record.slot_index() + 1;
        let Some(path) = record.executable_path() else {
            return format!("● Slot {slot} - Not configured\n");
        };

        let mut out = String::new();
        match record.run_state() {
            RunState::Running => {
                let _ = writeln!(
                    out,
                    "{}",
                    self.paint(GREEN_BOLD, &format!("● {} Running", record.display_name()))
                );
            }
            _ => {
                let _ = writeln!(
                    out,
                    "{}",
                    self.paint(RED_BOLD, &format!("● {} Stopped", record.display_name()))
                );
            }
        }
        let _ = writeln!(out, "     Slot: {slot}");
        let _ = writeln!(out, "     Path: {}", path.display());
        if let Some(started) = record.started_at() {
            let _ = writeln!(
                out,
                "  Started: {} ({} elapsed)",
                started.format("%Y-%m-%d %H:%M:%S UTC"),
                Self::elapsed_for(record, board)
            );
        }
        out
    }

    /// Activity log entries, oldest first.
    pub fn render_activity(&self, entries: &[(String, String)]) -> String {
        if entries.is_empty() {
            return "No activity recorded.\n".to_string();
        }

        let mut out = String::new();
        for (timestamp, message) in entries {
            let _ = writeln!(out, "{}  {message}", self.paint(YELLOW_BOLD, timestamp));
        }
        out
    }
}
