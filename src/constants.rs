//! Constants and default values for the bot supervisor.
//!
//! This module centralizes magic numbers, file names and timing defaults used
//! throughout the crate.

use std::time::Duration;

// ============================================================================
// Pool Layout
// ============================================================================

/// Number of slots when the settings file does not specify one.
pub const DEFAULT_SLOT_COUNT: usize = 10;

/// Prefix of the per-slot session token; the slot number is appended.
pub const DEFAULT_TOKEN_PREFIX: &str = "botpool-slot";

/// Environment variable carrying a launched bot's session token.
/// Inherited by every descendant of the launched process.
pub const TOKEN_ENV_VAR: &str = "BOTPOOL_SLOT_TOKEN";

// ============================================================================
// File System Constants
// ============================================================================

/// Name of the settings file searched in the working and config directories.
pub const SETTINGS_FILE_NAME: &str = "botpool.yaml";

/// Name of the persisted slot configuration stored in the state directory.
pub const SLOT_STORE_FILE_NAME: &str = "bot_paths.json";

/// Name of the activity log stored in the state directory.
pub const ACTIVITY_LOG_FILE_NAME: &str = "activity_log.json";

/// Directory under the state directory receiving each bot's stdout/stderr.
pub const OUTPUT_DIR_NAME: &str = "output";

/// Marker directory identifying a git checkout.
pub const VCS_MARKER: &str = ".git";

/// Timestamp format used for activity log keys.
pub const ACTIVITY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Process Management Timing
// ============================================================================

/// Number of post-stop checks performed by a restart before giving up.
pub const RESTART_STOP_CHECKS: usize = 5;

/// Interval between post-stop checks during a restart.
pub const RESTART_STOP_INTERVAL: Duration = Duration::from_millis(500);

/// Time allowed between SIGTERM and SIGKILL when stopping a bot.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// Polling interval while waiting out the stop grace period.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Period of the elapsed-time readout tick.
pub const ELAPSED_TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Output
// ============================================================================

/// Number of activity log lines shown by default.
pub const DEFAULT_LOG_LINES: usize = 20;
