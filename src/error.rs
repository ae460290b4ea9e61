//! Error handling for botpool.
use std::path::PathBuf;

use thiserror::Error;

/// Defines all possible errors that can occur while supervising the bot pool.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A caller supplied an unusable argument (empty name, bad slot index, empty path).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The slot has no executable configured.
    #[error("Slot {} has no bot configured", .slot + 1)]
    Unconfigured {
        /// Zero-based slot index.
        slot: usize,
    },

    /// A matching process is already alive for the slot.
    #[error("Bot {} is already running", .slot + 1)]
    AlreadyRunning {
        /// Zero-based slot index.
        slot: usize,
    },

    /// No matching process could be found for the slot.
    #[error("No running process found for bot {}", .slot + 1)]
    NotRunning {
        /// Zero-based slot index.
        slot: usize,
    },

    /// Spawning the executable failed.
    #[error("Failed to launch bot {} ({}): {source}", .slot + 1, .path.display())]
    LaunchFailed {
        /// Zero-based slot index.
        slot: usize,
        /// The executable that could not be launched.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Restart could not confirm termination within its retry budget.
    #[error("Bot {} is still running after {attempts} stop checks", .slot + 1)]
    StopTimeout {
        /// Zero-based slot index.
        slot: usize,
        /// Number of checks performed before giving up.
        attempts: usize,
    },

    /// Every termination signal for the slot's processes was refused.
    #[error("Failed to stop bot {}: {source}", .slot + 1)]
    StopFailed {
        /// Zero-based slot index.
        slot: usize,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The persisted slot configuration could not be read or parsed.
    #[error("Slot configuration {} is corrupt: {source}", .path.display())]
    ConfigCorrupt {
        /// Location of the slot store.
        path: PathBuf,
        /// The underlying read or parse error.
        #[source]
        source: SlotStoreError,
    },

    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// A setting parsed but carries an unusable value.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Error for activity log operations.
    #[error("Activity log error: {0}")]
    ActivityLog(#[from] ActivityLogError),

    /// Error writing the persisted slot configuration.
    #[error("Slot store error: {0}")]
    SlotStore(#[from] SlotStoreError),

    /// The version-control command could not be spawned.
    #[error("Failed to run git for bot {}: {source}", .slot + 1)]
    UpdateSpawn {
        /// Zero-based slot index.
        slot: usize,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The version-control command exited unsuccessfully.
    #[error("Update of bot {} failed (exit {code:?}): {stderr}", .slot + 1)]
    UpdateFailed {
        /// Zero-based slot index.
        slot: usize,
        /// Exit code if the command terminated normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

impl SupervisorError {
    /// Expected races and no-op requests that should be surfaced as warnings rather than failures.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::Unconfigured { .. } | Self::AlreadyRunning { .. } | Self::NotRunning { .. }
        )
    }
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `SupervisorError`.
impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SupervisorError::MutexPoisonError(err.to_string())
    }
}

/// Error type for activity log operations.
#[derive(Debug, Error)]
pub enum ActivityLogError {
    /// Error reading or writing the log file.
    #[error("Failed to access activity log: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing or serialising the log contents.
    #[error("Failed to parse activity log: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error type for slot store operations.
#[derive(Debug, Error)]
pub enum SlotStoreError {
    /// Error reading or writing the store file.
    #[error("Failed to access slot store: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing or serialising the store contents.
    #[error("Failed to parse slot store: {0}")]
    Serialize(#[from] serde_json::Error),
}
