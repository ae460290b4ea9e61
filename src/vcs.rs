//! Source updates for a bot's directory via `git pull`.
use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::debug;

use crate::constants::VCS_MARKER;

/// Result of an update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The directory holds no repository; nothing was run.
    NotARepository {
        /// Directory that was checked.
        directory: PathBuf,
    },
    /// `git pull` ran to completion.
    Pulled {
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// `git pull` exited unsuccessfully.
    Failed {
        /// Exit code if the command terminated normally.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Whether `directory` contains a version-control marker.
pub fn is_repository(directory: &Path) -> bool {
    directory.join(VCS_MARKER).exists()
}

/// Runs `git pull` in `directory` when it is a repository.
///
/// Only failing to spawn `git` is an error; a non-zero exit is reported as
/// [`UpdateOutcome::Failed`].
pub fn pull(directory: &Path) -> io::Result<UpdateOutcome> {
    if !is_repository(directory) {
        return Ok(UpdateOutcome::NotARepository {
            directory: directory.to_path_buf(),
        });
    }

    debug!("Running git pull in {}", directory.display());
    let output = Command::new("git")
        .arg("pull")
        .current_dir(directory)
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        Ok(UpdateOutcome::Pulled { stdout, stderr })
    } else {
        Ok(UpdateOutcome::Failed {
            code: output.status.code(),
            stdout,
            stderr,
        })
    }
}
