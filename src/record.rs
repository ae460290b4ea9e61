//! Per-slot bot state.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Last-known state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    /// No executable configured.
    Unconfigured,
    /// Configured, no matching process.
    Stopped,
    /// A matching process was seen or launched.
    Running,
}

/// One slot of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotRecord {
    slot_index: usize,
    executable_path: Option<PathBuf>,
    display_name: String,
    run_state: RunState,
    started_at: Option<DateTime<Utc>>,
}

impl BotRecord {
    /// Creates an unconfigured slot.
    pub fn empty(slot_index: usize) -> Self {
        Self {
            slot_index,
            executable_path: None,
            display_name: String::new(),
            run_state: RunState::Unconfigured,
            started_at: None,
        }
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn executable_path(&self) -> Option<&Path> {
        self.executable_path.as_deref()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_configured(&self) -> bool {
        self.executable_path.is_some()
    }

    /// Seconds since the recorded start, if any.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| now.signed_duration_since(started).num_seconds().max(0) as u64)
    }

    /// Points the slot at a new executable and resets the name to its file name.
    pub(crate) fn configure(&mut self, path: PathBuf) {
        self.display_name = default_name(&path);
        self.executable_path = Some(path);
        self.run_state = RunState::Stopped;
        self.started_at = None;
    }

    /// Restores a persisted slot. A blank name falls back to the file name.
    pub(crate) fn hydrate(&mut self, path: PathBuf, name: &str) {
        self.configure(path);
        if !name.trim().is_empty() {
            self.display_name = name.to_string();
        }
    }

    pub(crate) fn set_display_name(&mut self, name: String) {
        self.display_name = name;
    }

    /// Records a successful launch.
    pub(crate) fn mark_started(&mut self, at: DateTime<Utc>) {
        self.run_state = RunState::Running;
        self.started_at = Some(at);
    }

    /// Records a matching process without touching the start time.
    pub(crate) fn mark_running(&mut self) {
        self.run_state = RunState::Running;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.run_state = RunState::Stopped;
        self.started_at = None;
    }
}

/// File name of `path`, or the whole path when it has none.
pub fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
