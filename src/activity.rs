//! Timestamped activity log.
//!
//! Every supervisor event is emitted through `tracing` and, when a file is
//! attached, appended to a JSON object mapping timestamps to messages.
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use fs2::FileExt;
use tracing::{info, warn};

use crate::{constants::ACTIVITY_TIMESTAMP_FORMAT, error::ActivityLogError};

/// Receives human-readable supervisor events.
pub trait EventSink: Send + Sync {
    /// Records one event.
    fn record(&self, message: &str);
}

/// Appends events to a JSON activity log file.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `message` under the current local timestamp.
    ///
    /// A key that already exists gets a ` (n)` suffix so nothing is overwritten.
    pub fn append(&self, message: &str) -> Result<String, ActivityLogError> {
        let timestamp = Local::now().format(ACTIVITY_TIMESTAMP_FORMAT).to_string();
        self.append_at(&timestamp, message)
    }

    fn append_at(&self, timestamp: &str, message: &str) -> Result<String, ActivityLogError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let result = Self::append_locked(&mut file, timestamp, message);
        let _ = FileExt::unlock(&file);
        result
    }

    fn append_locked(
        file: &mut File,
        timestamp: &str,
        message: &str,
    ) -> Result<String, ActivityLogError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut entries: BTreeMap<String, String> = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents)?
        };

        let mut key = timestamp.to_string();
        let mut suffix = 2;
        while entries.contains_key(&key) {
            key = format!("{timestamp} ({suffix})");
            suffix += 1;
        }
        entries.insert(key.clone(), message.to_string());

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(serde_json::to_string_pretty(&entries)?.as_bytes())?;
        file.flush()?;
        Ok(key)
    }

    /// All entries in timestamp order, same-second entries by their suffix.
    pub fn entries(&self) -> Result<Vec<(String, String)>, ActivityLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: BTreeMap<String, String> = serde_json::from_str(&contents)?;
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| ordering_key(a).cmp(&ordering_key(b)));
        Ok(entries)
    }

    /// The last `lines` entries, oldest first.
    pub fn tail(&self, lines: usize) -> Result<Vec<(String, String)>, ActivityLogError> {
        let entries = self.entries()?;
        let start = entries.len().saturating_sub(lines);
        Ok(entries[start..].to_vec())
    }
}

/// Splits `"ts (n)"` into `("ts", n)`; a bare timestamp is occurrence 1.
fn ordering_key(key: &str) -> (&str, u32) {
    key.rsplit_once(" (")
        .and_then(|(timestamp, rest)| {
            rest.strip_suffix(')')
                .and_then(|n| n.parse().ok())
                .map(|n| (timestamp, n))
        })
        .unwrap_or((key, 1))
}

impl EventSink for ActivityLog {
    fn record(&self, message: &str) {
        info!("{message}");
        if let Err(err) = self.append(message) {
            warn!(
                "Failed to append to activity log {}: {err}",
                self.path.display()
            );
        }
    }
}

/// Sink that only logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, message: &str) {
        info!("{message}");
    }
}
