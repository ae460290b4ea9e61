//! Persisted slot configuration.
//!
//! The store is a JSON array with one element per slot: `null` for an empty
//! slot, or `{"path": ..., "name": ...}`.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{SlotStoreError, SupervisorError};

/// One configured slot as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    /// Executable path.
    pub path: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct RawEntry {
    path: String,
    name: Option<String>,
}

/// File-backed slot configuration.
#[derive(Debug, Clone)]
pub struct SlotStore {
    path: PathBuf,
}

impl SlotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored entries. A missing file yields no entries.
    ///
    /// The file must hold a JSON array; individual elements that are not
    /// `{"path": ...}` objects are skipped as empty slots.
    pub fn load(&self) -> Result<Vec<Option<SlotEntry>>, SupervisorError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let corrupt = |source: SlotStoreError| SupervisorError::ConfigCorrupt {
            path: self.path.clone(),
            source,
        };
        let contents = fs::read_to_string(&self.path).map_err(|err| corrupt(err.into()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> =
            serde_json::from_str(&contents).map_err(|err| corrupt(err.into()))?;

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                if value.is_null() {
                    return None;
                }
                match serde_json::from_value::<RawEntry>(value) {
                    Ok(raw) if !raw.path.trim().is_empty() => Some(SlotEntry {
                        path: raw.path,
                        name: raw.name.unwrap_or_default(),
                    }),
                    Ok(_) => None,
                    Err(err) => {
                        warn!("Ignoring malformed slot entry {}: {err}", index + 1);
                        None
                    }
                }
            })
            .collect())
    }

    /// Replaces the stored entries.
    pub fn save(&self, entries: &[Option<SlotEntry>]) -> Result<(), SlotStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}
