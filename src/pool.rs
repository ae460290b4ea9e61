//! The fixed pool of bot slots.
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{error, warn};

use crate::{
    error::SupervisorError,
    lifecycle::LifecycleController,
    matcher::ProcessHandle,
    record::{BotRecord, RunState},
    store::{SlotEntry, SlotStore},
    vcs::UpdateOutcome,
};

/// Owns every [`BotRecord`] and serializes commands per slot.
///
/// Each slot sits behind its own mutex, held for the whole command, so two
/// commands on the same slot never overlap while different slots proceed
/// independently.
pub struct SupervisorPool {
    slots: Vec<Mutex<BotRecord>>,
    controller: LifecycleController,
    store: Option<SlotStore>,
}

impl SupervisorPool {
    /// Creates `slot_count` slots and restores whatever `store` holds.
    ///
    /// A corrupt store is reported once and the pool starts empty.
    pub fn new(
        slot_count: usize,
        controller: LifecycleController,
        store: Option<SlotStore>,
    ) -> Self {
        let pool = Self {
            slots: (0..slot_count)
                .map(|slot| Mutex::new(BotRecord::empty(slot)))
                .collect(),
            controller,
            store,
        };

        if let Err(err) = pool.hydrate() {
            error!("{err}");
            pool.controller.events().record(&err.to_string());
        }

        pool
    }

    fn hydrate(&self) -> Result<(), SupervisorError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let entries = store.load()?;
        if entries.len() > self.slots.len() {
            warn!(
                "Slot store {} has {} entries; ignoring all beyond the first {}",
                store.path().display(),
                entries.len(),
                self.slots.len()
            );
        }

        for (slot, entry) in entries.into_iter().enumerate().take(self.slots.len()) {
            if let Some(entry) = entry {
                self.lock(slot)?
                    .hydrate(PathBuf::from(entry.path), &entry.name);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    fn lock(&self, slot: usize) -> Result<MutexGuard<'_, BotRecord>, SupervisorError> {
        let cell = self.slots.get(slot).ok_or_else(|| {
            SupervisorError::InvalidInput(format!(
                "slot {} does not exist (pool has {} slots)",
                slot + 1,
                self.slots.len()
            ))
        })?;
        Ok(cell.lock()?)
    }

    /// Copy of one slot's record.
    pub fn snapshot(&self, slot: usize) -> Result<BotRecord, SupervisorError> {
        Ok(self.lock(slot)?.clone())
    }

    /// Copies of every record in slot order.
    pub fn snapshots(&self) -> Result<Vec<BotRecord>, SupervisorError> {
        (0..self.slots.len()).map(|slot| self.snapshot(slot)).collect()
    }

    pub fn configure(&self, slot: usize, path: &Path) -> Result<RunState, SupervisorError> {
        let state = {
            let mut record = self.lock(slot)?;
            self.controller.configure(&mut record, path)?
        };
        self.persist_logged();
        Ok(state)
    }

    pub fn rename(&self, slot: usize, name: &str) -> Result<(), SupervisorError> {
        {
            let mut record = self.lock(slot)?;
            self.controller.rename(&mut record, name)?;
        }
        self.persist_logged();
        Ok(())
    }

    pub fn start(&self, slot: usize) -> Result<ProcessHandle, SupervisorError> {
        let mut record = self.lock(slot)?;
        self.controller.start(&mut record)
    }

    pub fn stop(&self, slot: usize) -> Result<usize, SupervisorError> {
        let mut record = self.lock(slot)?;
        self.controller.stop(&mut record)
    }

    pub fn restart(&self, slot: usize) -> Result<ProcessHandle, SupervisorError> {
        let mut record = self.lock(slot)?;
        self.controller.restart(&mut record)
    }

    pub fn refresh(&self, slot: usize) -> Result<RunState, SupervisorError> {
        let mut record = self.lock(slot)?;
        self.controller.refresh_status(&mut record)
    }

    /// Refreshes every configured slot, one lock at a time.
    pub fn refresh_all(&self) -> Vec<(usize, Result<RunState, SupervisorError>)> {
        (0..self.slots.len())
            .filter_map(|slot| {
                let mut record = match self.lock(slot) {
                    Ok(record) => record,
                    Err(err) => return Some((slot, Err(err))),
                };
                if !record.is_configured() {
                    return None;
                }
                Some((slot, self.controller.refresh_status(&mut record)))
            })
            .collect()
    }

    pub fn update(&self, slot: usize) -> Result<UpdateOutcome, SupervisorError> {
        let record = self.lock(slot)?;
        self.controller.update(&record)
    }

    /// Writes every slot's path and name to the store.
    pub fn persist(&self) -> Result<(), SupervisorError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut entries = Vec::with_capacity(self.slots.len());
        for slot in 0..self.slots.len() {
            let record = self.lock(slot)?;
            entries.push(record.executable_path().map(|path| SlotEntry {
                path: path.to_string_lossy().into_owned(),
                name: record.display_name().to_string(),
            }));
        }

        store.save(&entries)?;
        Ok(())
    }

    fn persist_logged(&self) {
        if let Err(err) = self.persist() {
            error!("Failed to save slot configuration: {err}");
        }
    }
}
