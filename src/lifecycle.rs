//! Start/stop/restart/refresh logic for a single slot.
//!
//! The controller never holds a process handle across calls: every decision is
//! taken from a fresh [`ProcessMatcher`] query, so state survives supervisor
//! restarts and external kills alike.
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    activity::EventSink,
    config::{RestartPolicy, Settings},
    constants::STOP_POLL_INTERVAL,
    error::SupervisorError,
    launcher::{LaunchSpec, ProcessLauncher, SignalOutcome},
    matcher::{ProcessHandle, ProcessMatcher},
    record::{BotRecord, RunState},
    vcs::{self, UpdateOutcome},
};

/// Drives lifecycle operations on one [`BotRecord`] at a time.
pub struct LifecycleController {
    matcher: ProcessMatcher,
    launcher: Arc<dyn ProcessLauncher>,
    events: Arc<dyn EventSink>,
    token_prefix: String,
    stop_grace: Duration,
    restart: RestartPolicy,
    output_dir: Option<PathBuf>,
    terminal: Option<Vec<String>>,
}

impl LifecycleController {
    /// Creates a controller using the timing and launch options from `settings`.
    pub fn new(
        settings: &Settings,
        matcher: ProcessMatcher,
        launcher: Arc<dyn ProcessLauncher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            matcher,
            launcher,
            events,
            token_prefix: settings.token_prefix.clone(),
            stop_grace: settings.stop_grace,
            restart: settings.restart,
            output_dir: Some(settings.output_dir()),
            terminal: settings.terminal.clone(),
        }
    }

    /// Discards bot output instead of writing per-slot files.
    pub fn without_output(mut self) -> Self {
        self.output_dir = None;
        self
    }

    pub fn matcher(&self) -> &ProcessMatcher {
        &self.matcher
    }

    /// Sink receiving lifecycle events.
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Session token of a zero-based slot.
    pub fn token_for(&self, slot: usize) -> String {
        format!("{}-{}", self.token_prefix, slot + 1)
    }

    fn require_path(record: &BotRecord) -> Result<PathBuf, SupervisorError> {
        match record.executable_path() {
            Some(path) => Ok(path.to_path_buf()),
            None => {
                warn!("Slot {} has no bot configured", record.slot_index() + 1);
                Err(SupervisorError::Unconfigured {
                    slot: record.slot_index(),
                })
            }
        }
    }

    fn matches(&self, record: &BotRecord, path: &Path) -> BTreeSet<ProcessHandle> {
        self.matcher
            .resolve(path, &self.token_for(record.slot_index()))
    }

    /// Points the slot at `path`, resets its name and re-checks liveness.
    pub fn configure(
        &self,
        record: &mut BotRecord,
        path: &Path,
    ) -> Result<RunState, SupervisorError> {
        if path.as_os_str().is_empty() {
            return Err(SupervisorError::InvalidInput(
                "executable path cannot be empty".into(),
            ));
        }

        let absolute = std::path::absolute(path).map_err(|err| {
            SupervisorError::InvalidInput(format!("invalid path {}: {err}", path.display()))
        })?;
        if !absolute.is_file() {
            warn!(
                "Configured path {} for bot {} is not a file",
                absolute.display(),
                record.slot_index() + 1
            );
        }

        record.configure(absolute.clone());
        self.events.record(&format!(
            "Added file {} for bot {}",
            absolute.display(),
            record.slot_index() + 1
        ));

        self.refresh_status(record)
    }

    /// Changes the display name. Blank names are rejected.
    pub fn rename(&self, record: &mut BotRecord, new_name: &str) -> Result<(), SupervisorError> {
        Self::require_path(record)?;

        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(SupervisorError::InvalidInput("name cannot be empty".into()));
        }

        record.set_display_name(trimmed.to_string());
        self.events.record(&format!(
            "Renamed bot {} to {trimmed}",
            record.slot_index() + 1
        ));
        Ok(())
    }

    /// Sets the state from the process table: Running when a match exists, Stopped otherwise.
    pub fn refresh_status(&self, record: &mut BotRecord) -> Result<RunState, SupervisorError> {
        let path = Self::require_path(record)?;

        if self.matches(record, &path).is_empty() {
            if record.run_state() == RunState::Running {
                debug!(
                    "Bot {} no longer has a matching process",
                    record.slot_index() + 1
                );
            }
            record.mark_stopped();
        } else {
            record.mark_running();
        }

        Ok(record.run_state())
    }

    /// Launches the bot unless a matching process is already alive.
    pub fn start(&self, record: &mut BotRecord) -> Result<ProcessHandle, SupervisorError> {
        let path = Self::require_path(record)?;
        let slot = record.slot_index();

        if !self.matches(record, &path).is_empty() {
            record.mark_running();
            self.events
                .record(&format!("Bot {} is already running", slot + 1));
            return Err(SupervisorError::AlreadyRunning { slot });
        }

        let spec = LaunchSpec {
            slot,
            working_dir: path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            executable: path.clone(),
            token: self.token_for(slot),
            display_name: record.display_name().to_string(),
            output: self
                .output_dir
                .as_ref()
                .map(|dir| dir.join(format!("slot-{}.log", slot + 1))),
            terminal: self.terminal.clone(),
        };

        match self.launcher.spawn_detached(&spec) {
            Ok(handle) => {
                record.mark_started(Utc::now());
                self.events.record(&format!(
                    "Started bot {} ({}) as PID {handle}",
                    slot + 1,
                    path.display()
                ));
                Ok(handle)
            }
            Err(source) => {
                self.events
                    .record(&format!("Failed to start bot {}: {source}", slot + 1));
                Err(SupervisorError::LaunchFailed { slot, path, source })
            }
        }
    }

    /// Terminates every matching process together with its descendants.
    ///
    /// Returns the number of processes that received a signal.
    pub fn stop(&self, record: &mut BotRecord) -> Result<usize, SupervisorError> {
        let path = Self::require_path(record)?;
        let slot = record.slot_index();

        let roots = self.matches(record, &path);
        if roots.is_empty() {
            record.mark_stopped();
            self.events
                .record(&format!("No running process found for bot {}", slot + 1));
            return Err(SupervisorError::NotRunning { slot });
        }

        let mut signalled = BTreeSet::new();
        let mut delivered = 0;
        let mut last_error = None;

        for root in &roots {
            let targets = self.matcher.descendants_of(*root);
            for target in targets.into_iter().chain(std::iter::once(*root)) {
                if !signalled.insert(target) {
                    continue;
                }
                match self.launcher.terminate(target) {
                    Ok(SignalOutcome::Delivered) => delivered += 1,
                    Ok(SignalOutcome::Gone) => {}
                    Err(err) => {
                        warn!("Failed to terminate PID {target} of bot {}: {err}", slot + 1);
                        last_error = Some(err);
                    }
                }
            }
        }

        if delivered == 0
            && let Some(source) = last_error
        {
            self.events
                .record(&format!("Failed to stop bot {}: {source}", slot + 1));
            return Err(SupervisorError::StopFailed { slot, source });
        }

        self.escalate(slot, &signalled);

        record.mark_stopped();
        self.events.record(&format!("Stopped bot {}", slot + 1));
        Ok(delivered)
    }

    /// Waits out the grace period, then SIGKILLs whatever is left.
    fn escalate(&self, slot: usize, signalled: &BTreeSet<ProcessHandle>) {
        let deadline = Instant::now() + self.stop_grace;
        let mut survivors = self.matcher.still_alive(signalled);

        while !survivors.is_empty() && Instant::now() < deadline {
            thread::sleep(STOP_POLL_INTERVAL.min(self.stop_grace));
            survivors = self.matcher.still_alive(&survivors);
        }

        for pid in survivors {
            warn!(
                "PID {pid} of bot {} did not exit after SIGTERM; sending SIGKILL",
                slot + 1
            );
            if let Err(err) = self.launcher.kill(pid) {
                warn!("Failed to kill PID {pid} of bot {}: {err}", slot + 1);
            }
        }
    }

    /// Stops the bot, waits for its processes to disappear, then starts it again.
    ///
    /// If matching processes remain after the retry budget the start is skipped
    /// so two instances never run side by side.
    pub fn restart(&self, record: &mut BotRecord) -> Result<ProcessHandle, SupervisorError> {
        let path = Self::require_path(record)?;
        let slot = record.slot_index();

        match self.stop(record) {
            Ok(_) | Err(SupervisorError::NotRunning { .. }) => {}
            Err(err) => return Err(err),
        }

        let mut remaining = self.matches(record, &path);
        let mut checks = 0;
        while !remaining.is_empty() && checks < self.restart.attempts {
            thread::sleep(self.restart.interval);
            remaining = self.matches(record, &path);
            checks += 1;
        }

        if !remaining.is_empty() {
            record.mark_stopped();
            self.events.record(&format!(
                "Bot {} is still running after several stop attempts",
                slot + 1
            ));
            return Err(SupervisorError::StopTimeout {
                slot,
                attempts: self.restart.attempts,
            });
        }

        let handle = self.start(record)?;
        self.events.record(&format!("Restarted bot {}", slot + 1));
        Ok(handle)
    }

    /// Pulls the latest sources into the bot's directory.
    pub fn update(&self, record: &BotRecord) -> Result<UpdateOutcome, SupervisorError> {
        let path = Self::require_path(record)?;
        let slot = record.slot_index();
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let outcome =
            vcs::pull(&directory).map_err(|source| SupervisorError::UpdateSpawn { slot, source })?;

        match &outcome {
            UpdateOutcome::NotARepository { directory } => {
                self.events.record(&format!(
                    "Directory {} of bot {} is not a git repository",
                    directory.display(),
                    slot + 1
                ));
            }
            UpdateOutcome::Pulled { stdout, .. } => {
                self.events
                    .record(&format!("Update of bot {} finished: {stdout}", slot + 1));
            }
            UpdateOutcome::Failed { code, stderr, .. } => {
                self.events.record(&format!(
                    "Update of bot {} failed: {stderr}",
                    slot + 1
                ));
                return Err(SupervisorError::UpdateFailed {
                    slot,
                    code: *code,
                    stderr: stderr.clone(),
                });
            }
        }

        Ok(outcome)
    }
}
