//! Recurring status refresh and elapsed-time readouts.
//!
//! Timers live in a min-heap keyed by deadline. The owner of the scheduler
//! sleeps until [`PollScheduler::next_deadline`] and then calls
//! [`PollScheduler::run_due`]; ticks execute on that thread.
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap, HashSet},
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{config::Settings, pool::SupervisorPool, status::format_elapsed};

/// Work item attached to a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    /// Refresh every configured slot.
    Status,
    /// Publish the elapsed readout of one slot.
    Elapsed(usize),
}

#[derive(Debug, PartialEq, Eq)]
struct Timer {
    deadline: Instant,
    task: Task,
}

// Reversed so the earliest deadline sits on top of the max-heap.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.task.cmp(&self.task))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Latest `HH:MM:SS` readout per slot, shared with whoever renders the pool.
#[derive(Debug, Clone, Default)]
pub struct ElapsedBoard {
    readouts: Arc<RwLock<BTreeMap<usize, String>>>,
}

impl ElapsedBoard {
    pub fn get(&self, slot: usize) -> Option<String> {
        self.readouts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&slot)
            .cloned()
    }

    pub fn publish(&self, slot: usize, readout: String) {
        self.readouts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(slot, readout);
    }

    pub fn clear(&self, slot: usize) {
        self.readouts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&slot);
    }

    pub fn readouts(&self) -> BTreeMap<usize, String> {
        self.readouts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Timer queue driving the status and elapsed ticks.
#[derive(Debug)]
pub struct PollScheduler {
    queue: BinaryHeap<Timer>,
    armed: HashSet<usize>,
    status_interval: Option<Duration>,
    elapsed_interval: Duration,
    board: ElapsedBoard,
}

impl PollScheduler {
    pub fn new(status_interval: Option<Duration>, elapsed_interval: Duration) -> Self {
        Self {
            queue: BinaryHeap::new(),
            armed: HashSet::new(),
            status_interval,
            elapsed_interval,
            board: ElapsedBoard::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.status_interval, settings.elapsed_interval)
    }

    /// Handle to the published readouts.
    pub fn board(&self) -> ElapsedBoard {
        self.board.clone()
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.peek().map(|timer| timer.deadline)
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, deadline: Instant, task: Task) {
        self.queue.push(Timer { deadline, task });
    }

    /// Initial refresh of every configured slot. Arms the recurring status tick
    /// when an interval is configured.
    pub fn catch_up(&mut self, pool: &SupervisorPool, now: Instant) {
        self.refresh(pool, now);
        if let Some(interval) = self.status_interval {
            self.push(now + interval, Task::Status);
        }
    }

    /// Starts the elapsed readout of `slot` unless it is already armed.
    pub fn arm_elapsed(&mut self, slot: usize, now: Instant) {
        if self.armed.insert(slot) {
            self.push(now, Task::Elapsed(slot));
        }
    }

    /// Runs every timer whose deadline is not after `now`. Returns how many ran.
    pub fn run_due(&mut self, pool: &SupervisorPool, now: Instant) -> usize {
        let mut ran = 0;
        while self
            .queue
            .peek()
            .is_some_and(|timer| timer.deadline <= now)
        {
            let Some(timer) = self.queue.pop() else {
                break;
            };
            ran += 1;

            match timer.task {
                Task::Status => {
                    self.refresh(pool, now);
                    if let Some(interval) = self.status_interval {
                        self.push(now + interval, Task::Status);
                    }
                }
                Task::Elapsed(slot) => self.tick_elapsed(pool, slot, now),
            }
        }
        ran
    }

    fn refresh(&mut self, pool: &SupervisorPool, now: Instant) {
        for (slot, result) in pool.refresh_all() {
            if let Err(err) = result {
                warn!("Status refresh of bot {} failed: {err}", slot + 1);
            }
        }

        match pool.snapshots() {
            Ok(records) => {
                for record in records {
                    if record.started_at().is_some() {
                        self.arm_elapsed(record.slot_index(), now);
                    } else {
                        self.board.clear(record.slot_index());
                    }
                }
            }
            Err(err) => warn!("Failed to read pool after status refresh: {err}"),
        }
    }

    fn tick_elapsed(&mut self, pool: &SupervisorPool, slot: usize, now: Instant) {
        let elapsed = match pool.snapshot(slot) {
            Ok(record) => record.elapsed_secs(Utc::now()),
            Err(err) => {
                warn!("Elapsed tick for bot {} failed: {err}", slot + 1);
                None
            }
        };

        match elapsed {
            Some(seconds) => {
                self.board.publish(slot, format_elapsed(seconds));
                self.push(now + self.elapsed_interval, Task::Elapsed(slot));
            }
            None => {
                debug!("Bot {} has no start time; elapsed readout cleared", slot + 1);
                self.board.clear(slot);
                self.armed.remove(&slot);
            }
        }
    }
}
