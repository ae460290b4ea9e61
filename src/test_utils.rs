//! In-memory stand-ins for the process table, the launcher and the event sink.
use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use crate::{
    activity::EventSink,
    constants::TOKEN_ENV_VAR,
    launcher::{LaunchSpec, ProcessLauncher, SignalOutcome},
    matcher::{ProcessEntry, ProcessHandle, ProcessTable},
};

/// Global lock for environment variable modifications in tests.
/// All tests that modify environment variables (especially HOME) should acquire this lock
/// to prevent race conditions between parallel test executions.
pub static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process table whose contents are set by the test.
#[derive(Debug, Default)]
pub struct FakeProcessTable {
    entries: Mutex<Vec<ProcessEntry>>,
}

impl FakeProcessTable {
    pub fn with_entries(entries: Vec<ProcessEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn insert(&self, entry: ProcessEntry) {
        let mut entries = lock(&self.entries);
        entries.retain(|existing| existing.pid != entry.pid);
        entries.push(entry);
    }

    /// Adds an untagged process.
    pub fn insert_process(&self, pid: u32, parent: Option<u32>, argv: &[&str]) {
        self.insert(ProcessEntry {
            pid,
            parent,
            argv: argv.iter().map(|arg| arg.to_string()).collect(),
            environ: Vec::new(),
        });
    }

    /// Removes `pid`; returns whether it was present.
    pub fn remove(&self, pid: u32) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|entry| entry.pid != pid);
        entries.len() != before
    }

    pub fn contains(&self, pid: u32) -> bool {
        lock(&self.entries).iter().any(|entry| entry.pid == pid)
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn entries(&self) -> Vec<ProcessEntry> {
        lock(&self.entries).clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        self.entries()
    }
}

/// Launcher that "spawns" into a [`FakeProcessTable`].
///
/// Each launch adds a shell root naming the executable plus one child, both
/// carrying the slot token. Signals remove entries unless the launcher is stubborn.
#[derive(Debug)]
pub struct FakeLauncher {
    table: Arc<FakeProcessTable>,
    next_pid: AtomicU32,
    spawns: Mutex<Vec<LaunchSpec>>,
    terminated: Mutex<Vec<u32>>,
    killed: Mutex<Vec<u32>>,
    stubborn: AtomicBool,
    refuse_signals: AtomicBool,
    spawn_failure: Mutex<Option<io::ErrorKind>>,
}

impl FakeLauncher {
    pub fn new(table: Arc<FakeProcessTable>) -> Self {
        Self {
            table,
            next_pid: AtomicU32::new(1000),
            spawns: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
            stubborn: AtomicBool::new(false),
            refuse_signals: AtomicBool::new(false),
            spawn_failure: Mutex::new(None),
        }
    }

    /// Processes ignore every signal but still count as delivered.
    pub fn set_stubborn(&self, stubborn: bool) {
        self.stubborn.store(stubborn, Ordering::SeqCst);
    }

    /// Every signal fails with `PermissionDenied`.
    pub fn set_refuse_signals(&self, refuse: bool) {
        self.refuse_signals.store(refuse, Ordering::SeqCst);
    }

    /// The next spawn fails with `kind`.
    pub fn fail_next_spawn(&self, kind: io::ErrorKind) {
        *lock(&self.spawn_failure) = Some(kind);
    }

    pub fn spawns(&self) -> Vec<LaunchSpec> {
        lock(&self.spawns).clone()
    }

    /// PIDs that received SIGTERM, in order.
    pub fn terminated(&self) -> Vec<u32> {
        lock(&self.terminated).clone()
    }

    /// PIDs that received SIGKILL, in order.
    pub fn killed(&self) -> Vec<u32> {
        lock(&self.killed).clone()
    }

    fn signal(&self, process: ProcessHandle, log: &Mutex<Vec<u32>>) -> io::Result<SignalOutcome> {
        if self.refuse_signals.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if !self.table.contains(process.pid()) {
            return Ok(SignalOutcome::Gone);
        }

        lock(log).push(process.pid());
        if !self.stubborn.load(Ordering::SeqCst) {
            self.table.remove(process.pid());
        }
        Ok(SignalOutcome::Delivered)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn_detached(&self, spec: &LaunchSpec) -> io::Result<ProcessHandle> {
        if let Some(kind) = lock(&self.spawn_failure).take() {
            return Err(io::Error::from(kind));
        }

        let root = self.next_pid.fetch_add(2, Ordering::SeqCst);
        let environ = vec![format!("{TOKEN_ENV_VAR}={}", spec.token)];
        let mut argv = vec!["/bin/sh".to_string()];
        argv.extend(spec.argv());

        self.table.insert(ProcessEntry {
            pid: root,
            parent: Some(1),
            argv,
            environ: environ.clone(),
        });
        self.table.insert(ProcessEntry {
            pid: root + 1,
            parent: Some(root),
            argv: vec!["sleep".into(), "60".into()],
            environ,
        });

        lock(&self.spawns).push(spec.clone());
        Ok(ProcessHandle(root))
    }

    fn terminate(&self, process: ProcessHandle) -> io::Result<SignalOutcome> {
        self.signal(process, &self.terminated)
    }

    fn kill(&self, process: ProcessHandle) -> io::Result<SignalOutcome> {
        self.signal(process, &self.killed)
    }
}

/// Event sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    /// Whether any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.messages)
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl EventSink for MemorySink {
    fn record(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}
