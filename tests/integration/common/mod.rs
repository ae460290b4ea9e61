#![allow(dead_code)]

use std::{
    env, fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use botpool::{
    activity::ActivityLog,
    config::{RestartPolicy, Settings},
    launcher::DetachedLauncher,
    lifecycle::LifecycleController,
    matcher::ProcessMatcher,
    pool::SupervisorPool,
    store::SlotStore,
    test_utils::{FakeLauncher, FakeProcessTable, MemorySink},
};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

pub struct HomeEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = botpool::test_utils::env_lock();
        let previous = env::var("HOME").ok();
        unsafe {
            env::set_var("HOME", home);
        }
        botpool::runtime::init();
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe {
                env::set_var("HOME", value);
            },
            None => unsafe {
                env::remove_var("HOME");
            },
        }
        botpool::runtime::init();
    }
}

/// Name unique to this test run, so parallel tests never share a basename or token.
pub fn unique_name(stem: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    format!(
        "{stem}-{}-{nanos}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

/// Writes an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Settings rooted in `state_dir` with fast stop and restart timings.
pub fn fast_settings(state_dir: &Path, slots: usize) -> Settings {
    Settings {
        slots,
        state_dir: state_dir.to_path_buf(),
        token_prefix: unique_name("itest"),
        stop_grace: Duration::from_millis(500),
        restart: RestartPolicy {
            attempts: 5,
            interval: Duration::from_millis(100),
        },
        ..Settings::default()
    }
}

/// Pool over the real process table, persisting into the settings' state dir.
pub fn system_pool(settings: &Settings) -> SupervisorPool {
    let controller = LifecycleController::new(
        settings,
        ProcessMatcher::system(),
        Arc::new(DetachedLauncher),
        Arc::new(ActivityLog::new(settings.activity_log_path())),
    );
    SupervisorPool::new(
        settings.slots,
        controller,
        Some(SlotStore::new(settings.slot_store_path())),
    )
}

pub struct FakePool {
    pub table: Arc<FakeProcessTable>,
    pub launcher: Arc<FakeLauncher>,
    pub sink: Arc<MemorySink>,
    pub pool: SupervisorPool,
}

/// Pool over in-memory fakes. `store` enables persistence.
pub fn fake_pool(settings: &Settings, store: Option<SlotStore>) -> FakePool {
    let table = Arc::new(FakeProcessTable::default());
    let launcher = Arc::new(FakeLauncher::new(table.clone()));
    let sink = Arc::new(MemorySink::default());
    let controller = LifecycleController::new(
        settings,
        ProcessMatcher::new(table.clone()),
        launcher.clone(),
        sink.clone(),
    )
    .without_output();
    let pool = SupervisorPool::new(settings.slots, controller, store);
    FakePool {
        table,
        launcher,
        sink,
        pool,
    }
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

/// Waits for a file holding a PID and returns it.
pub fn wait_for_pid_file(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path)
            && let Ok(pid) = content.trim().parse::<u32>()
        {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for a PID in {:?}", path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

/// Alive and not a zombie.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie))
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }

    panic!("Timed out waiting for PID {} to exit", pid);
}

/// Best-effort SIGKILL for cleanup after a failed assertion.
pub fn force_kill(pid: u32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    );
}
