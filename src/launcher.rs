//! Spawn and signal primitives used by the lifecycle controller.
use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, Stdio},
    thread,
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tracing::{debug, error, warn};

use crate::{constants::TOKEN_ENV_VAR, matcher::ProcessHandle};

/// Everything needed to launch one bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Zero-based slot index.
    pub slot: usize,
    /// Script or binary to run.
    pub executable: PathBuf,
    /// Working directory for the launched process.
    pub working_dir: PathBuf,
    /// Session token exported to the process environment.
    pub token: String,
    /// Human label, substituted for `{name}` in the terminal wrapper.
    pub display_name: String,
    /// File receiving stdout and stderr. `None` discards output.
    pub output: Option<PathBuf>,
    /// Optional argv prefix the executable is appended to.
    pub terminal: Option<Vec<String>>,
}

impl LaunchSpec {
    /// Program and arguments after applying the terminal wrapper.
    pub fn argv(&self) -> Vec<String> {
        let executable = self.executable.to_string_lossy().into_owned();
        match &self.terminal {
            Some(prefix) if !prefix.is_empty() => prefix
                .iter()
                .map(|part| {
                    part.replace("{token}", &self.token)
                        .replace("{name}", &self.display_name)
                })
                .chain(std::iter::once(executable))
                .collect(),
            _ => vec![executable],
        }
    }
}

/// Result of delivering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal reached the process.
    Delivered,
    /// The process no longer exists.
    Gone,
}

/// Launches detached processes and signals them by PID.
pub trait ProcessLauncher: Send + Sync {
    /// Starts the process in its own session without keeping a handle to it.
    fn spawn_detached(&self, spec: &LaunchSpec) -> io::Result<ProcessHandle>;

    /// Asks the process to exit (SIGTERM).
    fn terminate(&self, process: ProcessHandle) -> io::Result<SignalOutcome>;

    /// Forces the process to exit (SIGKILL).
    fn kill(&self, process: ProcessHandle) -> io::Result<SignalOutcome>;
}

/// Launcher backed by `std::process::Command` and `nix` signals.
#[derive(Debug, Default)]
pub struct DetachedLauncher;

impl DetachedLauncher {
    fn send(process: ProcessHandle, sig: Signal) -> io::Result<SignalOutcome> {
        let raw = i32::try_from(process.pid())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        match signal::kill(Pid::from_raw(raw), Some(sig)) {
            Ok(()) => Ok(SignalOutcome::Delivered),
            Err(Errno::ESRCH) => Ok(SignalOutcome::Gone),
            Err(err) => Err(io::Error::from_raw_os_error(err as i32)),
        }
    }
}

impl ProcessLauncher for DetachedLauncher {
    fn spawn_detached(&self, spec: &LaunchSpec) -> io::Result<ProcessHandle> {
        if !spec.executable.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", spec.executable.display()),
            ));
        }

        let argv = spec.argv();
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&spec.working_dir)
            .env(TOKEN_ENV_VAR, &spec.token)
            .stdin(Stdio::null());

        match &spec.output {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stdout(file.try_clone()?).stderr(file);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        unsafe {
            cmd.pre_exec(|| {
                // New session: the bot outlives the supervisor and gets no controlling terminal.
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        debug!("Launching bot {}: {cmd:?}", spec.slot + 1);
        let mut child = cmd.spawn()?;
        let pid = child.id();

        let reaper = thread::Builder::new()
            .name(format!("reaper-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("Launched process {pid} exited with {status}"),
                Err(err) => warn!("Failed to reap launched process {pid}: {err}"),
            });
        if let Err(err) = reaper {
            error!("Failed to spawn reaper thread for PID {pid}: {err}");
        }

        Ok(ProcessHandle(pid))
    }

    fn terminate(&self, process: ProcessHandle) -> io::Result<SignalOutcome> {
        Self::send(process, Signal::SIGTERM)
    }

    fn kill(&self, process: ProcessHandle) -> io::Result<SignalOutcome> {
        Self::send(process, Signal::SIGKILL)
    }
}
