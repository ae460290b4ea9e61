//! Maps configured executable paths onto live OS processes.
//!
//! No PID is ever persisted: every liveness question is answered from a fresh
//! snapshot of the process table. A process belongs to a slot when it carries
//! the slot's session token, or (for instances launched outside the supervisor)
//! when one of its arguments names the slot's executable.
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    path::Path,
    sync::Arc,
};

use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::trace;

use crate::constants::TOKEN_ENV_VAR;

/// Identifies one live process by PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessHandle(pub u32);

impl ProcessHandle {
    /// Raw process id.
    pub fn pid(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a process table snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id.
    pub pid: u32,
    /// Parent process id, if known.
    pub parent: Option<u32>,
    /// Argument vector. Empty when unreadable.
    pub argv: Vec<String>,
    /// `KEY=VALUE` environment entries. Empty when unreadable.
    pub environ: Vec<String>,
}

/// Source of process table snapshots.
pub trait ProcessTable: Send + Sync {
    /// Returns the live processes. Entries that vanished or could not be read
    /// are simply absent or carry empty vectors.
    fn snapshot(&self) -> Vec<ProcessEntry>;
}

/// Process table backed by `sysinfo`. Excludes zombies and the calling process.
#[derive(Debug, Default)]
pub struct SystemTable;

impl ProcessTable for SystemTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::Always)
                .with_environ(UpdateKind::Always),
        );

        let own_pid = std::process::id();
        system
            .processes()
            .iter()
            .filter(|(pid, process)| {
                pid.as_u32() != own_pid && !matches!(process.status(), ProcessStatus::Zombie)
            })
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                parent: process.parent().map(|parent| parent.as_u32()),
                argv: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
                environ: process
                    .environ()
                    .iter()
                    .map(|entry| entry.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect()
    }
}

/// Reduces a path-like string to its final component, accepting either separator.
fn file_name_of(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Lower-cased file name of `path` after making it absolute. `None` for empty paths.
pub fn target_file_name(path: &Path) -> Option<String> {
    if path.as_os_str().is_empty() {
        return None;
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let normalized = absolute.to_string_lossy().to_lowercase();
    let name = file_name_of(&normalized);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl ProcessEntry {
    fn names_file(&self, target: &str) -> bool {
        self.argv
            .iter()
            .any(|arg| file_name_of(&arg.to_lowercase()).contains(target))
    }

    fn token_value(&self) -> Option<&str> {
        self.environ.iter().find_map(|entry| {
            entry
                .strip_prefix(TOKEN_ENV_VAR)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    fn carries_token(&self, token: &str) -> bool {
        self.token_value() == Some(token) || self.argv.iter().any(|arg| arg == token)
    }

    fn carries_foreign_token(&self, token: &str) -> bool {
        matches!(self.token_value(), Some(value) if value != token)
    }
}

/// Read-only queries over the live process table.
#[derive(Clone)]
pub struct ProcessMatcher {
    table: Arc<dyn ProcessTable>,
}

impl ProcessMatcher {
    /// Creates a matcher over the given table.
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// Creates a matcher over the real OS process table.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTable))
    }

    /// Whether any live process names the executable at `path`.
    pub fn is_process_for(&self, path: &Path) -> bool {
        !self.find_processes_for(path).is_empty()
    }

    /// Processes whose argument vector names the executable at `path` by file name.
    pub fn find_processes_for(&self, path: &Path) -> BTreeSet<ProcessHandle> {
        let Some(target) = target_file_name(path) else {
            return BTreeSet::new();
        };

        self.table
            .snapshot()
            .iter()
            .filter(|entry| entry.names_file(&target))
            .map(|entry| ProcessHandle(entry.pid))
            .collect()
    }

    /// Processes tagged with a slot's session token.
    pub fn find_tagged(&self, token: &str) -> BTreeSet<ProcessHandle> {
        if token.is_empty() {
            return BTreeSet::new();
        }

        self.table
            .snapshot()
            .iter()
            .filter(|entry| entry.carries_token(token))
            .map(|entry| ProcessHandle(entry.pid))
            .collect()
    }

    /// Processes belonging to a slot: those tagged with `token`, or when none are,
    /// those naming `path` that are not tagged for some other slot.
    pub fn resolve(&self, path: &Path, token: &str) -> BTreeSet<ProcessHandle> {
        let snapshot = self.table.snapshot();

        if !token.is_empty() {
            let tagged: BTreeSet<_> = snapshot
                .iter()
                .filter(|entry| entry.carries_token(token))
                .map(|entry| ProcessHandle(entry.pid))
                .collect();
            if !tagged.is_empty() {
                trace!("token {token} matched {} process(es)", tagged.len());
                return tagged;
            }
        }

        let Some(target) = target_file_name(path) else {
            return BTreeSet::new();
        };

        snapshot
            .iter()
            .filter(|entry| entry.names_file(&target) && !entry.carries_foreign_token(token))
            .map(|entry| ProcessHandle(entry.pid))
            .collect()
    }

    /// All descendants of `root`, deepest first, excluding `root` itself.
    pub fn descendants_of(&self, root: ProcessHandle) -> Vec<ProcessHandle> {
        let snapshot = self.table.snapshot();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in &snapshot {
            if let Some(parent) = entry.parent {
                children.entry(parent).or_default().push(entry.pid);
            }
        }

        let mut ordered = Vec::new();
        let mut visited = HashSet::from([root.0]);
        collect_post_order(root.0, &children, &mut visited, &mut ordered);
        ordered
    }

    /// The subset of `pids` still present in the process table.
    pub fn still_alive(&self, pids: &BTreeSet<ProcessHandle>) -> BTreeSet<ProcessHandle> {
        if pids.is_empty() {
            return BTreeSet::new();
        }

        self.table
            .snapshot()
            .iter()
            .map(|entry| ProcessHandle(entry.pid))
            .filter(|handle| pids.contains(handle))
            .collect()
    }
}

fn collect_post_order(
    pid: u32,
    children: &HashMap<u32, Vec<u32>>,
    visited: &mut HashSet<u32>,
    ordered: &mut Vec<ProcessHandle>,
) {
    let Some(kids) = children.get(&pid) else {
        return;
    };

    for &child in kids {
        if visited.insert(child) {
            collect_post_order(child, children, visited, ordered);
            ordered.push(ProcessHandle(child));
        }
    }
}
