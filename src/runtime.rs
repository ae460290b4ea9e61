//! Runtime paths.
#[cfg(test)]
use std::path::Path;
use std::{
    env,
    path::PathBuf,
    sync::{OnceLock, RwLock},
};

#[derive(Debug, Clone)]
struct RuntimeContext {
    state_dir: PathBuf,
    config_dirs: Vec<PathBuf>,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::user_directories()))
}

impl RuntimeContext {
    fn user_directories() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::from_user_home(home)
    }

    fn from_user_home(home: PathBuf) -> Self {
        Self {
            state_dir: home.join(".local/share/botpool"),
            config_dirs: vec![home.join(".config/botpool")],
        }
    }
}

/// Re-reads `HOME` and rebuilds the runtime paths.
pub fn init() {
    let mut guard = context_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = RuntimeContext::user_directories();
}

#[cfg(test)]
pub fn init_with_test_home(home: &Path) {
    let mut guard = context_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = RuntimeContext::from_user_home(home.to_path_buf());
}

/// State dir (slot store, activity log, bot output).
pub fn state_dir() -> PathBuf {
    context_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .state_dir
        .clone()
}

/// Config search paths.
pub fn config_dirs() -> Vec<PathBuf> {
    context_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .config_dirs
        .clone()
}
