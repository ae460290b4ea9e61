//! Configuration management for botpool.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::{
    constants::{
        ACTIVITY_LOG_FILE_NAME, DEFAULT_SLOT_COUNT, DEFAULT_TOKEN_PREFIX,
        ELAPSED_TICK_INTERVAL, OUTPUT_DIR_NAME, RESTART_STOP_CHECKS,
        RESTART_STOP_INTERVAL, SETTINGS_FILE_NAME, SLOT_STORE_FILE_NAME, STOP_GRACE,
    },
    error::SupervisorError,
    runtime,
};

/// Raw structure of the settings file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    slots: Option<usize>,
    state_dir: Option<String>,
    token_prefix: Option<String>,
    stop_grace: Option<String>,
    restart: Option<RawRestart>,
    status_interval: Option<String>,
    elapsed_interval: Option<String>,
    terminal: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRestart {
    attempts: Option<usize>,
    interval: Option<String>,
}

/// How a restart waits for the previous instance to disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Number of post-stop checks.
    pub attempts: usize,
    /// Delay between checks.
    pub interval: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            attempts: RESTART_STOP_CHECKS,
            interval: RESTART_STOP_INTERVAL,
        }
    }
}

/// Resolved supervisor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Fixed number of slots in the pool.
    pub slots: usize,
    /// Directory holding the slot store, the activity log and bot output.
    pub state_dir: PathBuf,
    /// Prefix of each slot's session token.
    pub token_prefix: String,
    /// Time between SIGTERM and SIGKILL when stopping.
    pub stop_grace: Duration,
    /// Post-stop verification used by restart.
    pub restart: RestartPolicy,
    /// Optional period of the recurring status refresh.
    pub status_interval: Option<Duration>,
    /// Period of the elapsed-time readout.
    pub elapsed_interval: Duration,
    /// Optional terminal wrapper, e.g. `["xterm", "-T", "{token}", "-e"]`.
    pub terminal: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOT_COUNT,
            state_dir: runtime::state_dir(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            stop_grace: STOP_GRACE,
            restart: RestartPolicy::default(),
            status_interval: None,
            elapsed_interval: ELAPSED_TICK_INTERVAL,
            terminal: None,
        }
    }
}

impl Settings {
    /// Location of the persisted slot configuration.
    pub fn slot_store_path(&self) -> PathBuf {
        self.state_dir.join(SLOT_STORE_FILE_NAME)
    }

    /// Location of the activity log.
    pub fn activity_log_path(&self) -> PathBuf {
        self.state_dir.join(ACTIVITY_LOG_FILE_NAME)
    }

    /// Directory receiving each bot's stdout/stderr.
    pub fn output_dir(&self) -> PathBuf {
        self.state_dir.join(OUTPUT_DIR_NAME)
    }

    /// Session token for a zero-based slot index.
    pub fn token_for(&self, slot: usize) -> String {
        format!("{}-{}", self.token_prefix, slot + 1)
    }

    fn from_raw(raw: RawSettings, base: &Path) -> Result<Self, SupervisorError> {
        let defaults = Self::default();

        let slots = raw.slots.unwrap_or(defaults.slots);
        if slots == 0 {
            return Err(SupervisorError::InvalidSetting(
                "slots must be at least 1".into(),
            ));
        }

        let state_dir = match raw.state_dir {
            Some(dir) => {
                let path = PathBuf::from(dir);
                if path.is_absolute() {
                    path
                } else {
                    base.join(path)
                }
            }
            None => defaults.state_dir,
        };

        let token_prefix = match raw.token_prefix {
            Some(prefix) if prefix.trim().is_empty() => {
                return Err(SupervisorError::InvalidSetting(
                    "token_prefix cannot be empty".into(),
                ));
            }
            Some(prefix) => prefix.trim().to_string(),
            None => defaults.token_prefix,
        };

        let restart = match raw.restart {
            Some(restart) => RestartPolicy {
                attempts: restart.attempts.unwrap_or(RESTART_STOP_CHECKS),
                interval: restart
                    .interval
                    .as_deref()
                    .map(parse_duration)
                    .transpose()?
                    .unwrap_or(RESTART_STOP_INTERVAL),
            },
            None => defaults.restart,
        };

        let elapsed_interval = raw
            .elapsed_interval
            .as_deref()
            .map(parse_duration)
            .transpose()?
            .unwrap_or(defaults.elapsed_interval);
        if elapsed_interval.is_zero() {
            return Err(SupervisorError::InvalidSetting(
                "elapsed_interval must be greater than zero".into(),
            ));
        }

        let status_interval = raw
            .status_interval
            .as_deref()
            .map(parse_duration)
            .transpose()?
            .filter(|interval| !interval.is_zero());

        let terminal = match raw.terminal {
            Some(argv) if argv.is_empty() => None,
            other => other,
        };

        Ok(Self {
            slots,
            state_dir,
            token_prefix,
            stop_grace: raw
                .stop_grace
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.stop_grace),
            restart,
            status_interval,
            elapsed_interval,
            terminal,
        })
    }
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, SupervisorError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(SupervisorError::InvalidSetting(
            "Duration value cannot be empty".into(),
        ));
    }

    let invalid = || SupervisorError::InvalidSetting(format!("Invalid duration value: '{raw}'"));

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

/// Expands `$VAR` and `${VAR}` references within a string.
fn expand_env_vars(input: &str) -> Result<String, SupervisorError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")
        .map_err(|err| SupervisorError::InvalidSetting(err.to_string()))?;

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(SupervisorError::InvalidSetting(format!(
            "Missing environment variable: {var_name}"
        ))),
        None => Ok(result.to_string()),
    }
}

/// Finds the settings file: an explicit path, then the working directory, then the config dirs.
fn locate_settings(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(SETTINGS_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    runtime::config_dirs()
        .into_iter()
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .find(|candidate| candidate.exists())
}

/// Loads and parses the settings file, expanding environment variables.
///
/// An explicit path must exist; otherwise a missing file yields the defaults.
pub fn load_settings(settings_path: Option<&str>) -> Result<Settings, SupervisorError> {
    let Some(path) = locate_settings(settings_path) else {
        debug!("No settings file found; using defaults");
        return Ok(Settings::default());
    };

    let content = fs::read_to_string(&path).map_err(|e| {
        SupervisorError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, path.display()),
        ))
    })?;

    let expanded = expand_env_vars(&content)?;
    let raw: RawSettings = if expanded.trim().is_empty() {
        RawSettings::default()
    } else {
        serde_yaml::from_str(&expanded).map_err(SupervisorError::ConfigParseError)?
    };

    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    debug!("Loaded settings from {}", path.display());
    Settings::from_raw(raw, &base)
}
