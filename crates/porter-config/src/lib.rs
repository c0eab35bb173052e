//! Configuration for porter tools.
//!
//! Named robot profiles plus retry/controller tuning, loaded with figment
//! (TOML file + `PORTER_` environment overrides) and translated into
//! `porter_core` types. A missing config file yields the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use porter_core::{ControllerSettings, DEFAULT_PORT, RetryPolicy};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to serialize config: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown robot '{name}' (known robots: {known})")]
    UnknownRobot { name: String, known: String },

    #[error("no robot named and no default_robot configured")]
    NoDefaultRobot,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Robot to use when a command names none.
    pub default_robot: Option<String>,

    /// Named robot profiles.
    #[serde(default)]
    pub robots: BTreeMap<String, RobotProfile>,

    /// Remote-call retry tuning.
    #[serde(default)]
    pub retry: RetrySection,

    /// State-poller and executor tuning.
    #[serde(default)]
    pub controller: ControllerSection,
}

impl Config {
    /// The `host:port` target for `name`, falling back to
    /// `default_robot` when `name` is `None`.
    pub fn robot_target(&self, name: Option<&str>) -> Result<String, ConfigError> {
        let name = name
            .or_else(|| self.default_robot.as_deref())
            .ok_or(ConfigError::NoDefaultRobot)?;
        self.robots
            .get(name)
            .map(RobotProfile::target)
            .ok_or_else(|| ConfigError::UnknownRobot {
                name: name.to_owned(),
                known: if self.robots.is_empty() {
                    "none".to_owned()
                } else {
                    self.robots.keys().cloned().collect::<Vec<_>>().join(", ")
                },
            })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        self.controller.to_settings()
    }
}

/// A named robot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotProfile {
    /// Hostname or IP of the robot.
    pub host: String,

    /// Control port; the robot's default when absent.
    pub port: Option<u16>,

    /// Per-robot override of the overall command timeout.
    pub command_timeout_secs: Option<f64>,
}

impl RobotProfile {
    /// The `host:port` target string for this robot.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(DEFAULT_PORT))
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: secs(self.base_delay_secs, defaults.base_delay),
            max_delay: secs(self.max_delay_secs, defaults.max_delay),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_secs() -> f64 {
    1.0
}
fn default_max_delay_secs() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerSection {
    #[serde(default = "default_fast_interval_secs")]
    pub fast_interval_secs: f64,

    #[serde(default = "default_slow_interval_secs")]
    pub slow_interval_secs: f64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            fast_interval_secs: default_fast_interval_secs(),
            slow_interval_secs: default_slow_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl ControllerSection {
    /// Settings for `porter_core`, keeping its defaults for the fields
    /// this section does not cover.
    pub fn to_settings(&self) -> ControllerSettings {
        let defaults = ControllerSettings::default();
        ControllerSettings {
            fast_interval: secs(self.fast_interval_secs, defaults.fast_interval),
            slow_interval: secs(self.slow_interval_secs, defaults.slow_interval),
            poll_interval: secs(self.poll_interval_secs, defaults.poll_interval),
            retry_delay: secs(self.retry_delay_secs, defaults.retry_delay),
            ..defaults
        }
    }
}

fn default_fast_interval_secs() -> f64 {
    1.0
}
fn default_slow_interval_secs() -> f64 {
    30.0
}
fn default_poll_interval_secs() -> f64 {
    1.0
}
fn default_retry_delay_secs() -> f64 {
    1.0
}

/// Seconds-as-f64 to `Duration`, falling back on nonsense values
/// (negative, NaN) instead of panicking.
fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "porterbotics", "porter").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("porter");
    p
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load from the canonical config path plus `PORTER_` env overrides.
pub fn load() -> Result<Config, ConfigError> {
    load_from(default_config_path())
}

/// Load from an explicit path. Layering, lowest to highest: built-in
/// defaults, the TOML file (skipped when missing), then `PORTER_`
/// environment variables with `__` as the nesting separator (e.g.
/// `PORTER_RETRY__MAX_ATTEMPTS=5`).
pub fn load_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("PORTER_").split("__"));
    Ok(figment.extract()?)
}

/// Serialize to pretty TOML at `path`, creating parent directories.
pub fn save_to(config: &Config, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
