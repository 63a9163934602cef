use crate::docker_repo::DEFAULT_REPROBE_EVERY_TICKS;
use crate::error::MonitorError;
use crate::thresholds::Thresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Used when neither `--config` nor `CONFIG_FILE` is given.
pub const DEFAULT_CONFIG_FILE: &str = "sysmon.toml";

pub const MIN_REFRESH_SECS: f64 = 0.5;
pub const MAX_REFRESH_SECS: f64 = 60.0;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between ticks; a lower bound, never overlapped.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_refresh_interval_secs() -> f64 {
    2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSort {
    #[default]
    Cpu,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default = "default_true")]
    pub processes: bool,
    #[serde(default = "default_true")]
    pub containers: bool,
    /// How many processes the snapshot lists.
    #[serde(default = "default_top_processes")]
    pub top_processes: usize,
    #[serde(default)]
    pub process_sort: ProcessSort,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            processes: true,
            containers: true,
            top_processes: default_top_processes(),
            process_sort: ProcessSort::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_top_processes() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Per-capture budget for the container runtime. Defaults to the refresh interval.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_reprobe_every_ticks")]
    pub reprobe_every_ticks: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            reprobe_every_ticks: default_reprobe_every_ticks(),
        }
    }
}

fn default_reprobe_every_ticks() -> u64 {
    DEFAULT_REPROBE_EVERY_TICKS
}

impl AppConfig {
    /// Load and validate from `path`, else `CONFIG_FILE`, else `sysmon.toml`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::load`] but leaves validation to the caller, so CLI
    /// overrides can be applied first. Only the implicit default file may be
    /// missing, in which case built-in defaults apply.
    pub fn read(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("CONFIG_FILE").ok().map(PathBuf::from));
        let path = match explicit {
            Some(p) => p,
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Ok(toml::from_str(&s)?)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitoring.refresh_interval_secs)
    }

    /// Container capture budget; falls back to the refresh interval.
    pub fn docker_timeout(&self) -> Duration {
        self.docker
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.refresh_interval())
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let refresh = self.monitoring.refresh_interval_secs;
        if !refresh.is_finite() || refresh <= 0.0 {
            return Err(MonitorError::ConfigInvalid(format!(
                "monitoring.refresh_interval_secs must be > 0, got {refresh}"
            )));
        }
        if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&refresh) {
            return Err(MonitorError::ConfigInvalid(format!(
                "monitoring.refresh_interval_secs must be between {MIN_REFRESH_SECS} and {MAX_REFRESH_SECS} seconds, got {refresh}"
            )));
        }
        self.thresholds.validate()?;
        if self.collectors.processes && self.collectors.top_processes == 0 {
            return Err(MonitorError::ConfigInvalid(
                "collectors.top_processes must be > 0 when processes are enabled".into(),
            ));
        }
        if self.docker.timeout_ms == Some(0) {
            return Err(MonitorError::ConfigInvalid(
                "docker.timeout_ms must be > 0".into(),
            ));
        }
        if self.docker.reprobe_every_ticks == 0 {
            return Err(MonitorError::ConfigInvalid(
                "docker.reprobe_every_ticks must be > 0".into(),
            ));
        }
        Ok(())
    }
}
