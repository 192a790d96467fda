// src/config/mod.rs
//! Explicit configuration objects handed to each stage at construction.
//!
//! Precedence: defaults < TOML file < environment < CLI flags (applied by the binary).

pub mod classifier;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use classifier::{BackendKind, ClassifierConfig};

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_WEBHOOK_URL: &str = "SENTIMENT_WEBHOOK_URL";
pub const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const ENV_THRESHOLD: &str = "CRITICAL_SCORE_THRESHOLD";
pub const ENV_WINDOW_HOURS: &str = "TIME_WINDOW_HOURS";
pub const ENV_HORIZON: &str = "FORECAST_HORIZON_DAYS";

pub const DEFAULT_THRESHOLD: f64 = -0.4;
pub const DEFAULT_WINDOW_HOURS: u32 = 24;
pub const DEFAULT_HORIZON: usize = 30;
pub const MAX_HORIZON_DAYS: usize = 3650;

/// Which periodic components the forecaster fits. Daily seasonality has no meaning on a
/// one-point-per-day series and is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Seasonality {
    pub weekly: bool,
    pub yearly: bool,
}

impl Default for Seasonality {
    fn default() -> Self {
        Self {
            weekly: true,
            yearly: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    pub critical_threshold: f64,
    pub window_hours: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            critical_threshold: DEFAULT_THRESHOLD,
            window_hours: DEFAULT_WINDOW_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub seasonality: Seasonality,
    /// Width of the uncertainty interval, as a probability mass.
    pub interval_width: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON,
            seasonality: Seasonality::default(),
            interval_width: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub monitor: MonitorConfig,
    pub forecast: ForecastConfig,
    pub webhook_url: Option<String>,
    pub classifier: ClassifierConfig,
}

/// On-disk shape of `config/pipeline.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    critical_threshold: Option<f64>,
    window_hours: Option<u32>,
    forecast_horizon: Option<usize>,
    weekly_seasonality: Option<bool>,
    yearly_seasonality: Option<bool>,
    interval_width: Option<f64>,
    webhook_url: Option<String>,
    classifier: Option<classifier::FileClassifierConfig>,
}

impl PipelineConfig {
    /// Defaults, then the optional config file, then environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), but an explicit file (CLI `--config`) wins over the
    /// environment lookup and must exist.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        let path = match explicit {
            Some(p) if !p.exists() => {
                return Err(anyhow!("config file {} does not exist", p.display()))
            }
            Some(p) => Some(p.to_path_buf()),
            None => config_file_path()?,
        };
        if let Some(path) = path {
            cfg.merge_file(&path)?;
        }
        cfg.merge_env();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        cfg.merge_file(path)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let file: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;

        if let Some(v) = file.critical_threshold {
            self.monitor.critical_threshold = v;
        }
        if let Some(v) = file.window_hours {
            self.monitor.window_hours = v;
        }
        if let Some(v) = file.forecast_horizon {
            self.forecast.horizon_days = v;
        }
        if let Some(v) = file.weekly_seasonality {
            self.forecast.seasonality.weekly = v;
        }
        if let Some(v) = file.yearly_seasonality {
            self.forecast.seasonality.yearly = v;
        }
        if let Some(v) = file.interval_width {
            self.forecast.interval_width = v;
        }
        if file.webhook_url.is_some() {
            self.webhook_url = file.webhook_url;
        }
        if let Some(c) = file.classifier {
            self.classifier.merge_file(c)?;
        }
        tracing::debug!(path = %path.display(), "merged config file");
        Ok(())
    }

    fn merge_env(&mut self) {
        if let Some(v) = env_parse::<f64>(ENV_THRESHOLD) {
            self.monitor.critical_threshold = v;
        }
        if let Some(v) = env_parse::<u32>(ENV_WINDOW_HOURS) {
            self.monitor.window_hours = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_HORIZON) {
            self.forecast.horizon_days = v;
        }
        if let Some(url) = env_string(ENV_WEBHOOK_URL).or_else(|| env_string(ENV_SLACK_WEBHOOK_URL))
        {
            self.webhook_url = Some(url);
        }
        self.classifier.merge_env();
    }

    /// Replace values that would make a stage meaningless with defaults.
    pub fn sanitize(&mut self) {
        if !self.monitor.critical_threshold.is_finite() {
            tracing::warn!(
                value = self.monitor.critical_threshold,
                "non-finite critical threshold, using default"
            );
            self.monitor.critical_threshold = DEFAULT_THRESHOLD;
        }
        if self.monitor.window_hours == 0 {
            tracing::warn!("zero-hour monitoring window, using default");
            self.monitor.window_hours = DEFAULT_WINDOW_HOURS;
        }
        if !(self.forecast.interval_width > 0.0 && self.forecast.interval_width < 1.0) {
            tracing::warn!(
                value = self.forecast.interval_width,
                "interval width outside (0, 1), using 0.8"
            );
            self.forecast.interval_width = 0.8;
        }
        if self.forecast.horizon_days > MAX_HORIZON_DAYS {
            tracing::warn!(
                value = self.forecast.horizon_days,
                max = MAX_HORIZON_DAYS,
                "forecast horizon too long, capping"
            );
            self.forecast.horizon_days = MAX_HORIZON_DAYS;
        }
        if self
            .webhook_url
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            self.webhook_url = None;
        }
        self.classifier.sanitize();
    }
}

/// Resolve the config file:
/// 1) $PIPELINE_CONFIG_PATH (must exist)
/// 2) config/pipeline.toml if present
fn config_file_path() -> Result<Option<PathBuf>> {
    if let Some(p) = env_string(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        ));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an env var; unparseable values are ignored with a warning.
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}
