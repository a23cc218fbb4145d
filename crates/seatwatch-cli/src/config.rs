//! Configuration loading, environment overrides and validation.
//!
//! Resolution order for the config file: `--config` flag, `SEATWATCH_CONFIG`,
//! `./seatwatch.json`, then `~/.seatwatch/config.json`. Secrets can be kept
//! out of the file with `SEATWATCH_USERNAME`, `SEATWATCH_PASSWORD` and
//! `PUSHBULLET_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use seatwatch::{ActionMode, ExtractionRules, Semester, TrackedCourses, TrackingConfig};

pub const DEFAULT_PORTAL_URL: &str = "https://oes.rmit.edu.vn/";
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Named extraction layouts, or a fully spelled-out one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RulesConfig {
    Preset(RulePreset),
    Custom(ExtractionRules),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePreset {
    Annotated,
    Plain,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig::Preset(RulePreset::Annotated)
    }
}

impl RulesConfig {
    pub fn resolve(&self) -> ExtractionRules {
        match self {
            RulesConfig::Preset(RulePreset::Annotated) => ExtractionRules::annotated(),
            RulesConfig::Preset(RulePreset::Plain) => ExtractionRules::plain(),
            RulesConfig::Custom(rules) => *rules,
        }
    }
}

/// Operator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pushbullet_token: Option<String>,
    /// Push API URL; the public Pushbullet endpoint when unset.
    pub pushbullet_endpoint: Option<String>,
    pub refresh_secs: u64,
    pub semester: u8,
    pub mode: ActionMode,
    pub tracked: TrackedCourses,
    pub rules: RulesConfig,
    pub session_file: Option<PathBuf>,
    pub max_consecutive_failures: u32,
    pub timeout_ms: u64,
    pub accept_invalid_certs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            username: None,
            password: None,
            pushbullet_token: None,
            pushbullet_endpoint: None,
            refresh_secs: DEFAULT_REFRESH_SECS,
            semester: 1,
            mode: ActionMode::Notify,
            tracked: TrackedCourses::default(),
            rules: RulesConfig::default(),
            session_file: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            accept_invalid_certs: false,
        }
    }
}

/// Flag values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub semester: Option<u8>,
    pub mode: Option<ActionMode>,
    pub refresh_secs: Option<u64>,
}

/// Resolve the config file path.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("SEATWATCH_CONFIG") {
        return PathBuf::from(env_path);
    }

    let cwd_config = PathBuf::from("seatwatch.json");
    if cwd_config.exists() {
        return cwd_config;
    }

    data_dir().join("config.json")
}

/// `~/.seatwatch`, or `./.seatwatch` when there is no home directory.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seatwatch")
}

impl Config {
    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Load from the resolved path, then apply environment and flag overrides.
    pub fn load(explicit: Option<&str>, overrides: &Overrides) -> Result<Self> {
        let path = resolve_config_path(explicit);
        tracing::debug!("loading config from {}", path.display());
        let mut config = Self::from_file(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Fill secrets from the environment. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SEATWATCH_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = lookup("SEATWATCH_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = lookup("PUSHBULLET_TOKEN") {
            self.pushbullet_token = Some(v);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(s) = overrides.semester {
            self.semester = s;
        }
        if let Some(m) = overrides.mode {
            self.mode = m;
        }
        if let Some(r) = overrides.refresh_secs {
            self.refresh_secs = r;
        }
    }

    /// Reject settings the tracker cannot run with.
    pub fn validate(&self) -> Result<()> {
        Semester::new(self.semester)?;
        if self.refresh_secs == 0 {
            bail!("refresh_secs must be at least 1");
        }
        if self.tracked.is_empty() {
            bail!("no tracked courses configured");
        }
        url::Url::parse(&self.portal_url)
            .with_context(|| format!("invalid portal_url '{}'", self.portal_url))?;
        if self.mode == ActionMode::Notify && self.pushbullet_token.as_deref().unwrap_or("").is_empty() {
            bail!("notify mode needs pushbullet_token (or PUSHBULLET_TOKEN)");
        }
        self.credentials()?;
        Ok(())
    }

    /// Portal login credentials.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Ok((u, p)),
            _ => bail!("portal username and password are required (SEATWATCH_USERNAME / SEATWATCH_PASSWORD)"),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| data_dir().join("session.json"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Settings for the tracking loop.
    pub fn tracking_config(&self) -> Result<TrackingConfig> {
        let semester = Semester::new(self.semester)?;
        Ok(TrackingConfig::new(semester, self.mode, self.tracked.clone())
            .with_refresh_interval(Duration::from_secs(self.refresh_secs))
            .with_max_consecutive_failures(self.max_consecutive_failures)
            .with_rules(self.rules.resolve()))
    }
}
