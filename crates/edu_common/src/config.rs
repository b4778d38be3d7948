//! EduAI core configuration
//!
//! Configuration lives in /etc/eduai/config.toml
//!
//! Every section is optional; missing keys fall back to defaults. Numeric
//! settings with a valid range are read through `effective_*` accessors that
//! clamp out-of-range values instead of rejecting the file.

use anyhow::{Context, Result};
use edu_shared::achievements::{default_achievements, AchievementCatalog, AchievementDef};
use edu_shared::activity::XpTable;
use edu_shared::levels::{LevelTable, DEFAULT_BASE_XP, DEFAULT_MAX_LEVEL};
use edu_shared::streaks::DayBoundary;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/eduai";
const CONFIG_FILE: &str = "config.toml";

/// Data directory for the database and rendered certificates
pub const DATA_DIR: &str = "/var/lib/eduai";

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a writer waits for the database lock (milliseconds)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DATA_DIR).join("eduai.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseSettings {
    /// Clamp busy timeout to 100ms - 60s
    pub fn effective_busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.clamp(100, 60_000)
    }
}

/// Progress engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSettings {
    /// XP per activity kind
    #[serde(default)]
    pub xp: XpTable,

    /// Base XP of the quadratic level curve
    #[serde(default = "default_level_base_xp")]
    pub level_base_xp: u64,

    /// Highest reachable level (valid: 1-1000)
    #[serde(default = "default_max_level")]
    pub max_level: u32,

    /// Explicit thresholds; overrides the curve when present
    #[serde(default)]
    pub level_thresholds: Option<Vec<u64>>,

    /// Offset from UTC used to decide calendar days for streaks
    #[serde(default)]
    pub streak_utc_offset_minutes: i32,

    /// Award bonus XP when a streak grows
    #[serde(default = "default_streak_bonus_enabled")]
    pub streak_bonus_enabled: bool,
}

fn default_level_base_xp() -> u64 {
    DEFAULT_BASE_XP
}

fn default_max_level() -> u32 {
    DEFAULT_MAX_LEVEL
}

fn default_streak_bonus_enabled() -> bool {
    true
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            xp: XpTable::default(),
            level_base_xp: default_level_base_xp(),
            max_level: default_max_level(),
            level_thresholds: None,
            streak_utc_offset_minutes: 0,
            streak_bonus_enabled: default_streak_bonus_enabled(),
        }
    }
}

impl ProgressSettings {
    /// Clamp max_level to 1-1000
    pub fn effective_max_level(&self) -> u32 {
        self.max_level.clamp(1, 1_000)
    }

    /// Clamp the streak offset to +/- 14 hours
    pub fn effective_utc_offset_minutes(&self) -> i32 {
        self.streak_utc_offset_minutes.clamp(-14 * 60, 14 * 60)
    }

    pub fn level_table(&self) -> Result<LevelTable> {
        match &self.level_thresholds {
            Some(thresholds) => LevelTable::from_thresholds(thresholds.clone())
                .context("Invalid progress.level_thresholds"),
            None => Ok(LevelTable::quadratic(
                self.level_base_xp,
                self.effective_max_level(),
            )),
        }
    }

    pub fn day_boundary(&self) -> DayBoundary {
        DayBoundary::from_offset_minutes(self.effective_utc_offset_minutes())
    }
}

/// Certificate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSettings {
    /// Enrollment progress (percent) required before issuing
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f64,
}

fn default_completion_threshold() -> f64 {
    100.0
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
        }
    }
}

impl CertificateSettings {
    pub fn effective_completion_threshold(&self) -> f64 {
        if self.completion_threshold.is_nan() {
            return default_completion_threshold();
        }
        self.completion_threshold.clamp(0.0, 100.0)
    }
}

/// Background worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Seconds between outbox polls (valid: 1-300)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Tasks claimed per poll (valid: 1-500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds a claimed task stays invisible to other workers
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Where rendered certificates are written
    #[serde(default = "default_render_dir")]
    pub render_dir: PathBuf,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> usize {
    25
}

fn default_lease_secs() -> u64 {
    60
}

fn default_render_dir() -> PathBuf {
    PathBuf::from(DATA_DIR).join("certificates")
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            render_dir: default_render_dir(),
        }
    }
}

impl WorkerSettings {
    pub fn effective_poll_interval(&self) -> u64 {
        self.poll_interval_secs.clamp(1, 300)
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, 500)
    }

    pub fn effective_lease_secs(&self) -> u64 {
        self.lease_secs.clamp(5, 3_600)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// tracing-subscriber filter directive; RUST_LOG wins when set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EduConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub progress: ProgressSettings,

    /// Achievement catalog; the seed set when omitted
    #[serde(default = "default_achievements")]
    pub achievements: Vec<AchievementDef>,

    #[serde(default)]
    pub certificates: CertificateSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for EduConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            progress: ProgressSettings::default(),
            achievements: default_achievements(),
            certificates: CertificateSettings::default(),
            worker: WorkerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EduConfig {
    /// Default config file path
    pub fn config_path() -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load from an explicit path. Errors if the file is unreadable or
    /// invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if given, else from the system path when it exists,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EduConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that cannot be expressed as clamping
    pub fn validate(&self) -> Result<()> {
        self.progress.level_table()?;
        self.catalog()?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<AchievementCatalog> {
        AchievementCatalog::new(self.achievements.clone()).context("Invalid achievements")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
