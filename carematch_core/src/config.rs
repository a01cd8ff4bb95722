//! Configuration file support for Carematch.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/carematch/config.toml`.
//! It is resolved once at startup and passed to the service; nothing reads
//! it from ambient global state afterwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub enrollment: EnrollmentConfig,

    #[serde(default)]
    pub seed: SeedConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger").join("enrollments.wal")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_dir().join("audit.wal")
    }

    pub fn audit_csv_path(&self) -> PathBuf {
        self.data_dir.join("audit.csv")
    }
}

/// Enrollment policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Reject enrollments where the patient's age is outside the program's range
    #[serde(default = "default_require_age_eligibility")]
    pub require_age_eligibility: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            require_age_eligibility: default_require_age_eligibility(),
        }
    }
}

/// Startup seed data
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_sample_programs")]
    pub sample_programs: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            sample_programs: default_sample_programs(),
        }
    }
}

/// Log output settings (RUST_LOG still wins)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("carematch")
}

fn default_require_age_eligibility() -> bool {
    true
}

fn default_sample_programs() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject settings that parse but make no sense
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::Config(format!(
                "unknown log level {:?}, expected one of {:?}",
                self.logging.level, LOG_LEVELS
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("carematch").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
