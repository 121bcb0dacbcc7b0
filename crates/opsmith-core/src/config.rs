use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{OpsError, Result};

/// Top-level configuration for the opsmith engine.
///
/// Loaded from `~/.opsmith/config.toml` by default. Each section corresponds
/// to one subsystem or cross-cutting concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub categorize: CategorizeConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            confirmation: ConfirmationConfig::default(),
            import: ImportConfig::default(),
            categorize: CategorizeConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl OpsConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OpsConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| OpsError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.opsmith/opsmith.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Confirmation workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Minutes a pending invocation stays confirmable before it expires.
    pub ttl_minutes: u32,
    /// Seconds between expiry sweeps of the pending queue.
    pub sweep_interval_seconds: u64,
}

impl ConfirmationConfig {
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_minutes as i64 * 60
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 15,
            sweep_interval_seconds: 60,
        }
    }
}

/// Bank statement import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Description characters fed into the row fingerprint.
    pub fingerprint_prefix_len: usize,
    /// Description characters used for the fuzzy duplicate probe against
    /// already-persisted movements.
    pub fuzzy_prefix_len: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fingerprint_prefix_len: 50,
            fuzzy_prefix_len: 20,
        }
    }
}

/// Category suggestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizeConfig {
    /// Minimum suggestion confidence required to apply a category.
    pub min_confidence: f64,
}

impl Default for CategorizeConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
        }
    }
}

/// Report builder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Share of total spend at which a single category triggers a
    /// concentration warning (0.0 to 1.0).
    pub concentration_share: f64,
    /// Number of categories listed in the breakdown.
    pub top_categories: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            concentration_share: 0.40,
            top_categories: 5,
        }
    }
}
