//! Monitor configuration.
//!
//! Settings come from an optional `fightwatch.toml`, then environment
//! overrides, then validation. Every field has a default so an empty or
//! missing file is a valid configuration.
//!
//! ```toml
//! [api]
//! base_url = "http://127.0.0.1:5000"
//! timeout_secs = 30
//!
//! [api.routes]
//! frame_predict = "/api/webcam/predict"
//!
//! [detection]
//! threshold = 0.4
//! positive_class = "fight"
//!
//! [sampler]
//! period_ms = 1000
//! camera_id = "lobby-1"
//!
//! [session]
//! path = ".fightwatch/session.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fightwatch_api::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use fightwatch_api_models::ApiRoutes;
use fightwatch_auth::DEFAULT_SESSION_PATH;
use fightwatch_incident_models::DEFAULT_INCIDENT_KIND;
use fightwatch_sampler::{DEFAULT_PERIOD, DEFAULT_THRESHOLD, DetectionPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "fightwatch.toml";

/// Overrides `api.base_url`.
pub const ENV_API_URL: &str = "FIGHTWATCH_API_URL";
/// Overrides `detection.threshold`.
pub const ENV_THRESHOLD: &str = "FIGHTWATCH_THRESHOLD";
/// Overrides `sampler.period_ms`.
pub const ENV_SAMPLE_PERIOD_MS: &str = "FIGHTWATCH_SAMPLE_PERIOD_MS";
/// Overrides `session.path`.
pub const ENV_SESSION_PATH: &str = "FIGHTWATCH_SESSION_PATH";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`MonitorConfig`].
    #[error("Invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Which value and why.
        message: String,
    },
}

/// Inference API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL the route paths are joined onto.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Endpoint paths.
    pub routes: ApiRoutes,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            routes: ApiRoutes::default(),
        }
    }
}

/// Incident decision settings, shared by live sampling and uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Confidence must be strictly greater than this.
    pub threshold: f64,
    /// Class label that counts as a detection.
    pub positive_class: String,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            positive_class: DEFAULT_INCIDENT_KIND.to_string(),
        }
    }
}

/// Live sampling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Milliseconds between ticks.
    pub period_ms: u64,
    /// Camera identifier stamped on webcam incidents.
    pub camera_id: Option<String>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            period_ms: u64::try_from(DEFAULT_PERIOD.as_millis()).unwrap_or(1000),
            camera_id: None,
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Where the logged-in user is stored.
    pub path: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SESSION_PATH),
        }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Inference API connection.
    pub api: ApiSettings,
    /// Incident decision.
    pub detection: DetectionSettings,
    /// Live sampling.
    pub sampler: SamplerSettings,
    /// Session persistence.
    pub session: SessionSettings,
}

impl MonitorConfig {
    /// Parses and validates TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out
    /// of range.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration the way the CLI does.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`]
    /// is used if present, defaults otherwise. Environment overrides are
    /// applied last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file cannot be read or parsed, an
    /// override is malformed, or a value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::read_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Applies `FIGHTWATCH_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric override does not
    /// parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(threshold) = lookup(ENV_THRESHOLD) {
            self.detection.threshold =
                threshold.trim().parse().map_err(|_| ConfigError::Invalid {
                    message: format!("{ENV_THRESHOLD}={threshold} is not a number"),
                })?;
        }
        if let Some(period) = lookup(ENV_SAMPLE_PERIOD_MS) {
            self.sampler.period_ms = period.trim().parse().map_err(|_| ConfigError::Invalid {
                message: format!("{ENV_SAMPLE_PERIOD_MS}={period} is not a whole number"),
            })?;
        }
        if let Some(path) = lookup(ENV_SESSION_PATH) {
            self.session.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if !(0.0..=1.0).contains(&self.detection.threshold) {
            return invalid(format!(
                "detection.threshold must be within [0, 1], got {}",
                self.detection.threshold
            ));
        }
        if self.detection.positive_class.trim().is_empty() {
            return invalid("detection.positive_class must not be empty".to_string());
        }
        if self.sampler.period_ms == 0 {
            return invalid("sampler.period_ms must be greater than 0".to_string());
        }
        if self.api.timeout_secs == 0 {
            return invalid("api.timeout_secs must be greater than 0".to_string());
        }
        if self.api.base_url.trim().is_empty() {
            return invalid("api.base_url must not be empty".to_string());
        }
        Ok(())
    }

    /// The incident decision policy.
    #[must_use]
    pub fn policy(&self) -> DetectionPolicy {
        DetectionPolicy::new(
            self.detection.threshold,
            self.detection.positive_class.clone(),
        )
    }

    /// Time between sampler ticks.
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.sampler.period_ms)
    }

    /// Per-request API timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
