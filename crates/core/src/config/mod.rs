//! Cache configuration with layered loading.
//!
//! Uses figment to merge, from lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if CACHET_CONFIG_FILE set)
//! 3. Environment variables (CACHET_*)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Settings for the cache, its storage backend and the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via CACHET_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Redis URL; when set, a networked provider may be used instead of SQLite.
    ///
    /// Set via CACHET_REDIS_URL environment variable.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// User-Agent string for outbound requests.
    ///
    /// Set via CACHET_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via CACHET_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body size in bytes.
    ///
    /// Set via CACHET_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirects the transport follows.
    ///
    /// Set via CACHET_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// TTL hint handed to the storage provider on every write, in seconds.
    /// Zero leaves expiry entirely to the entry's own `Expires` header.
    ///
    /// Set via CACHET_TTL_HINT_SECS environment variable.
    #[serde(default)]
    pub ttl_hint_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachet.sqlite")
}

fn default_user_agent() -> String {
    "cachet/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            redis_url: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
            ttl_hint_secs: 0,
        }
    }
}

impl CacheConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// TTL hint as Duration; `Duration::ZERO` when unset.
    pub fn ttl_hint(&self) -> Duration {
        Duration::from_secs(self.ttl_hint_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The merged figment before extraction.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CACHET_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("CACHET_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Extract and validate a configuration from `figment`.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
