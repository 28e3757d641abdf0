use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const COINAPI_KEY_ENV: &str = "COINAPI_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub base_url: String,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CoinApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for CoinApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rest.coinapi.io".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko: CoinGeckoConfig,
    pub coinapi: CoinApiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    File,
    Fjall,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Overrides the platform cache directory.
    pub dir: Option<String>,
    pub ttl_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::File,
            dir: None,
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    /// Pause between per-coin calls to the alternate provider.
    pub alternate_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            backoff_base_ms: 500,
            alternate_delay_ms: 500,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn alternate_delay(&self) -> Duration {
        Duration::from_millis(self.alternate_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lookback_days: u32,
    pub risk_free_rate: f64,
    pub risk_method: String,
    /// Smallest tradeable quantity; 1.0 means whole units.
    pub unit_size: f64,
    pub allow_multi_source: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            risk_free_rate: 0.02,
            risk_method: "max_sharpe".to_string(),
            unit_size: 1.0,
            allow_multi_source: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub optimizer: OptimizerConfig,
    /// Symbol to owned amount.
    pub holdings: BTreeMap<String, f64>,
    /// Free-form; coerced by `Preferences::from_json`.
    pub preferences: serde_json::Value,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "coinfolio", "coinfolio")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.cache.dir {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.cache_dir().join("history"))
    }

    /// CoinAPI key from the config file, then the environment. Blank keys count as absent.
    pub fn coinapi_key(&self) -> Option<String> {
        self.providers
            .coinapi
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(COINAPI_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cache.ttl_hours))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
