//! Configuration management.
//!
//! Configuration is stored at `~/.config/menusync/config.json`. Missing
//! fields take their defaults, and a couple of settings can be overridden
//! from the environment (see [`Config::with_env_overrides`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::ResourceClass;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "menusync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "MENUSYNC_API_URL";
pub const ENV_PRELOAD_TIMEOUT: &str = "MENUSYNC_PRELOAD_TIMEOUT_SECS";

const DEFAULT_API_BASE_URL: &str = "https://api.menusync.app/v1";

/// Per-class refresh cooldowns, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cooldowns {
    pub restaurants_secs: u64,
    pub products_secs: u64,
    pub orders_secs: u64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            restaurants_secs: 30,
            products_secs: 60,
            orders_secs: 15,
        }
    }
}

impl Cooldowns {
    pub fn for_class(&self, class: ResourceClass) -> Duration {
        Duration::from_secs(match class {
            ResourceClass::Restaurant => self.restaurants_secs,
            ResourceClass::Product => self.products_secs,
            ResourceClass::Order => self.orders_secs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub cooldowns: Cooldowns,
    /// How old an enriched record may be before it is fetched again.
    pub enrichment_freshness_secs: u64,
    pub preload_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            cooldowns: Cooldowns::default(),
            enrichment_freshness_secs: 300,
            preload_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply `MENUSYNC_API_URL` and `MENUSYNC_PRELOAD_TIMEOUT_SECS`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_PRELOAD_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.preload_timeout_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_PRELOAD_TIMEOUT),
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn enrichment_freshness(&self) -> Duration {
        Duration::from_secs(self.enrichment_freshness_secs)
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_secs(self.preload_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "http://localhost:8080", "cooldowns": {"orders_secs": 5}}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.cooldowns.orders_secs, 5);
        assert_eq!(config.cooldowns.restaurants_secs, 30);
        assert_eq!(config.preload_timeout_secs, 5);
    }

    #[test]
    fn test_cooldown_per_class() {
        let cooldowns = Cooldowns::default();
        assert_eq!(cooldowns.for_class(ResourceClass::Restaurant), Duration::from_secs(30));
        assert_eq!(cooldowns.for_class(ResourceClass::Product), Duration::from_secs(60));
        assert_eq!(cooldowns.for_class(ResourceClass::Order), Duration::from_secs(15));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, " http://staging.local/api "),
            (ENV_PRELOAD_TIMEOUT, "9"),
        ]);
        let config = Config::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://staging.local/api");
        assert_eq!(config.preload_timeout(), Duration::from_secs(9));

        let bad: HashMap<&str, &str> = HashMap::from([(ENV_PRELOAD_TIMEOUT, "soon")]);
        let config = Config::default().with_overrides(|k| bad.get(k).map(|v| v.to_string()));
        assert_eq!(config.preload_timeout_secs, 5);
    }

    #[test]
    fn test_save_load_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("menusync-config-{}", std::process::id()))
            .join(CONFIG_FILE);
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.enrichment_freshness_secs = 60;
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
