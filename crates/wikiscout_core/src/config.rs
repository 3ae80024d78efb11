use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG_URL: &str = "https://wikistats.wmflabs.org/";
pub const DEFAULT_USER_AGENT: &str = "wikiscout/0.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONCURRENCY: usize = 64;
pub const DEFAULT_REGISTRY_PATH: &str = "data/endpoints.csv";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikiscout.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ScoutConfig {
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub registry: RegistrySection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CatalogSection {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ProbeSection {
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RegistrySection {
    pub path: Option<PathBuf>,
}

impl ScoutConfig {
    /// Catalog base URL: env WIKISCOUT_CATALOG_URL > config > default. Always ends with `/`.
    pub fn catalog_url(&self) -> String {
        let raw = env_string("WIKISCOUT_CATALOG_URL")
            .or_else(|| self.catalog.url.clone())
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());
        if raw.ends_with('/') {
            raw
        } else {
            format!("{raw}/")
        }
    }

    /// Per-request timeout: env WIKISCOUT_TIMEOUT_SECS > config > 60s.
    pub fn timeout(&self) -> Duration {
        let secs = env_parsed::<u64>("WIKISCOUT_TIMEOUT_SECS")
            .or(self.probe.timeout_secs)
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Probe worker count: env WIKISCOUT_CONCURRENCY > config > default, at least 1.
    pub fn concurrency(&self) -> usize {
        env_parsed::<usize>("WIKISCOUT_CONCURRENCY")
            .or(self.probe.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1)
    }

    pub fn user_agent(&self) -> String {
        env_string("WIKISCOUT_USER_AGENT")
            .or_else(|| self.probe.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Registry file: env WIKISCOUT_REGISTRY > config > `data/endpoints.csv`.
    pub fn registry_path(&self) -> PathBuf {
        env_string("WIKISCOUT_REGISTRY")
            .map(PathBuf::from)
            .or_else(|| self.registry.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH))
    }
}

/// Load and parse a ScoutConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ScoutConfig> {
    if !config_path.exists() {
        return Ok(ScoutConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ScoutConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_string(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}
