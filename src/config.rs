use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::domain::Region;
use crate::forecast::{RefreshPolicy, DEFAULT_OPEN_METEO_URL, DEFAULT_SMARD_URL};
use crate::ml::ModelConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub refresh: RefreshPolicy,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub regions: RegionsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub open_meteo_url: String,
    pub smard_url: String,
    pub http_timeout_seconds: u64,
    /// Replay fetched tables from this directory instead of the network.
    pub fixture_dir: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            open_meteo_url: DEFAULT_OPEN_METEO_URL.into(),
            smard_url: DEFAULT_SMARD_URL.into(),
            http_timeout_seconds: 30,
            fixture_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    pub enabled: Vec<Region>,
    pub default: Region,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![Region::DE, Region::AT],
            default: Region::DE,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("PREDICTOR__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.regions.enabled.is_empty() {
            anyhow::bail!("regions.enabled must list at least one region");
        }
        if !self.regions.enabled.contains(&self.regions.default) {
            anyhow::bail!(
                "default region {} is not in regions.enabled",
                self.regions.default
            );
        }
        if self.model.k == 0 {
            anyhow::bail!("model.k must be at least 1");
        }
        Ok(())
    }
}
