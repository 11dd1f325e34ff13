//! scrapeproxy configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;

/// Main scrapeproxy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Rendezvous coordinator configuration
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;

        if self.coordinator.registration_timeout_secs == 0 {
            return Err(eyre::eyre!("coordinator.registration-timeout-secs must be greater than 0"));
        }
        if self.coordinator.gc_interval_secs == 0 {
            return Err(eyre::eyre!("coordinator.gc-interval-secs must be greater than 0"));
        }
        if self.coordinator.default_scrape_timeout_ms == 0 || self.coordinator.max_scrape_timeout_ms == 0 {
            return Err(eyre::eyre!("coordinator scrape timeouts must be greater than 0"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// `./.scrapeproxy.yml` and `<config dir>/scrapeproxy/scrapeproxy.yml`
    /// wins; a broken candidate is logged and skipped.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let found = Self::candidate_paths().into_iter().find_map(|path| Self::try_load(&path));
        Ok(found.unwrap_or_else(|| {
            tracing::info!("No config file found, using defaults");
            Self::default()
        }))
    }

    /// Implicit config locations, most specific first
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".scrapeproxy.yml")];
        paths.extend(dirs::config_dir().map(|dir| dir.join("scrapeproxy").join("scrapeproxy.yml")));
        paths
    }

    /// Load `path` if it exists; `None` when missing or unusable
    fn try_load(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .inspect_err(|e| tracing::warn!("Skipping config {}: {:#}", path.display(), e))
            .ok()
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on for callers and agents
    #[serde(rename = "listen-address")]
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address
            .parse()
            .context(format!("Invalid listen-address {:?}", self.listen_address))
    }
}
