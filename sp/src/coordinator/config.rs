//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long after its last poll an agent still counts as alive
    #[serde(rename = "registration-timeout-secs", default = "default_registration_timeout_secs")]
    pub registration_timeout_secs: u64,

    /// How often the agent registry is swept
    #[serde(rename = "gc-interval-secs", default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// Scrape timeout used when no hint header is present
    #[serde(rename = "default-scrape-timeout-ms", default = "default_scrape_timeout_ms")]
    pub default_scrape_timeout_ms: u64,

    /// Upper bound on any scrape timeout hint
    #[serde(rename = "max-scrape-timeout-ms", default = "default_max_scrape_timeout_ms")]
    pub max_scrape_timeout_ms: u64,
}

fn default_registration_timeout_secs() -> u64 {
    debug!("default_registration_timeout_secs: called");
    5 * 60
}

fn default_gc_interval_secs() -> u64 {
    debug!("default_gc_interval_secs: called");
    60
}

fn default_scrape_timeout_ms() -> u64 {
    debug!("default_scrape_timeout_ms: called");
    10_000
}

fn default_max_scrape_timeout_ms() -> u64 {
    debug!("default_max_scrape_timeout_ms: called");
    5 * 60 * 1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            registration_timeout_secs: default_registration_timeout_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            default_scrape_timeout_ms: default_scrape_timeout_ms(),
            max_scrape_timeout_ms: default_max_scrape_timeout_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Agent liveness window as a Duration
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    /// Registry sweep period as a Duration
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn default_scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.default_scrape_timeout_ms)
    }

    pub fn max_scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.max_scrape_timeout_ms)
    }
}
