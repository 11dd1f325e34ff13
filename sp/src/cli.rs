//! CLI definition

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// scrapeproxy - lets a central scraper reach agents behind NAT
#[derive(Debug, Parser)]
#[command(
    name = "sp",
    about = "Rendezvous proxy between scrapers and polling agents",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Agents long-poll POST /poll and answer on POST /push; scrapers use this server as an HTTP proxy."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Override server.listen-address
    #[arg(short, long, value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Override coordinator.registration-timeout-secs
    #[arg(long, value_name = "SECS")]
    pub registration_timeout: Option<u64>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.listen_address {
            config.server.listen_address = addr.clone();
        }
        if let Some(secs) = self.registration_timeout {
            config.coordinator.registration_timeout_secs = secs;
        }
    }
}
