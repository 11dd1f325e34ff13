//! scrapeproxy - scrape agents that cannot be dialed
//!
//! A scraper (Prometheus, curl, anything that speaks HTTP proxy) asks this
//! server for `http://node1:9100/metrics`. Agents running next to their
//! targets keep a long-poll open, pick up the scrape, perform it locally and
//! push the result back. The coordinator pairs the two sides.
//!
//! # Modules
//!
//! - [`coordinator`] - Rendezvous tables, agent registry, scrape lifecycle
//! - [`scrape`] - Payloads exchanged with agents
//! - [`server`] - HTTP surface (proxy, poll, push, clients)
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod scrape;
pub mod server;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, WorkContext, WorkRequest};
pub use scrape::{Headers, ScrapeRequest, ScrapeResponse};
