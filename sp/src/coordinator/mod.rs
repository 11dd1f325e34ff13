//! Coordinator for scrape rendezvous
//!
//! The Coordinator pairs two parties that never talk to each other directly:
//! - **Callers** submit a scrape for a target and block until it is answered
//! - **Agents** poll for scrapes addressed to them and push results back
//!
//! Both legs are unbuffered handoffs through per-key rendezvous slots.

mod config;
mod context;
mod core;
mod error;
mod id;
mod messages;
mod registry;
mod rendezvous;

pub use config::CoordinatorConfig;
pub use context::WorkContext;
pub use self::core::Coordinator;
pub use error::{ContextError, CoordinatorError};
pub use id::{ScrapeId, generate_id};
pub use messages::{CoordinatorMetrics, WorkRequest};
pub use registry::{AgentRegistry, AgentStatus, SweepStats, spawn_sweeper};
pub use rendezvous::{Rendezvous, RendezvousTable};
