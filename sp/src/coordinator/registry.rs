//! Agent registry - which agents have polled recently
//!
//! Liveness is informational only; it never decides routing. Reads filter by
//! the expiry window, the periodic sweep reclaims memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Last contact from one agent
#[derive(Debug, Clone, Copy)]
struct AgentRecord {
    /// Monotonic timestamp used for expiry
    last_contact: Instant,
    /// Wall-clock timestamp for reporting
    last_seen: DateTime<Utc>,
}

/// An alive agent as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub name: String,
    #[serde(rename = "last-seen")]
    pub last_seen: DateTime<Utc>,
}

/// Result of one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub deleted: usize,
    pub remaining: usize,
}

/// Tracks agents and when they last contacted the coordinator
#[derive(Debug, Default)]
pub struct AgentRegistry {
    known: Mutex<HashMap<String, AgentRecord>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn known(&self) -> MutexGuard<'_, HashMap<String, AgentRecord>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `agent` just contacted us
    pub fn record_contact(&self, agent: &str) {
        let record = AgentRecord {
            last_contact: Instant::now(),
            last_seen: Utc::now(),
        };
        self.known().insert(agent.to_string(), record);
    }

    /// Names of agents seen within `expiry`, sorted
    pub fn list_alive(&self, expiry: Duration) -> Vec<String> {
        self.alive(expiry).into_iter().map(|status| status.name).collect()
    }

    /// Agents seen within `expiry` with their last-seen time, sorted by name
    pub fn alive(&self, expiry: Duration) -> Vec<AgentStatus> {
        let now = Instant::now();
        let mut alive: Vec<AgentStatus> = self
            .known()
            .iter()
            .filter(|(_, record)| now.duration_since(record.last_contact) < expiry)
            .map(|(name, record)| AgentStatus {
                name: name.clone(),
                last_seen: record.last_seen,
            })
            .collect();
        alive.sort_by(|a, b| a.name.cmp(&b.name));
        alive
    }

    /// Delete agents not seen within `expiry`
    pub fn sweep(&self, expiry: Duration) -> SweepStats {
        let now = Instant::now();
        let mut known = self.known();
        let before = known.len();
        known.retain(|_, record| now.duration_since(record.last_contact) < expiry);

        let stats = SweepStats {
            deleted: before - known.len(),
            remaining: known.len(),
        };
        drop(known);

        info!(deleted = stats.deleted, remaining = stats.remaining, "GC of agents completed");
        stats
    }

    /// Total records held, alive or not
    pub fn len(&self) -> usize {
        self.known().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `sweep` every `interval` until `shutdown` fires or the registry is dropped
pub fn spawn_sweeper(
    registry: &Arc<AgentRegistry>,
    expiry: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let registry: Weak<AgentRegistry> = Arc::downgrade(registry);

    tokio::spawn(async move {
        debug!(?expiry, ?interval, "spawn_sweeper: started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(registry) = registry.upgrade() else {
                break;
            };
            registry.sweep(expiry);
        }
        debug!("spawn_sweeper: stopped");
    })
}
