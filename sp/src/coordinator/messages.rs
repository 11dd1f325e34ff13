//! Message types for the Coordinator

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::context::WorkContext;
use super::id::ScrapeId;
use crate::scrape::ScrapeRequest;

/// A tagged scrape waiting for (or handed to) an agent
#[derive(Debug, Clone)]
pub struct WorkRequest {
    id: ScrapeId,
    target: String,
    request: ScrapeRequest,
    /// Caller's context; lets the agent side notice a caller that gave up
    ctx: WorkContext,
}

impl WorkRequest {
    pub(crate) fn new(id: ScrapeId, target: &str, request: ScrapeRequest, ctx: WorkContext) -> Self {
        Self {
            id,
            target: target.to_string(),
            request,
            ctx,
        }
    }

    pub fn id(&self) -> &ScrapeId {
        &self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn request(&self) -> &ScrapeRequest {
        &self.request
    }

    /// Unwrap the scrape the agent should perform
    pub fn into_request(self) -> ScrapeRequest {
        self.request
    }

    pub fn deadline(&self) -> Instant {
        self.ctx.deadline()
    }

    /// Whether the caller cancelled or its deadline passed
    pub fn is_expired(&self) -> bool {
        self.ctx.is_done()
    }

    pub(crate) fn ctx(&self) -> &WorkContext {
        &self.ctx
    }
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorMetrics {
    pub scrapes_requested: u64,
    pub scrapes_completed: u64,
    pub no_matching_agent: u64,
    pub expired_discarded: u64,
    pub delivery_timeouts: u64,
    pub pending_responses: usize,
    pub request_targets: usize,
    pub known_agents: usize,
}
