//! Main Coordinator implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::context::WorkContext;
use super::error::{ContextError, CoordinatorError};
use super::id::ScrapeId;
use super::messages::{CoordinatorMetrics, WorkRequest};
use super::registry::{AgentRegistry, AgentStatus, spawn_sweeper};
use super::rendezvous::RendezvousTable;
use crate::scrape::{ID_HEADER, SCRAPE_TIMEOUT_HEADER, ScrapeRequest, ScrapeResponse, scrape_timeout};

/// Monotonic counters behind [`CoordinatorMetrics`]
#[derive(Default)]
struct Counters {
    scrapes_requested: AtomicU64,
    scrapes_completed: AtomicU64,
    no_matching_agent: AtomicU64,
    expired_discarded: AtomicU64,
    delivery_timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Removes a response slot once its waiter stops waiting, however it stops
struct ResponseSlotGuard<'a> {
    table: &'a RendezvousTable<ScrapeResponse>,
    id: &'a str,
}

impl Drop for ResponseSlotGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

/// The Coordinator pairs scrape callers with polling agents
///
/// Callers block in [`submit_and_wait`](Self::submit_and_wait) until an agent
/// polling for the same target picks the scrape up via
/// [`claim_work`](Self::claim_work) and answers it via
/// [`submit_result`](Self::submit_result).
pub struct Coordinator {
    config: CoordinatorConfig,
    /// Scrapes waiting for an agent, keyed by target FQDN
    waiting: RendezvousTable<WorkRequest>,
    /// Results waiting for their caller, keyed by scrape ID
    responses: RendezvousTable<ScrapeResponse>,
    /// Agents we know about and when they last polled
    registry: Arc<AgentRegistry>,
    shutdown: CancellationToken,
    counters: Counters,
}

impl Coordinator {
    /// Create a Coordinator without a background registry sweeper
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!(?config, "Coordinator::new: called");
        Self {
            config,
            waiting: RendezvousTable::new("requests"),
            responses: RendezvousTable::new("responses"),
            registry: Arc::new(AgentRegistry::new()),
            shutdown: CancellationToken::new(),
            counters: Counters::default(),
        }
    }

    /// Create a Coordinator and spawn its registry sweeper
    ///
    /// Must be called from within a Tokio runtime. The sweeper runs until
    /// [`shutdown`](Self::shutdown) or until the Coordinator is dropped.
    pub fn start(config: CoordinatorConfig) -> Arc<Self> {
        let coordinator = Arc::new(Self::new(config));
        spawn_sweeper(
            &coordinator.registry,
            coordinator.config.registration_timeout(),
            coordinator.config.gc_interval(),
            coordinator.shutdown.clone(),
        );
        info!("Coordinator started");
        coordinator
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Release every blocked caller and agent with `ShuttingDown`. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Coordinator shutting down");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Request a scrape of `target` and wait for an agent to answer it
    pub async fn submit_and_wait(
        &self,
        target: &str,
        mut request: ScrapeRequest,
        ctx: &WorkContext,
    ) -> Result<ScrapeResponse, CoordinatorError> {
        let id = ScrapeId::generate();
        info!(scrape_id = %id, url = %request.url, %target, "submit_and_wait");
        Counters::bump(&self.counters.scrapes_requested);
        request.headers.insert(ID_HEADER, id.as_str());

        if self.shutdown.is_cancelled() {
            return Err(CoordinatorError::ShuttingDown);
        }
        if let Some(reason) = ctx.error() {
            return Err(self.no_matching_agent(target, reason));
        }

        let work = WorkRequest::new(id.clone(), target, request, ctx.clone());
        let handoff = self.waiting.slot(target).send(work, self.ended(ctx)).await;
        if handoff.is_err() {
            if self.shutdown.is_cancelled() {
                return Err(CoordinatorError::ShuttingDown);
            }
            let reason = ctx.error().unwrap_or(ContextError::DeadlineExceeded);
            return Err(self.no_matching_agent(target, reason));
        }
        debug!(scrape_id = %id, "submit_and_wait: claimed by agent, awaiting result");

        let _guard = ResponseSlotGuard {
            table: &self.responses,
            id: id.as_str(),
        };
        let slot = self.responses.slot(id.as_str());

        loop {
            let mut rx = slot.offer();
            let ended = tokio::select! {
                biased;
                result = &mut rx => match result {
                    Ok(response) => {
                        Counters::bump(&self.counters.scrapes_completed);
                        return Ok(response);
                    }
                    // The agent took our offer and vanished; wait again
                    Err(_) => continue,
                },
                reason = ctx.done() => CoordinatorError::from(reason),
                _ = self.shutdown.cancelled() => CoordinatorError::ShuttingDown,
            };

            // A result that landed at the same instant still wins
            rx.close();
            if let Ok(response) = rx.try_recv() {
                debug!(scrape_id = %id, "submit_and_wait: result raced the deadline, delivering");
                Counters::bump(&self.counters.scrapes_completed);
                return Ok(response);
            }

            info!(scrape_id = %id, error = %ended, "submit_and_wait: stopped waiting for result");
            return Err(ended);
        }
    }

    /// Wait for a scrape addressed to `fqdn`. Blocking.
    ///
    /// Records the agent as alive. Scrapes whose caller already gave up are
    /// discarded and the wait continues. Cancel by dropping the future.
    pub async fn claim_work(&self, fqdn: &str) -> Result<WorkRequest, CoordinatorError> {
        info!(%fqdn, "claim_work");
        self.registry.record_contact(fqdn);
        let slot = self.waiting.slot(fqdn);

        loop {
            let work = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(CoordinatorError::ShuttingDown),
                work = slot.receive() => work,
            };

            if let Some(reason) = work.ctx().error() {
                warn!(scrape_id = %work.id(), %fqdn, %reason, "claim_work: discarding expired scrape request");
                Counters::bump(&self.counters.expired_discarded);
                continue;
            }

            debug!(scrape_id = %work.id(), %fqdn, "claim_work: handing scrape to agent");
            return Ok(work);
        }
    }

    /// Deliver an agent's scrape result to the caller waiting for it
    ///
    /// Waits at most the scrape timeout announced in the result's headers.
    pub async fn submit_result(&self, mut response: ScrapeResponse) -> Result<(), CoordinatorError> {
        let Some(id) = response.headers.remove(ID_HEADER) else {
            warn!(status = response.status, "submit_result: result has no Id header");
            return Err(CoordinatorError::MissingId);
        };
        info!(scrape_id = %id, status = response.status, "submit_result");

        let wait = scrape_timeout(
            &response.headers,
            self.config.default_scrape_timeout(),
            self.config.max_scrape_timeout(),
        );
        // Internal headers never reach the caller
        response.headers.remove(SCRAPE_TIMEOUT_HEADER);

        let until = async {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => {}
            }
        };

        match self.responses.slot(&id).send(response, until).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.responses.remove(&id);
                if self.shutdown.is_cancelled() {
                    return Err(CoordinatorError::ShuttingDown);
                }
                warn!(scrape_id = %id, ?wait, "submit_result: no caller waiting for result");
                Counters::bump(&self.counters.delivery_timeouts);
                Err(CoordinatorError::DeliveryTimeout { id, waited: wait })
            }
        }
    }

    /// Names of agents that polled within the registration timeout
    pub fn known_agents(&self) -> Vec<String> {
        self.registry.list_alive(self.config.registration_timeout())
    }

    /// Alive agents with their last-seen time
    pub fn agent_statuses(&self) -> Vec<AgentStatus> {
        self.registry.alive(self.config.registration_timeout())
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Snapshot of the current metrics
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            scrapes_requested: self.counters.scrapes_requested.load(Ordering::Relaxed),
            scrapes_completed: self.counters.scrapes_completed.load(Ordering::Relaxed),
            no_matching_agent: self.counters.no_matching_agent.load(Ordering::Relaxed),
            expired_discarded: self.counters.expired_discarded.load(Ordering::Relaxed),
            delivery_timeouts: self.counters.delivery_timeouts.load(Ordering::Relaxed),
            pending_responses: self.responses.len(),
            request_targets: self.waiting.len(),
            known_agents: self.registry.len(),
        }
    }

    /// Completes once `ctx` ends or the Coordinator shuts down
    async fn ended(&self, ctx: &WorkContext) {
        tokio::select! {
            _ = ctx.done() => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    fn no_matching_agent(&self, target: &str, reason: ContextError) -> CoordinatorError {
        info!(%target, %reason, "submit_and_wait: no agent claimed scrape");
        Counters::bump(&self.counters.no_matching_agent);
        CoordinatorError::NoMatchingAgent {
            target: target.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{Instant, sleep, timeout};

    fn coordinator() -> Arc<Coordinator> {
        Arc::new(Coordinator::new(CoordinatorConfig {
            default_scrape_timeout_ms: 200,
            ..Default::default()
        }))
    }

    /// Agent loop: claim one scrape for `fqdn`, answer it with `body` after `delay`
    fn spawn_agent(
        coord: &Arc<Coordinator>,
        fqdn: &str,
        body: &str,
        delay: Duration,
    ) -> tokio::task::JoinHandle<ScrapeRequest> {
        let coord = Arc::clone(coord);
        let fqdn = fqdn.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            let work = coord.claim_work(&fqdn).await.unwrap();
            let request = work.into_request();
            sleep(delay).await;

            let mut response = ScrapeResponse::for_scrape(request.id().unwrap(), 200, body);
            response.headers.insert("X-Prometheus-Scrape-Timeout-Seconds", "1");
            response.headers.insert("Content-Type", "text/plain");
            coord.submit_result(response).await.unwrap();
            request
        })
    }

    #[tokio::test]
    async fn test_handoff_delivers_submitted_request() {
        let coord = coordinator();
        let agent = spawn_agent(&coord, "node1:9100", "up 1", Duration::ZERO);

        let ctx = WorkContext::with_timeout(Duration::from_secs(5));
        let response = coord
            .submit_and_wait("node1:9100", ScrapeRequest::get("http://node1:9100/metrics"), &ctx)
            .await
            .unwrap();

        let claimed = agent.await.unwrap();
        assert_eq!(claimed.url, "http://node1:9100/metrics");
        assert!(claimed.id().is_some());
        assert_eq!(response.body, b"up 1");
        assert_eq!(coord.metrics().scrapes_completed, 1);
    }

    #[tokio::test]
    async fn test_result_strips_internal_headers() {
        let coord = coordinator();
        let agent = spawn_agent(&coord, "node1:9100", "metric 42", Duration::from_millis(100));

        let ctx = WorkContext::with_timeout(Duration::from_secs(5));
        let started = Instant::now();
        let response = coord
            .submit_and_wait("node1:9100", ScrapeRequest::get("http://node1:9100/metrics"), &ctx)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"metric 42");
        assert_eq!(response.headers.get("content-type"), Some("text/plain"));
        assert!(!response.headers.contains(ID_HEADER));
        assert!(!response.headers.contains(SCRAPE_TIMEOUT_HEADER));

        agent.await.unwrap();
        assert!(coord.responses.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_immediately() {
        let coord = coordinator();
        let ctx = WorkContext::with_timeout(Duration::from_secs(60));
        ctx.cancel();

        let result = timeout(
            Duration::from_millis(100),
            coord.submit_and_wait("node1", ScrapeRequest::get("http://node1/metrics"), &ctx),
        )
        .await
        .expect("must not block");

        assert!(matches!(
            result,
            Err(CoordinatorError::NoMatchingAgent {
                reason: ContextError::Cancelled,
                ..
            })
        ));
        assert!(coord.responses.is_empty());
        assert_eq!(coord.metrics().no_matching_agent, 1);
    }

    #[tokio::test]
    async fn test_no_agent_times_out_at_deadline() {
        let coord = coordinator();
        let ctx = WorkContext::with_timeout(Duration::from_secs(2));

        let started = Instant::now();
        let result = coord
            .submit_and_wait("node1:9100", ScrapeRequest::get("http://node1:9100/metrics"), &ctx)
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            Err(CoordinatorError::NoMatchingAgent {
                reason: ContextError::DeadlineExceeded,
                ..
            })
        ));
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
        assert!(coord.responses.is_empty());
    }

    #[tokio::test]
    async fn test_caller_deadline_while_awaiting_result() {
        let coord = coordinator();

        // Agent claims but never answers
        let agent = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.claim_work("node1").await.unwrap() })
        };

        let ctx = WorkContext::with_timeout(Duration::from_millis(200));
        let result = coord
            .submit_and_wait("node1", ScrapeRequest::get("http://node1/metrics"), &ctx)
            .await;

        assert!(matches!(result, Err(CoordinatorError::DeadlineExceeded)));
        assert!(coord.responses.is_empty());

        // The late result finds nobody waiting
        let work = agent.await.unwrap();
        let late = ScrapeResponse::for_scrape(work.id().as_str(), 200, "late");
        let result = coord.submit_result(late).await;
        assert!(matches!(result, Err(CoordinatorError::DeliveryTimeout { .. })));
        assert!(coord.responses.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_removes_response_slot() {
        let coord = coordinator();
        let agent = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.claim_work("node1").await.unwrap() })
        };

        let ctx = WorkContext::with_timeout(Duration::from_secs(60));
        let caller = {
            let coord = Arc::clone(&coord);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                coord
                    .submit_and_wait("node1", ScrapeRequest::get("http://node1/metrics"), &ctx)
                    .await
            })
        };

        let work = agent.await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(coord.responses.contains(work.id().as_str()));

        // Inbound connection closed: the caller's future is dropped
        caller.abort();
        let _ = caller.await;
        assert!(!coord.responses.contains(work.id().as_str()));
    }

    #[tokio::test]
    async fn test_submit_result_without_waiter() {
        let coord = coordinator();
        let started = Instant::now();

        let result = coord
            .submit_result(ScrapeResponse::for_scrape("0-0-0", 200, "orphan"))
            .await;

        let elapsed = started.elapsed();
        match result {
            Err(CoordinatorError::DeliveryTimeout { id, waited }) => {
                assert_eq!(id, "0-0-0");
                assert_eq!(waited, Duration::from_millis(200));
            }
            other => panic!("expected DeliveryTimeout, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
        assert!(coord.responses.is_empty());
        assert_eq!(coord.metrics().delivery_timeouts, 1);
    }

    #[tokio::test]
    async fn test_submit_result_without_id() {
        let coord = coordinator();
        let response = ScrapeResponse {
            status: 200,
            headers: Default::default(),
            body: Vec::new(),
        };

        assert!(matches!(
            coord.submit_result(response).await,
            Err(CoordinatorError::MissingId)
        ));
    }

    #[tokio::test]
    async fn test_claim_work_discards_expired_requests() {
        let coord = coordinator();

        let agent = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.claim_work("node1").await.unwrap() })
        };

        // A request whose caller already gave up
        let expired_ctx = WorkContext::with_timeout(Duration::from_secs(60));
        expired_ctx.cancel();
        let expired = WorkRequest::new(
            ScrapeId::from("stale"),
            "node1",
            ScrapeRequest::get("http://node1/stale"),
            expired_ctx,
        );
        coord
            .waiting
            .slot("node1")
            .send(expired, sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(!agent.is_finished());

        let live_ctx = WorkContext::with_timeout(Duration::from_secs(5));
        let live = WorkRequest::new(
            ScrapeId::from("live"),
            "node1",
            ScrapeRequest::get("http://node1/live"),
            live_ctx,
        );
        coord
            .waiting
            .slot("node1")
            .send(live, sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        let claimed = timeout(Duration::from_secs(1), agent).await.unwrap().unwrap();
        assert_eq!(claimed.id().as_str(), "live");
        assert!(claimed.deadline() > Instant::now());
        assert_eq!(coord.metrics().expired_discarded, 1);
    }

    #[tokio::test]
    async fn test_claim_work_records_agent() {
        let coord = coordinator();
        let agent = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.claim_work("node1").await })
        };

        sleep(Duration::from_millis(50)).await;
        assert_eq!(coord.known_agents(), vec!["node1"]);
        assert_eq!(coord.agent_statuses()[0].name, "node1");

        agent.abort();
    }

    #[tokio::test]
    async fn test_fifty_targets_no_cross_delivery() {
        let coord = coordinator();

        let agents: Vec<_> = (0..50)
            .map(|i| {
                let fqdn = format!("node{i}");
                spawn_agent(&coord, &fqdn, &format!("from {fqdn}"), Duration::from_millis(10))
            })
            .collect();

        let callers: Vec<_> = (0..50)
            .map(|i| {
                let coord = Arc::clone(&coord);
                tokio::spawn(async move {
                    let target = format!("node{i}");
                    let ctx = WorkContext::with_timeout(Duration::from_secs(5));
                    let request = ScrapeRequest::get(format!("http://{target}/metrics"));
                    let response = coord.submit_and_wait(&target, request, &ctx).await.unwrap();
                    (target, response)
                })
            })
            .collect();

        for caller in callers {
            let (target, response) = caller.await.unwrap();
            assert_eq!(response.body, format!("from {target}").into_bytes());
        }
        for (i, agent) in agents.into_iter().enumerate() {
            let claimed = agent.await.unwrap();
            assert_eq!(claimed.url, format!("http://node{i}/metrics"));
        }

        let metrics = coord.metrics();
        assert_eq!(metrics.scrapes_completed, 50);
        assert_eq!(metrics.pending_responses, 0);
        assert_eq!(metrics.request_targets, 50);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters() {
        let coord = coordinator();

        let agent = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.claim_work("idle-node").await })
        };
        let caller = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                let ctx = WorkContext::with_timeout(Duration::from_secs(60));
                coord
                    .submit_and_wait("nobody-home", ScrapeRequest::get("http://nobody-home/"), &ctx)
                    .await
            })
        };

        sleep(Duration::from_millis(50)).await;
        coord.shutdown();
        coord.shutdown();

        let agent = timeout(Duration::from_secs(1), agent).await.unwrap().unwrap();
        let caller = timeout(Duration::from_secs(1), caller).await.unwrap().unwrap();
        assert!(matches!(agent, Err(CoordinatorError::ShuttingDown)));
        assert!(matches!(caller, Err(CoordinatorError::ShuttingDown)));
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn test_start_spawns_sweeper() {
        let coord = Coordinator::start(CoordinatorConfig {
            registration_timeout_secs: 0,
            gc_interval_secs: 1,
            ..Default::default()
        });
        coord.registry().record_contact("node1");
        assert_eq!(coord.registry().len(), 1);

        sleep(Duration::from_millis(1200)).await;
        assert!(coord.registry().is_empty());
        coord.shutdown();
    }
}
