//! HTTP front end
//!
//! Thin glue around the [`Coordinator`]:
//! - absolute-form requests (`GET http://node1:9100/metrics`) are scrapes
//! - `POST /poll` is an agent long-poll, `POST /push` an agent result
//! - `GET /clients` lists alive agents, `GET /healthz` is a liveness probe

mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::coordinator::Coordinator;

pub use handlers::status_for;

/// Largest scrape or push body accepted, before base64 expansion on /push
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

/// Build the router for `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/poll", post(handlers::poll))
        .route("/push", post(handlers::push))
        .route("/clients", get(handlers::clients))
        .route("/healthz", get(handlers::healthz))
        .fallback(handlers::not_found)
        // Proxy requests must win over route matching: a scrape of
        // http://node1/poll is still a scrape.
        .layer(middleware::from_fn_with_state(state.clone(), handlers::proxy_absolute_form))
        // Base64 inflates pushed bodies by a third
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES / 3 * 4 + 64 * 1024))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` completes
pub async fn serve<F>(listener: TcpListener, coordinator: Arc<Coordinator>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!(%addr, "scrapeproxy listening");

    axum::serve(listener, router(AppState::new(coordinator)))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("scrapeproxy stopped");
    Ok(())
}
