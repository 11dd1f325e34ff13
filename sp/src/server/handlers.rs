//! Request handlers

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::{AppState, MAX_BODY_BYTES};
use crate::coordinator::{AgentStatus, CoordinatorError, WorkContext};
use crate::scrape::{Headers, ScrapeRequest, ScrapeResponse, scrape_timeout};

/// HTTP status a coordinator failure is reported with
pub fn status_for(err: &CoordinatorError) -> StatusCode {
    match err {
        CoordinatorError::NoMatchingAgent { .. } | CoordinatorError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        CoordinatorError::Cancelled | CoordinatorError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        CoordinatorError::DeliveryTimeout { .. } => StatusCode::GONE,
        CoordinatorError::MissingId => StatusCode::BAD_REQUEST,
    }
}

fn error_response(err: &CoordinatorError) -> Response {
    (status_for(err), err.to_string()).into_response()
}

/// Routes absolute-form requests to the scrape proxy, everything else to the router
pub async fn proxy_absolute_form(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().authority().is_none() {
        return next.run(request).await;
    }
    if request.method() == Method::CONNECT {
        return (StatusCode::METHOD_NOT_ALLOWED, "CONNECT is not supported").into_response();
    }
    proxy(&state, request).await
}

async fn proxy(state: &AppState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let Some(target) = target_host(&parts.uri) else {
        return (StatusCode::BAD_REQUEST, "request URI has no host").into_response();
    };
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            warn!(%target, error = %e, "failed to read scrape request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "scrape request body too large").into_response();
        }
    };

    let headers = to_scrape_headers(&parts.headers);
    let config = state.coordinator.config();
    let timeout = scrape_timeout(&headers, config.default_scrape_timeout(), config.max_scrape_timeout());
    debug!(%target, url = %parts.uri, ?timeout, "proxying scrape");

    let scrape = ScrapeRequest {
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        headers,
        body,
    };

    let ctx = WorkContext::with_timeout(timeout);
    match state.coordinator.submit_and_wait(&target, scrape, &ctx).await {
        Ok(response) => to_http_response(response),
        Err(e) => {
            warn!(%target, error = %e, "scrape failed");
            error_response(&e)
        }
    }
}

/// Agent long-poll: body is the agent's FQDN, reply is the next scrape for it
pub async fn poll(State(state): State<AppState>, body: String) -> Response {
    let fqdn = body.trim();
    if fqdn.is_empty() {
        return (StatusCode::BAD_REQUEST, "poll body must be the agent FQDN").into_response();
    }

    match state.coordinator.claim_work(fqdn).await {
        Ok(work) => Json(work.into_request()).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Agent result upload
pub async fn push(State(state): State<AppState>, Json(response): Json<ScrapeResponse>) -> Response {
    match state.coordinator.submit_result(response).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            warn!(error = %e, "push rejected");
            error_response(&e)
        }
    }
}

pub async fn clients(State(state): State<AppState>) -> Json<Vec<AgentStatus>> {
    Json(state.coordinator.agent_statuses())
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Target hostname of an absolute-form URI, IPv6 brackets stripped
fn target_host(uri: &Uri) -> Option<String> {
    let host = uri.host()?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    Some(host.to_string())
}

/// Copy an HTTP header map into scrape headers, repeated names included
fn to_scrape_headers(map: &HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

/// Turn an agent's result into the reply for the waiting scraper
fn to_http_response(response: ScrapeResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers.iter() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(%name, "dropping unrepresentable header"),
        }
    }
    // Framing belongs to this connection, not the agent's
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(CONNECTION);

    let mut reply = Response::new(Body::from(response.body));
    *reply.status_mut() = status;
    *reply.headers_mut() = headers;
    reply
}
