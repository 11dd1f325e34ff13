//! Scrape payloads exchanged with agents
//!
//! Agents receive a [`ScrapeRequest`] from `/poll`, perform it against their
//! local target, and push a [`ScrapeResponse`] back to `/push`. Both travel as
//! JSON; bodies are base64 so binary payloads survive unchanged.

mod body;
mod headers;
mod timeout;

use serde::{Deserialize, Serialize};

pub use headers::Headers;
pub use timeout::scrape_timeout;

/// Header carrying the scrape ID between coordinator and agent
pub const ID_HEADER: &str = "id";

/// Header Prometheus uses to announce its scrape timeout
pub const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

/// Outbound scrape an agent should perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "body", skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,
}

impl ScrapeRequest {
    /// A plain GET of `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// The scrape ID the coordinator tagged this request with
    pub fn id(&self) -> Option<&str> {
        self.headers.get(ID_HEADER)
    }
}

/// What an agent got back from its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "body")]
    pub body: Vec<u8>,
}

impl ScrapeResponse {
    /// A response for scrape `id` with the given status and body
    pub fn for_scrape(id: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = Headers::new();
        headers.insert(ID_HEADER, id);
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.headers.get(ID_HEADER)
    }
}
