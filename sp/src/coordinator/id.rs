//! Scrape ID generation
//!
//! IDs use the format: `{process-start-unix-secs}-{counter}-{pid}`
//! Example: `1760870400-42-31337`
//!
//! IDs are correlation keys only. They are neither MAC-bound nor signed, so an
//! agent that guesses one can answer a scrape it never claimed.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);
static PROCESS_START: OnceLock<u64> = OnceLock::new();

fn process_start_secs() -> u64 {
    *PROCESS_START.get_or_init(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    })
}

/// Generate a process-unique scrape ID
pub fn generate_id() -> String {
    let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{}-{}", process_start_secs(), count, std::process::id())
}

/// Scrape ID wrapper for type-safe correlation keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrapeId(String);

impl ScrapeId {
    /// Create a fresh, process-unique ID
    pub fn generate() -> Self {
        Self(generate_id())
    }

    /// Get the full ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScrapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScrapeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ScrapeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ScrapeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
