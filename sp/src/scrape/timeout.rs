//! Scrape timeout hint extraction

use std::time::Duration;

use super::{Headers, SCRAPE_TIMEOUT_HEADER};

/// Timeout announced in `headers`, falling back to `default` and capped at `max`
///
/// The hint is fractional seconds. Missing, unparsable or non-positive hints
/// use `default`.
pub fn scrape_timeout(headers: &Headers, default: Duration, max: Duration) -> Duration {
    let timeout = headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(default);

    timeout.min(max)
}
