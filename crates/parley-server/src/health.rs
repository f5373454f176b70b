//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions currently registered with the hub.
    pub connections: usize,
    /// Broadcasts processed since startup.
    pub messages_broadcast: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, messages_broadcast: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        messages_broadcast,
    }
}
