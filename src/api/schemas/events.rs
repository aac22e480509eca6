use serde::Deserialize;

/// Browsers cannot set headers on a WebSocket upgrade, so the bearer token
/// travels in the query string.
#[derive(Debug, Deserialize)]
pub struct EventStreamParams {
    pub token: String,
}
