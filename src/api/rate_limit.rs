use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::LazyLock;

const RETRY_AFTER_HEADER: &str = "x-ratelimit-after";

#[derive(Clone, Debug)]
struct Metrics {
    decisions_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            decisions_total: meter
                .u64_counter("bazaar_rate_limit_decisions_total")
                .with_description("Rate limit decisions (allowed/throttled)")
                .build(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);

/// Counts governor decisions and logs throttled requests.
pub async fn log_rate_limit_events(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;
    let label = decision_label(response.status(), response.headers().get(RETRY_AFTER_HEADER).and_then(|v| v.to_str().ok()));
    METRICS.decisions_total.add(1, &[KeyValue::new("status", label)]);
    response
}

fn decision_label(status: StatusCode, retry_after: Option<&str>) -> &'static str {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return "allowed";
    }
    match retry_after {
        Some(after) => tracing::warn!("Rate limit exceeded (retry allowed after {after}s)"),
        None => tracing::warn!("Rate limit exceeded"),
    }
    "throttled"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_label() {
        assert_eq!(decision_label(StatusCode::OK, None), "allowed");
        assert_eq!(decision_label(StatusCode::NOT_FOUND, None), "allowed");
        assert_eq!(decision_label(StatusCode::TOO_MANY_REQUESTS, Some("2")), "throttled");
        assert_eq!(decision_label(StatusCode::TOO_MANY_REQUESTS, None), "throttled");
    }
}
