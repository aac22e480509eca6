use crate::api::rate_limit::log_rate_limit_events;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::offer_service::OfferService;
use crate::services::rating_service::RatingService;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod events;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod offers;
pub mod rate_limit;
pub mod ratings;
pub mod schemas;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub offer_service: OfferService,
    pub rating_service: RatingService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Clone, Debug)]
pub struct ServiceContainer {
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub offer_service: OfferService,
    pub rating_service: RatingService,
}

/// Configures and returns the public API router.
///
/// Expects to be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// because rate limiting keys on the peer address.
///
/// # Panics
/// Panics if the rate limiter configuration cannot be constructed.
#[allow(clippy::expect_used)]
pub fn app_router(config: Config, services: ServiceContainer, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Router {
    let interval_ns = 1_000_000_000 / config.rate_limit.per_second.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(interval_ns))
            .burst_size(config.rate_limit.burst.max(1))
            .finish()
            .expect("Failed to build rate limiter config"),
    );

    let state = AppState {
        config,
        conversation_service: services.conversation_service,
        message_service: services.message_service,
        offer_service: services.offer_service,
        rating_service: services.rating_service,
        shutdown_rx,
    };

    let api_routes = Router::new()
        .route("/conversations", post(conversations::find_or_create).get(conversations::list))
        .route("/conversations/{id}", get(conversations::get))
        .route("/conversations/{id}/messages", get(messages::list_for_conversation).post(messages::append))
        .route("/conversations/{id}/unread", get(conversations::unread_count))
        .route("/conversations/{id}/events", get(events::websocket_handler))
        .route("/messages", get(messages::list_by_peer))
        .route("/messages/{id}", delete(messages::delete))
        .route("/offers", post(offers::open).get(offers::list))
        .route("/offers/{id}/status", put(offers::set_status))
        .route("/ratings", put(ratings::submit))
        .layer(GovernorLayer::new(governor_conf));

    Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn(log_rate_limit_events))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        let status = response.status();
                        span.record("http.response.status_code", status.as_u16());
                        tracing::info!(latency_ms = %latency.as_millis(), status = %status.as_u16(), "request completed");
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), middleware::MakeRequestUuid))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
