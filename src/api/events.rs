use crate::api::AppState;
use crate::api::schemas::events::EventStreamParams;
use crate::domain::auth::Claims;
use crate::domain::conversation::Conversation;
use crate::domain::notification::ConversationEvent;
use crate::error::Result;
use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade, close_code},
    },
    http::Extensions,
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::request_id::RequestId;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    active_connections: UpDownCounter<i64>,
    frames_sent_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("bazaar_websocket_active_connections")
                .with_description("Number of open conversation event streams")
                .build(),
            frames_sent_total: meter
                .u64_counter("bazaar_websocket_frames_sent_total")
                .with_description("Conversation events written to WebSocket clients")
                .build(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);

type WsSink = SplitSink<WebSocket, WsMessage>;

const FEED_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Upgrades to a WebSocket streaming the events of one conversation.
///
/// The token and membership are checked before the upgrade so that a bad
/// request gets a plain HTTP error. Once subscribed the server sends
/// `{"type":"subscribed"}`; every event after that frame is live.
///
/// # Errors
/// Returns `AppError::AuthError` for a bad token, `AppError::ConversationNotFound`
/// or `AppError::Unauthorized` if the caller cannot see the conversation.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<EventStreamParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Result<Response> {
    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let claims = Claims::decode(&params.token, &state.config.auth.jwt_secret).inspect_err(|_| {
        tracing::warn!("WebSocket handshake failed: invalid token");
    })?;
    let conversation = state.conversation_service.get(conversation_id, &claims.sub).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, conversation, claims.sub, request_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, conversation: Conversation, user_id: String, request_id: String) {
    let span = tracing::info_span!(
        "conversation_stream",
        request_id = %request_id,
        user_id = %user_id,
        conversation_id = %conversation.id,
        otel.kind = "server",
        ws.session_id = %Uuid::new_v4()
    );

    async move {
        METRICS.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let mut feed = state.message_service.subscribe(&conversation).await;
        let (mut ws_sink, mut ws_stream) = socket.split();
        let mut shutdown_rx = state.shutdown_rx.clone();

        let subscribed = json!({ "type": "subscribed", "conversationId": feed.conversation_id() });
        let mut open = send_text(&mut ws_sink, subscribed.to_string()).await;
        let mut retry_at: Option<Instant> = None;

        while open {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket error");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                () = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                }

                event = feed.next(), if retry_at.is_none() => {
                    match event {
                        Ok(Some(event)) => open = send_event(&mut ws_sink, &event).await,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to pull conversation feed");
                            retry_at = Some(Instant::now() + FEED_RETRY_DELAY);
                        }
                    }
                }
            }
        }

        let _ = ws_sink.close().await;
        METRICS.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
    .instrument(span)
    .await;
}

async fn send_event(sink: &mut WsSink, event: &ConversationEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => {
            let sent = send_text(sink, text).await;
            if sent {
                METRICS.frames_sent_total.add(1, &[KeyValue::new("event", event.label())]);
            }
            sent
        }
        Err(e) => {
            tracing::error!(error = %e, event = event.label(), "Failed to encode conversation event");
            true
        }
    }
}

async fn send_text(sink: &mut WsSink, text: String) -> bool {
    sink.send(WsMessage::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use crate::AppBuilder;
    use crate::adapters::memory::{self, MemoryStore};
    use crate::config::{Config, NotificationConfig};
    use crate::domain::auth::Claims;
    use crate::domain::message::{Message, NewMessage};
    use crate::domain::page::Page;
    use crate::error::{AppError, Result};
    use crate::services::message_service::AppendRequest;
    use crate::services::notification::{ChangeNotifier, LocalChangeNotifier};
    use crate::services::ports::MessageStore;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::sync::watch;
    use tokio_tungstenite::tungstenite::protocol::Message as ClientMessage;
    use uuid::Uuid;

    /// Ledger whose cursor reads always fail, so every feed pull errors.
    #[derive(Debug)]
    struct UnreadableLedger(Arc<MemoryStore>);

    #[async_trait]
    impl MessageStore for UnreadableLedger {
        async fn append(&self, message: NewMessage, preview: String) -> Result<Message> {
            self.0.append(message, preview).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Message>> {
            MessageStore::get(self.0.as_ref(), id).await
        }

        async fn list(&self, conversation_id: Uuid, page: Page) -> Result<Vec<Message>> {
            MessageStore::list(self.0.as_ref(), conversation_id, page).await
        }

        async fn list_after(&self, _: Uuid, _: Option<OffsetDateTime>, _: i64) -> Result<Vec<Message>> {
            Err(AppError::Unavailable("ledger offline".into()))
        }

        async fn latest(&self, conversation_id: Uuid) -> Result<Option<Message>> {
            self.0.latest(conversation_id).await
        }

        async fn count_addressed_to(&self, conversation_id: Uuid, user_id: &str) -> Result<i64> {
            self.0.count_addressed_to(conversation_id, user_id).await
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            MessageStore::delete(self.0.as_ref(), id).await
        }
    }

    #[tokio::test]
    async fn test_shutdown_is_seen_while_feed_retry_is_pending() {
        let mut config = Config::default();
        config.auth.jwt_secret = "events_secret".to_string();

        let store = Arc::new(MemoryStore::new());
        let mut stores = memory::stores(&store);
        stores.messages = Arc::new(UnreadableLedger(Arc::clone(&store)));
        let notifier: Arc<dyn ChangeNotifier> = Arc::new(LocalChangeNotifier::new(&NotificationConfig::default()));
        let services = AppBuilder::services(&config, &stores, &notifier);

        let conversation = services.conversation_service.find_or_create("u1", "u2").await.expect("conversation");
        let message_service = services.message_service.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = crate::api::app_router(config, services, shutdown_rx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await;
        });

        let token = Claims::new("u1", 3600).encode("events_secret").expect("token");
        let url = format!("ws://{addr}/v1/conversations/{}/events?token={token}", conversation.id);
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
        let subscribed = tokio::time::timeout(Duration::from_secs(5), ws.next()).await.expect("subscribed frame");
        assert!(matches!(subscribed, Some(Ok(ClientMessage::Text(_)))));

        message_service
            .append(AppendRequest {
                conversation_id: conversation.id,
                sender_id: "u2".into(),
                receiver_id: "u1".into(),
                content: "hi".into(),
                offer: None,
            })
            .await
            .expect("append");

        // Let the pull fail and the retry window open.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).expect("shutdown");

        let closed = tokio::time::timeout(Duration::from_millis(250), async {
            loop {
                match ws.next().await {
                    Some(Ok(ClientMessage::Close(frame))) => return frame,
                    Some(Ok(_)) => {}
                    _ => return None,
                }
            }
        })
        .await
        .expect("close well before the retry delay elapses");
        assert_eq!(closed.map(|f| u16::from(f.code)), Some(1001));
    }
}
