#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    dead_code
)]
use bazaar_server::adapters::memory::MemoryStore;
use bazaar_server::api::{MgmtState, app_router, mgmt_router};
use bazaar_server::config::Config;
use bazaar_server::domain::auth::Claims;
use bazaar_server::domain::listing::Listing;
use bazaar_server::domain::user::UserProfile;
use bazaar_server::{AppBuilder, telemetry};
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";
pub const USERS: [&str; 5] = ["u1", "u2", "u3", "buyer", "seller"];

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.rate_limit.per_second = 10_000;
    config.rate_limit.burst = 10_000;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub ws_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        telemetry::init_test_telemetry();

        let store = Arc::new(MemoryStore::new());
        for id in USERS {
            store
                .put_user(UserProfile {
                    id: id.to_string(),
                    display_name: id.to_uppercase(),
                    avatar_url: None,
                    rating: None,
                })
                .unwrap();
        }
        store
            .put_listing(Listing {
                id: "l1".to_string(),
                title: "Bike".to_string(),
                image: Some("https://img.example/bike.jpg".to_string()),
                owner_id: "seller".to_string(),
            })
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = AppBuilder::new(config.clone())
            .with_memory_store(Arc::clone(&store))
            .with_shutdown_rx(shutdown_rx.clone())
            .build()
            .await
            .unwrap();

        let router = app_router(config.clone(), app.services, shutdown_rx.clone());
        let mgmt = mgmt_router(MgmtState { health_service: app.health_service });
        let _workers = app.workers.spawn_all(shutdown_rx.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            ws_url: format!("ws://{addr}"),
            client: reqwest::Client::new(),
            config,
            store,
            shutdown_tx,
        }
    }

    pub fn token(&self, user_id: &str) -> String {
        Claims::new(user_id, 3600).encode(JWT_SECRET).unwrap()
    }

    pub async fn get(&self, user_id: &str, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.server_url))
            .bearer_auth(self.token(user_id))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, user_id: &str, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.server_url))
            .bearer_auth(self.token(user_id))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, user_id: &str, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(format!("{}{path}", self.server_url))
            .bearer_auth(self.token(user_id))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, user_id: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{path}", self.server_url))
            .bearer_auth(self.token(user_id))
            .send()
            .await
            .unwrap()
    }

    /// Finds or creates the conversation between `a` and `b`, returning its id.
    pub async fn conversation(&self, a: &str, b: &str) -> Uuid {
        let resp = self.post(a, "/v1/conversations", &serde_json::json!({ "peerId": b })).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn send_text(&self, conversation_id: Uuid, from: &str, to: &str, content: &str) -> Value {
        let resp = self
            .post(
                from,
                &format!("/v1/conversations/{conversation_id}/messages"),
                &serde_json::json!({ "receiverId": to, "content": content }),
            )
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn get_json(&self, user_id: &str, path: &str) -> Value {
        let resp = self.get(user_id, path).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK, "GET {path}");
        resp.json().await.unwrap()
    }

    /// Opens the event stream and waits for the server to confirm the subscription.
    pub async fn connect_events(&self, conversation_id: Uuid, user_id: &str) -> WsStream {
        let url =
            format!("{}/v1/conversations/{conversation_id}/events?token={}", self.ws_url, self.token(user_id));
        let (mut ws, _) = connect_async(url).await.unwrap();

        let first = next_frame(&mut ws).await;
        assert_eq!(first["type"], "subscribed");
        ws
    }
}

/// Next JSON text frame, failing the test after five seconds.
pub async fn next_frame(ws: &mut WsStream) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(WsMessage::Close(frame))) => panic!("socket closed: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("socket error: {e}"),
                None => panic!("socket ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Asserts nothing arrives on the socket for `wait`.
pub async fn assert_silent(ws: &mut WsStream, wait: Duration) {
    if let Ok(Some(Ok(WsMessage::Text(text)))) = tokio::time::timeout(wait, ws.next()).await {
        panic!("unexpected frame: {}", text.as_str());
    }
}
