#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub)]
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::collections::HashSet;
use uuid::Uuid;

mod common;

#[tokio::test]
async fn test_find_or_create_is_symmetric_and_idempotent() {
    let app = common::TestApp::spawn().await;

    let first = app.conversation("u1", "u2").await;
    let again = app.conversation("u1", "u2").await;
    let reversed = app.conversation("u2", "u1").await;

    assert_eq!(first, again);
    assert_eq!(first, reversed);

    let body = app.get_json("u2", &format!("/v1/conversations/{first}")).await;
    assert_eq!(body["participantLow"], "u1");
    assert_eq!(body["participantHigh"], "u2");
    assert!(body["lastMessageAt"].is_null());
}

#[tokio::test]
async fn test_concurrent_creation_converges() {
    let app = common::TestApp::spawn().await;

    let attempts = (0..12).map(|i| {
        let (a, b) = if i % 2 == 0 { ("u1", "u3") } else { ("u3", "u1") };
        app.conversation(a, b)
    });
    let ids: HashSet<Uuid> = join_all(attempts).await.into_iter().collect();

    assert_eq!(ids.len(), 1, "every caller must observe the same conversation");
}

#[tokio::test]
async fn test_conversation_with_self_rejected() {
    let app = common::TestApp::spawn().await;

    let resp = app.post("u1", "/v1/conversations", &json!({ "peerId": "u1" })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.post("u1", "/v1/conversations", &json!({ "peerId": "  " })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_enforces_membership() {
    let app = common::TestApp::spawn().await;
    let id = app.conversation("u1", "u2").await;

    let resp = app.get("u3", &format!("/v1/conversations/{id}")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.get("u1", &format!("/v1/conversations/{}", Uuid::new_v4())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_orders_by_latest_activity() {
    let app = common::TestApp::spawn().await;
    let with_u2 = app.conversation("u1", "u2").await;
    let with_u3 = app.conversation("u1", "u3").await;
    let _not_mine = app.conversation("u2", "u3").await;

    app.send_text(with_u3, "u3", "u1", "first").await;
    app.send_text(with_u2, "u2", "u1", "second").await;

    let body = app.get_json("u1", "/v1/conversations").await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![with_u2.to_string(), with_u3.to_string()]);

    let paged = app.get_json("u1", "/v1/conversations?offset=1&limit=1").await;
    assert_eq!(paged.as_array().unwrap().len(), 1);
    assert_eq!(paged[0]["id"], Value::String(with_u3.to_string()));
}

#[tokio::test]
async fn test_unread_counts_messages_addressed_to_caller() {
    let app = common::TestApp::spawn().await;
    let id = app.conversation("u1", "u2").await;

    app.send_text(id, "u2", "u1", "one").await;
    app.send_text(id, "u2", "u1", "two").await;
    app.send_text(id, "u1", "u2", "three").await;

    let for_u1 = app.get_json("u1", &format!("/v1/conversations/{id}/unread")).await;
    assert_eq!(for_u1["unread"], 2);
    assert_eq!(for_u1["conversationId"], Value::String(id.to_string()));

    let for_u2 = app.get_json("u2", &format!("/v1/conversations/{id}/unread")).await;
    assert_eq!(for_u2["unread"], 1);

    let outsider = app.get("u3", &format!("/v1/conversations/{id}/unread")).await;
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);
}
