//! HTTP-level tests driven through the router with `tower::ServiceExt`.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use flashdrop::http::router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{spawn_state, ADMIN_TOKEN, ITEM};

async fn app(stock: i64) -> Router {
    let (state, _ledger) = spawn_state(stock).await;
    router(state)
}

fn purchase_request(requester_id: &str, token: Option<&str>) -> Request<Body> {
    let body = json!({ "requesterId": requester_id, "itemId": ITEM }).to_string();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/purchases")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Idempotency-Key", token);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn admin_post(uri: &str, body: Value, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn accepted_submission_is_pending() {
    let app = app(5).await;
    let response = app.oneshot(purchase_request("u1", Some("tok-1"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["requestToken"], "tok-1");
}

#[tokio::test]
async fn missing_idempotency_key_is_rejected() {
    let app = app(5).await;
    let response = app.oneshot(purchase_request("u1", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_requester_is_rejected() {
    let app = app(5).await;
    let body = json!({ "requesterId": "  ", "itemId": ITEM }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/purchases")
        .header("content-type", "application/json")
        .header("Idempotency-Key", "tok-1")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn replayed_token_conflicts() {
    let app = app(5).await;
    let first = app.clone().oneshot(purchase_request("u1", Some("tok-1"))).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    // Same token from another requester still reads as a replay.
    let second = app.oneshot(purchase_request("u2", Some("tok-1"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn rapid_fire_requester_is_throttled() {
    let app = app(5).await;
    let first = app.clone().oneshot(purchase_request("u1", Some("tok-1"))).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.oneshot(purchase_request("u1", Some("tok-2"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn stock_read_serves_ledger_count() {
    let app = app(7).await;
    let response = app.clone().oneshot(get(&format!("/items/{ITEM}/stock"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["remainingStock"], 7);

    let missing = app.oneshot(get("/items/ghost/stock")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn purchase_status_reaches_confirmed() {
    let app = app(5).await;
    let response = app.clone().oneshot(purchase_request("u1", Some("tok-1"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut last = Value::Null;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get("/purchases/requests/tok-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = body_json(response).await;
        if last["state"] != "RECEIVED" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["state"], "CONFIRMED");
    assert_eq!(last["remaining_stock"], 4);
}

#[tokio::test]
async fn unknown_request_token_is_not_found() {
    let app = app(5).await;
    let response = app.oneshot(get("/purchases/requests/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn restock_requires_admin_token() {
    let app = app(5).await;
    let uri = format!("/admin/items/{ITEM}/restock");

    let denied = app
        .clone()
        .oneshot(admin_post(&uri, json!({ "quantity": 50 }), "wrong-token"))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = app
        .clone()
        .oneshot(admin_post(&uri, json!({ "quantity": 50 }), ADMIN_TOKEN))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let response = app.oneshot(get(&format!("/items/{ITEM}/stock"))).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["remainingStock"], 50);
}

#[tokio::test]
async fn restock_unknown_item_is_not_found() {
    let app = app(5).await;
    let response = app
        .oneshot(admin_post(
            "/admin/items/ghost/restock",
            json!({ "quantity": 50 }),
            ADMIN_TOKEN,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn closing_the_sale_turns_submissions_away() {
    let app = app(5).await;
    let closed = app
        .clone()
        .oneshot(admin_post("/admin/sale-state", json!({ "status": "closed" }), ADMIN_TOKEN))
        .await
        .unwrap();
    assert_eq!(closed.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(purchase_request("u1", Some("tok-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let reopened = app
        .clone()
        .oneshot(admin_post("/admin/sale-state", json!({ "status": "open" }), ADMIN_TOKEN))
        .await
        .unwrap();
    assert_eq!(reopened.status(), StatusCode::OK);
    let response = app.oneshot(purchase_request("u1", Some("tok-1"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn perf_snapshot_is_admin_only() {
    let app = app(5).await;
    let denied = app.clone().oneshot(get("/admin/debug/perf")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("GET")
        .uri("/admin/debug/perf")
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["submit"].is_object());
}
