//! HTTP surface: purchase submission and polling, stock reads, the
//! websocket attach point, and the admin endpoints.

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::admission;
use crate::error::ApiError;
use crate::state::{AppState, SaleStatus};
use crate::ws;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/purchases", post(submit_purchase))
        .route("/purchases/requests/{token}", get(purchase_status))
        .route("/items/{item_id}/stock", get(item_stock))
        .route("/ws", get(ws::attach))
        .route("/admin/items/{item_id}/restock", post(admin_restock))
        .route("/admin/sale-state", post(admin_sale_state))
        .route("/admin/debug/perf", get(admin_perf))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "sale": state.sale_status().await,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseRequest {
    requester_id: Option<String>,
    item_id: Option<String>,
}

fn request_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let token = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing Idempotency-Key header",
        ));
    }
    if token.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Idempotency-Key header is too long",
        ));
    }
    Ok(token.to_string())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("{field} is required"),
        )),
    }
}

async fn submit_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = request_token(&headers)?;
    let requester_id = required(&body.requester_id, "requesterId")?;
    let item_id = required(&body.item_id, "itemId")?;

    admission::submit_purchase(&state, requester_id, item_id, &token).await?;
    Ok(Json(json!({
        "status": "PENDING",
        "requestToken": token,
    })))
}

async fn purchase_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(status) = state.purchase_status.get(&token) else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Unknown request token"));
    };
    Ok(Json(serde_json::to_value(status.value()).map_err(anyhow::Error::from)?))
}

async fn item_stock(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(remaining) = state.stock_cache.get(&item_id) {
        return Ok(Json(json!({
            "itemId": item_id,
            "remainingStock": remaining,
        })));
    }
    let Some(remaining) = state.ledger.stock(&item_id).await? else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Item not found"));
    };
    state.stock_cache.store(&item_id, remaining);
    Ok(Json(json!({
        "itemId": item_id,
        "remainingStock": remaining,
    })))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    match token {
        Some(token) if token == state.cfg.admin.token => Ok(()),
        _ => Err(ApiError::new(StatusCode::FORBIDDEN, "Admin token required")),
    }
}

#[derive(Debug, Deserialize)]
struct RestockRequest {
    quantity: i64,
}

async fn admin_restock(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RestockRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;
    if body.quantity < 0 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "quantity must be non-negative",
        ));
    }
    if !state.ledger.restock(&item_id, body.quantity).await? {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Item not found"));
    }
    state.stock_cache.store(&item_id, body.quantity);
    state.bus.broadcast_stock(&item_id, body.quantity);
    info!(%item_id, quantity = body.quantity, "item restocked");
    Ok(Json(json!({
        "itemId": item_id,
        "stockQuantity": body.quantity,
    })))
}

#[derive(Debug, Deserialize)]
struct SaleStateRequest {
    status: SaleStatus,
}

async fn admin_sale_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SaleStateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;
    let changed = state.set_sale_status(body.status).await;
    info!(status = ?body.status, changed, "sale state set");
    Ok(Json(json!({
        "status": body.status,
        "changed": changed,
    })))
}

async fn admin_perf(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.perf.snapshot()))
}
