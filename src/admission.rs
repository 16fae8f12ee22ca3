//! Admission pipeline for purchase submissions. Every check here is
//! cheap and in-process; the first failure wins and nothing past it
//! runs. Order matters: the idempotency gate runs before the rate
//! limiter so a replayed token always reads as a duplicate, not as a
//! rate-limit violation.

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use tracing::debug;

use crate::error::ApiError;
use crate::state::{now_epoch_ms, AppState, PurchaseIntent, PurchaseStatus, SaleStatus};

pub async fn submit_purchase(
    state: &AppState,
    requester_id: &str,
    item_id: &str,
    request_token: &str,
) -> Result<(), ApiError> {
    state.perf.submit_received.fetch_add(1, Ordering::Relaxed);

    if state.sale_status().await == SaleStatus::Closed {
        state.perf.reject_sale_closed.fetch_add(1, Ordering::Relaxed);
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Sale is currently closed",
        ));
    }

    if !state.gate.claim(request_token) {
        state.perf.reject_duplicate.fetch_add(1, Ordering::Relaxed);
        debug!(request_token, "duplicate submission rejected");
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "Duplicate request: this purchase was already submitted",
        ));
    }

    if !state.limiter.try_admit(requester_id) {
        // Give the token back so the retry after cooldown is not read
        // as a duplicate.
        state.gate.release(request_token);
        state.perf.reject_rate_limited.fetch_add(1, Ordering::Relaxed);
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, slow down",
        ));
    }

    let intent = PurchaseIntent {
        requester_id: requester_id.to_string(),
        item_id: item_id.to_string(),
        request_token: request_token.to_string(),
        accepted_at_ms: now_epoch_ms(),
    };
    state.purchase_status.insert(
        request_token.to_string(),
        PurchaseStatus::Received { created_at_ms: intent.accepted_at_ms },
    );

    if state.intent_tx.try_send(intent).is_err() {
        state.purchase_status.remove(request_token);
        state.gate.release(request_token);
        state.perf.reject_queue_full.fetch_add(1, Ordering::Relaxed);
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Admission queue is full, please retry",
        ));
    }

    state.perf.queue_depth.fetch_add(1, Ordering::Relaxed);
    state.perf.submit_accepted.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
