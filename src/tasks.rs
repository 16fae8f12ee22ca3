//! Background tasks: the settlement worker (with its supervisor), the
//! pruning loop for the admission maps, and periodic counter telemetry.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::bus::OutcomeEvent;
use crate::ledger::Settlement;
use crate::state::{
    now_epoch_ms, AppState, PurchaseIntent, PurchaseStatus, RejectReason,
};

const PRUNE_TICK_MS: u64 = 2_000;
const PERF_TICK_MS: u64 = 5_000;
const STATUS_TTL_MS: i64 = 5 * 60 * 1000;

pub fn start_background_tasks(state: AppState, intent_rx: mpsc::Receiver<PurchaseIntent>) {
    spawn_settlement_worker(state.clone(), intent_rx);

    {
        let state = state.clone();
        tokio::spawn(async move { prune_loop(state).await });
    }
    tokio::spawn(async move { perf_loop(state).await });
}

/// Supervise the single settlement consumer. The receiver sits behind a
/// mutex so a replacement worker picks up from the next queued intent;
/// the intent a crashed worker was holding is lost, never retried.
fn spawn_settlement_worker(state: AppState, intent_rx: mpsc::Receiver<PurchaseIntent>) {
    let intent_rx = Arc::new(Mutex::new(intent_rx));
    tokio::spawn(async move {
        loop {
            let worker_state = state.clone();
            let worker_rx = Arc::clone(&intent_rx);
            let handle =
                tokio::spawn(async move { settlement_loop(worker_state, worker_rx).await });
            match handle.await {
                Ok(()) => {
                    info!("settlement worker stopped, admission queue closed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "settlement worker crashed, restarting");
                }
            }
        }
    });
}

async fn settlement_loop(state: AppState, intent_rx: Arc<Mutex<mpsc::Receiver<PurchaseIntent>>>) {
    loop {
        let intent = {
            let mut rx = intent_rx.lock().await;
            rx.recv().await
        };
        let Some(intent) = intent else {
            return;
        };
        state.perf.queue_depth.fetch_sub(1, Ordering::Relaxed);
        settle_one(&state, intent).await;
    }
}

/// Settle a single admitted purchase end to end: hit the ledger, record
/// the terminal status, refresh the read cache, then notify. A ledger
/// error resolves the purchase as a system error; the intent is not
/// requeued.
async fn settle_one(state: &AppState, intent: PurchaseIntent) {
    let now = now_epoch_ms();
    match state.ledger.settle(&intent.item_id).await {
        Ok(Settlement::Confirmed { remaining }) => {
            state.stock_cache.store(&intent.item_id, remaining);
            state.purchase_status.insert(
                intent.request_token.clone(),
                PurchaseStatus::Confirmed { remaining_stock: remaining, created_at_ms: now },
            );
            state.perf.settle_confirmed.fetch_add(1, Ordering::Relaxed);
            deliver(
                state,
                &intent.requester_id,
                OutcomeEvent::OrderConfirmed {
                    request_token: intent.request_token.clone(),
                    item_id: intent.item_id.clone(),
                    remaining_stock: remaining,
                },
            );
            state.bus.broadcast_stock(&intent.item_id, remaining);
            info!(
                requester_id = %intent.requester_id,
                item_id = %intent.item_id,
                remaining,
                "purchase confirmed"
            );
        }
        Ok(Settlement::OutOfStock) => {
            state.perf.settle_out_of_stock.fetch_add(1, Ordering::Relaxed);
            resolve_rejected(state, &intent, RejectReason::OutOfStock, now);
        }
        Ok(Settlement::NotFound) => {
            state.perf.settle_not_found.fetch_add(1, Ordering::Relaxed);
            resolve_rejected(state, &intent, RejectReason::NotFound, now);
        }
        Err(err) => {
            warn!(
                requester_id = %intent.requester_id,
                item_id = %intent.item_id,
                error = %err,
                "settlement failed"
            );
            state.perf.settle_system_error.fetch_add(1, Ordering::Relaxed);
            resolve_rejected(state, &intent, RejectReason::SystemError, now);
        }
    }
}

fn resolve_rejected(state: &AppState, intent: &PurchaseIntent, reason: RejectReason, now: i64) {
    state.purchase_status.insert(
        intent.request_token.clone(),
        PurchaseStatus::Rejected { reason, created_at_ms: now },
    );
    deliver(
        state,
        &intent.requester_id,
        OutcomeEvent::OrderRejected {
            request_token: intent.request_token.clone(),
            item_id: intent.item_id.clone(),
            reason,
        },
    );
}

fn deliver(state: &AppState, requester_id: &str, event: OutcomeEvent) {
    if state.bus.notify(requester_id, event) {
        state.perf.notify_delivered.fetch_add(1, Ordering::Relaxed);
    } else {
        state.perf.notify_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

async fn prune_loop(state: AppState) {
    let mut tick = tokio::time::interval(Duration::from_millis(PRUNE_TICK_MS));
    loop {
        tick.tick().await;
        let claims = state.gate.prune();
        let windows = state.limiter.prune();
        let rooms = state.bus.prune_rooms();
        let cache = state.stock_cache.prune();

        let cutoff = now_epoch_ms() - STATUS_TTL_MS;
        let before = state.purchase_status.len();
        state
            .purchase_status
            .retain(|_, status| !(status.is_settled() && status.created_at_ms() < cutoff));
        let statuses = before - state.purchase_status.len();

        if claims + windows + rooms + cache + statuses > 0 {
            info!(claims, windows, rooms, cache, statuses, "pruned expired entries");
        }
    }
}

async fn perf_loop(state: AppState) {
    let mut tick = tokio::time::interval(Duration::from_millis(PERF_TICK_MS));
    let mut last_received = 0u64;
    let mut last_settled = 0u64;
    loop {
        tick.tick().await;
        let received = state.perf.submit_received.load(Ordering::Relaxed);
        let settled = state.perf.settle_confirmed.load(Ordering::Relaxed)
            + state.perf.settle_out_of_stock.load(Ordering::Relaxed)
            + state.perf.settle_not_found.load(Ordering::Relaxed)
            + state.perf.settle_system_error.load(Ordering::Relaxed);
        if received == last_received && settled == last_settled {
            continue;
        }
        info!(
            received_delta = received - last_received,
            settled_delta = settled - last_settled,
            queue_depth = state.perf.queue_depth.load(Ordering::Relaxed),
            tokens = state.gate.len(),
            rooms = state.bus.room_count(),
            "perf"
        );
        last_received = received;
        last_settled = settled;
    }
}
