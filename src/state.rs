use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};

use crate::bus::NotificationBus;
use crate::cache::StockReadCache;
use crate::config::AppConfig;
use crate::gate::{RateLimiter, TokenGate};
use crate::ledger::StockLedger;

pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// One admitted purchase waiting for the settlement worker.
#[derive(Debug, Clone)]
pub struct PurchaseIntent {
    pub requester_id: String,
    pub item_id: String,
    pub request_token: String,
    pub accepted_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    OutOfStock,
    NotFound,
    SystemError,
}

/// Pollable lifecycle of a submitted purchase, keyed by request token.
/// Entries are pruned a few minutes after they settle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Received {
        created_at_ms: i64,
    },
    Confirmed {
        remaining_stock: i64,
        created_at_ms: i64,
    },
    Rejected {
        reason: RejectReason,
        created_at_ms: i64,
    },
}

impl PurchaseStatus {
    pub fn created_at_ms(&self) -> i64 {
        match self {
            PurchaseStatus::Received { created_at_ms }
            | PurchaseStatus::Confirmed { created_at_ms, .. }
            | PurchaseStatus::Rejected { created_at_ms, .. } => *created_at_ms,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, PurchaseStatus::Received { .. })
    }
}

#[derive(Default)]
pub struct PerfCounters {
    pub submit_received: AtomicU64,
    pub submit_accepted: AtomicU64,
    pub reject_duplicate: AtomicU64,
    pub reject_rate_limited: AtomicU64,
    pub reject_queue_full: AtomicU64,
    pub reject_sale_closed: AtomicU64,
    pub settle_confirmed: AtomicU64,
    pub settle_out_of_stock: AtomicU64,
    pub settle_not_found: AtomicU64,
    pub settle_system_error: AtomicU64,
    pub notify_delivered: AtomicU64,
    pub notify_dropped: AtomicU64,
    pub queue_depth: AtomicI64,
}

impl PerfCounters {
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "submit": {
                "received": self.submit_received.load(Ordering::Relaxed),
                "accepted": self.submit_accepted.load(Ordering::Relaxed),
                "reject_duplicate": self.reject_duplicate.load(Ordering::Relaxed),
                "reject_rate_limited": self.reject_rate_limited.load(Ordering::Relaxed),
                "reject_queue_full": self.reject_queue_full.load(Ordering::Relaxed),
                "reject_sale_closed": self.reject_sale_closed.load(Ordering::Relaxed),
            },
            "settle": {
                "confirmed": self.settle_confirmed.load(Ordering::Relaxed),
                "out_of_stock": self.settle_out_of_stock.load(Ordering::Relaxed),
                "not_found": self.settle_not_found.load(Ordering::Relaxed),
                "system_error": self.settle_system_error.load(Ordering::Relaxed),
            },
            "notify": {
                "delivered": self.notify_delivered.load(Ordering::Relaxed),
                "dropped": self.notify_dropped.load(Ordering::Relaxed),
            },
            "queue_depth": self.queue_depth.load(Ordering::Relaxed),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub ledger: Arc<dyn StockLedger>,
    pub gate: Arc<TokenGate>,
    pub limiter: Arc<RateLimiter>,
    pub stock_cache: Arc<StockReadCache>,
    pub bus: Arc<NotificationBus>,
    pub intent_tx: mpsc::Sender<PurchaseIntent>,
    pub purchase_status: Arc<DashMap<String, PurchaseStatus>>,
    sale_state: Arc<RwLock<SaleStatus>>,
    pub perf: Arc<PerfCounters>,
}

impl AppState {
    /// Wire up the shared state and hand back the receiving half of the
    /// admission queue for the settlement worker.
    pub fn build(
        cfg: Arc<AppConfig>,
        ledger: Arc<dyn StockLedger>,
    ) -> (Self, mpsc::Receiver<PurchaseIntent>) {
        let (intent_tx, intent_rx) = mpsc::channel(cfg.admission.queue_capacity);
        let state = Self {
            gate: Arc::new(TokenGate::new(cfg.admission.idempotency_ttl_ms)),
            limiter: Arc::new(RateLimiter::new(cfg.admission.rate_limit_cooldown_ms)),
            stock_cache: Arc::new(StockReadCache::new(cfg.cache.stock_ttl_ms)),
            bus: Arc::new(NotificationBus::new()),
            intent_tx,
            purchase_status: Arc::new(DashMap::new()),
            sale_state: Arc::new(RwLock::new(SaleStatus::Open)),
            perf: Arc::new(PerfCounters::default()),
            cfg,
            ledger,
        };
        (state, intent_rx)
    }

    pub async fn sale_status(&self) -> SaleStatus {
        *self.sale_state.read().await
    }

    /// Flip the sale flag. Every actual transition is announced on the
    /// global channel; setting the current value again is a no-op.
    pub async fn set_sale_status(&self, next: SaleStatus) -> bool {
        let changed = {
            let mut status = self.sale_state.write().await;
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        };
        if changed {
            self.bus.broadcast_sale_state(next);
        }
        changed
    }
}
