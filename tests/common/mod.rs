use std::sync::Arc;
use std::time::Duration;

use flashdrop::config::{
    AdminConfig, AdmissionConfig, ApiConfig, AppConfig, CacheConfig, DatabaseConfig,
};
use flashdrop::ledger::{MemoryLedger, StockLedger};
use flashdrop::state::{AppState, PurchaseStatus};
use flashdrop::tasks::start_background_tasks;

pub const ITEM: &str = "sneaker-001";
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn test_config() -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            min_pool_size: 1,
            max_pool_size: 1,
            max_lifetime_seconds: 60,
            acquire_timeout_seconds: 5,
        },
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
        },
        admission: AdmissionConfig {
            idempotency_ttl_ms: 30_000,
            rate_limit_cooldown_ms: 5_000,
            queue_capacity: 64,
        },
        cache: CacheConfig { stock_ttl_ms: 1_000 },
        admin: AdminConfig { token: ADMIN_TOKEN.to_string() },
    }
}

/// State wired to an in-memory ledger seeded with `stock` units of the
/// test item, with background tasks running.
pub async fn spawn_state(stock: i64) -> (AppState, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert_item(ITEM, "Air Velocity 9", stock).await;
    let dyn_ledger: Arc<dyn StockLedger> = ledger.clone();
    let (state, intent_rx) = AppState::build(Arc::new(test_config()), dyn_ledger);
    start_background_tasks(state.clone(), intent_rx);
    (state, ledger)
}

pub async fn wait_settled(state: &AppState, token: &str) -> PurchaseStatus {
    for _ in 0..200 {
        if let Some(status) = state.purchase_status.get(token) {
            if status.is_settled() {
                return status.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("purchase {token} did not settle in time");
}
