//! The stock ledger is the only durable authority on remaining stock.
//! Settlement decrements under a row lock so concurrent workers could
//! never drive a count negative; everything upstream (queue, cache,
//! notifications) is advisory.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result of attempting to settle one admitted purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed { remaining: i64 },
    OutOfStock,
    NotFound,
}

#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Atomically decrement stock for `item_id` by one, or report why not.
    async fn settle(&self, item_id: &str) -> Result<Settlement, LedgerError>;

    /// Current stock count, None for an unknown item.
    async fn stock(&self, item_id: &str) -> Result<Option<i64>, LedgerError>;

    /// Set the stock count outright. Returns false for an unknown item.
    async fn restock(&self, item_id: &str, quantity: i64) -> Result<bool, LedgerError>;
}

#[derive(Debug, Clone)]
pub struct ItemRow {
    pub name: String,
    pub stock_quantity: i64,
}

/// In-process ledger with the same settlement semantics as the Postgres
/// one. The single mutex stands in for the row lock.
pub struct MemoryLedger {
    items: Mutex<HashMap<String, ItemRow>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self { items: Mutex::new(HashMap::new()) }
    }

    pub async fn insert_item(&self, item_id: &str, name: &str, stock_quantity: i64) {
        let mut items = self.items.lock().await;
        items.insert(
            item_id.to_string(),
            ItemRow { name: name.to_string(), stock_quantity },
        );
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StockLedger for MemoryLedger {
    async fn settle(&self, item_id: &str) -> Result<Settlement, LedgerError> {
        let mut items = self.items.lock().await;
        let Some(item) = items.get_mut(item_id) else {
            return Ok(Settlement::NotFound);
        };
        if item.stock_quantity > 0 {
            item.stock_quantity -= 1;
            Ok(Settlement::Confirmed { remaining: item.stock_quantity })
        } else {
            Ok(Settlement::OutOfStock)
        }
    }

    async fn stock(&self, item_id: &str) -> Result<Option<i64>, LedgerError> {
        let items = self.items.lock().await;
        Ok(items.get(item_id).map(|item| item.stock_quantity))
    }

    async fn restock(&self, item_id: &str, quantity: i64) -> Result<bool, LedgerError> {
        let mut items = self.items.lock().await;
        match items.get_mut(item_id) {
            Some(item) => {
                item.stock_quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
