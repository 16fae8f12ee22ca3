//! Postgres-backed stock ledger. Settlement takes a row lock on the item
//! so only one decrement is in flight per item, commits on success and
//! rolls back on every other path.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::ledger::{LedgerError, Settlement, StockLedger};

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for PgLedger {
    async fn settle(&self, item_id: &str) -> Result<Settlement, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT stock_quantity FROM items WHERE item_id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(Settlement::NotFound);
        };

        let current: i64 = row.get("stock_quantity");
        if current <= 0 {
            tx.rollback().await?;
            return Ok(Settlement::OutOfStock);
        }

        let remaining = current - 1;
        sqlx::query("UPDATE items SET stock_quantity = $1 WHERE item_id = $2")
            .bind(remaining)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Settlement::Confirmed { remaining })
    }

    async fn stock(&self, item_id: &str) -> Result<Option<i64>, LedgerError> {
        let row = sqlx::query("SELECT stock_quantity FROM items WHERE item_id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("stock_quantity")))
    }

    async fn restock(&self, item_id: &str, quantity: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query("UPDATE items SET stock_quantity = $1 WHERE item_id = $2")
            .bind(quantity)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
