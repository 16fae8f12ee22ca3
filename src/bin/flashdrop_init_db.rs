//! Provision the items table and seed the sale item. Safe to re-run:
//! reseeding resets the stock count for the configured item.

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    stock_quantity BIGINT NOT NULL CHECK (stock_quantity >= 0),
    initial_stock BIGINT NOT NULL CHECK (initial_stock >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow!("missing required env var: DATABASE_URL"))?;
    let item_id = env_string("ITEM_ID", "sneaker-001");
    let item_name = env_string("ITEM_NAME", "Air Velocity 9");
    let initial_stock = env_i64("INITIAL_STOCK", 100);
    if initial_stock < 0 {
        return Err(anyhow!("INITIAL_STOCK must be non-negative"));
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .context("failed to connect to postgres")?;

    for statement in SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(&pool)
            .await
            .with_context(|| format!("schema statement failed: {statement}"))?;
    }

    sqlx::query(
        "INSERT INTO items (item_id, name, stock_quantity, initial_stock) \
         VALUES ($1, $2, $3, $3) \
         ON CONFLICT (item_id) DO UPDATE \
         SET name = EXCLUDED.name, \
             stock_quantity = EXCLUDED.stock_quantity, \
             initial_stock = EXCLUDED.initial_stock",
    )
    .bind(&item_id)
    .bind(&item_name)
    .bind(initial_stock)
    .execute(&pool)
    .await
    .context("failed to seed item")?;

    println!("initialized items table");
    println!("seeded item_id={item_id} name={item_name:?} stock={initial_stock}");
    Ok(())
}
