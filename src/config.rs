use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub admission: AdmissionConfig,
    pub cache: CacheConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub max_lifetime_seconds: u64,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionConfig {
    /// How long a claimed request token blocks replays.
    pub idempotency_ttl_ms: i64,
    /// Minimum gap between two admitted requests from the same requester.
    pub rate_limit_cooldown_ms: i64,
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub stock_ttl_ms: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub token: String,
}

pub fn load_config() -> Result<AppConfig> {
    let cfg = AppConfig {
        database: DatabaseConfig {
            url: env_required("DATABASE_URL")?,
            min_pool_size: env_u32("DB_MIN_POOL_SIZE", 5),
            max_pool_size: env_u32("DB_MAX_POOL_SIZE", 40),
            max_lifetime_seconds: env_u64("DB_MAX_LIFETIME_SECONDS", 1800),
            acquire_timeout_seconds: env_u64("DB_ACQUIRE_TIMEOUT_SECONDS", 30),
        },
        api: ApiConfig {
            host: env_string("API_HOST", "0.0.0.0"),
            port: env_u16("API_PORT", 8000),
            cors_origins: env_list("CORS_ORIGINS", &["*"]),
        },
        admission: AdmissionConfig {
            idempotency_ttl_ms: env_i64("IDEMPOTENCY_TTL_MS", 30_000),
            rate_limit_cooldown_ms: env_i64("RATE_LIMIT_COOLDOWN_MS", 5_000),
            queue_capacity: env_usize("ADMISSION_QUEUE_CAPACITY", 100_000),
        },
        cache: CacheConfig {
            stock_ttl_ms: env_i64("STOCK_CACHE_TTL_MS", 1_000),
        },
        admin: AdminConfig {
            token: env_required("ADMIN_TOKEN")?,
        },
    };
    if cfg.admission.queue_capacity == 0 {
        return Err(anyhow!("ADMISSION_QUEUE_CAPACITY must be positive"));
    }
    Ok(cfg)
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {key}"))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
