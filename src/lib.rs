//! Flash-sale purchase admission and settlement service.
//!
//! Submissions pass an idempotency gate and a per-requester rate limit,
//! then queue into a bounded channel consumed by a single settlement
//! worker. The worker decrements stock in the ledger under a row lock,
//! refreshes a short-TTL read cache, and pushes outcomes to requesters
//! over websockets.

pub mod admission;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod ledger;
pub mod state;
pub mod store;
pub mod tasks;
pub mod ws;
