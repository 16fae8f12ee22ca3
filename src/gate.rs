//! Admission-side filters: the idempotency gate and the per-requester
//! rate limiter. Both are in-process maps with millisecond expiries and
//! are pruned by a background task.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::state::now_epoch_ms;

/// Claim-if-absent registry of request tokens. The first claim of a token
/// wins; replays within the TTL are rejected without touching the queue
/// or the ledger.
pub struct TokenGate {
    claims: DashMap<String, i64>,
    ttl_ms: i64,
}

impl TokenGate {
    pub fn new(ttl_ms: i64) -> Self {
        Self { claims: DashMap::new(), ttl_ms }
    }

    /// Atomically claim `token`. Returns false if a live claim already exists.
    pub fn claim(&self, token: &str) -> bool {
        let now = now_epoch_ms();
        match self.claims.entry(token.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() <= now {
                    occupied.insert(now + self.ttl_ms);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + self.ttl_ms);
                true
            }
        }
    }

    /// Drop a claim so the same token can be resubmitted. Used when an
    /// admitted request fails to enqueue.
    pub fn release(&self, token: &str) {
        self.claims.remove(token);
    }

    pub fn prune(&self) -> usize {
        let now = now_epoch_ms();
        let before = self.claims.len();
        self.claims.retain(|_, expires_at| *expires_at > now);
        before - self.claims.len()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// One admitted request per requester per cooldown window.
pub struct RateLimiter {
    windows: DashMap<String, i64>,
    cooldown_ms: i64,
}

impl RateLimiter {
    pub fn new(cooldown_ms: i64) -> Self {
        Self { windows: DashMap::new(), cooldown_ms }
    }

    /// Returns true if `requester_id` may proceed, opening a new cooldown
    /// window as a side effect.
    pub fn try_admit(&self, requester_id: &str) -> bool {
        let now = now_epoch_ms();
        match self.windows.entry(requester_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() <= now {
                    occupied.insert(now + self.cooldown_ms);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + self.cooldown_ms);
                true
            }
        }
    }

    pub fn prune(&self) -> usize {
        let now = now_epoch_ms();
        let before = self.windows.len();
        self.windows.retain(|_, expires_at| *expires_at > now);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }
}
