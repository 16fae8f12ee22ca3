//! Fan-out of settlement outcomes and sale-wide announcements.
//!
//! Each requester gets a room keyed by requester id; outcome events are
//! delivered only to that room. Announcements (stock changes, sale
//! open/close) go out on a single global channel every connection
//! subscribes to. Delivery is fire and forget: an event sent while the
//! requester has no live connection is dropped, never queued.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::state::{RejectReason, SaleStatus};

const ROOM_CAPACITY: usize = 64;
const GLOBAL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeEvent {
    OrderConfirmed {
        request_token: String,
        item_id: String,
        remaining_stock: i64,
    },
    OrderRejected {
        request_token: String,
        item_id: String,
        reason: RejectReason,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    StockChanged { item_id: String, remaining_stock: i64 },
    SaleStateChanged { status: SaleStatus },
}

pub struct NotificationBus {
    rooms: DashMap<String, broadcast::Sender<OutcomeEvent>>,
    global: broadcast::Sender<BroadcastEvent>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(GLOBAL_CAPACITY);
        Self { rooms: DashMap::new(), global }
    }

    /// Join the room for `requester_id`, creating it on first subscribe.
    pub fn subscribe(&self, requester_id: &str) -> broadcast::Receiver<OutcomeEvent> {
        self.rooms
            .entry(requester_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.global.subscribe()
    }

    /// Deliver an outcome to one requester. Returns false when nobody is
    /// listening; the event is simply lost in that case.
    pub fn notify(&self, requester_id: &str, event: OutcomeEvent) -> bool {
        let Some(room) = self.rooms.get(requester_id) else {
            return false;
        };
        room.send(event).is_ok()
    }

    pub fn broadcast_stock(&self, item_id: &str, remaining_stock: i64) {
        let _ = self.global.send(BroadcastEvent::StockChanged {
            item_id: item_id.to_string(),
            remaining_stock,
        });
    }

    pub fn broadcast_sale_state(&self, status: SaleStatus) {
        let _ = self.global.send(BroadcastEvent::SaleStateChanged { status });
    }

    /// Drop rooms whose last connection has gone away.
    pub fn prune_rooms(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| room.receiver_count() > 0);
        before - self.rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
