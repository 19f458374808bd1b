/// Device event streaming for the presentation layer
use crate::domain::device::{DeviceCatalogItem, DeviceObserver};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tracing::debug;

/// Device event types, one per observer callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Register {
        count: u64,
    },
    Unregister {
        count: u64,
    },
    Keepalive {
        count: u64,
    },
    Catalog {
        count: u64,
        name: String,
        chid: String,
        model: String,
        manufacturer: String,
    },
    DeviceId {
        gb_id: String,
    },
    PeerAddress {
        addr: String,
    },
}

impl GatewayEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Event broadcaster
pub struct EventBroadcaster {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBroadcaster {
    /// Create new event broadcaster with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    /// Never blocks; a slow subscriber lags instead
    pub fn broadcast(&self, event: GatewayEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl DeviceObserver for EventBroadcaster {
    fn on_register(&self, count: u64) {
        self.broadcast(GatewayEvent::Register { count });
    }

    fn on_unregister(&self, count: u64) {
        self.broadcast(GatewayEvent::Unregister { count });
    }

    fn on_keepalive(&self, count: u64) {
        self.broadcast(GatewayEvent::Keepalive { count });
    }

    fn on_catalog(&self, count: u64, item: &DeviceCatalogItem) {
        self.broadcast(GatewayEvent::Catalog {
            count,
            name: item.name.clone(),
            chid: item.id.clone(),
            model: item.model.clone(),
            manufacturer: item.manufacturer.clone(),
        });
    }

    fn on_device_id(&self, gb_id: &str) {
        self.broadcast(GatewayEvent::DeviceId {
            gb_id: gb_id.to_string(),
        });
    }

    fn on_peer_address(&self, addr: SocketAddr) {
        self.broadcast(GatewayEvent::PeerAddress {
            addr: addr.to_string(),
        });
    }
}
