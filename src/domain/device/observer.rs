//! Observer port for device state notifications
//!
//! Callbacks fire synchronously from the dispatch loop. Implementations must
//! return promptly: hand the event off (channel, log) rather than doing I/O.

use super::session::DeviceCatalogItem;
use std::net::SocketAddr;
use tracing::info;

#[cfg_attr(test, mockall::automock)]
pub trait DeviceObserver: Send + Sync {
    fn on_register(&self, _count: u64) {}

    fn on_unregister(&self, _count: u64) {}

    fn on_keepalive(&self, _count: u64) {}

    /// First item of a catalog listing, with the running catalog count
    fn on_catalog(&self, _count: u64, _item: &DeviceCatalogItem) {}

    fn on_device_id(&self, _gb_id: &str) {}

    fn on_peer_address(&self, _addr: SocketAddr) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DeviceObserver for NoopObserver {}

/// Observer that writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl DeviceObserver for LoggingObserver {
    fn on_register(&self, count: u64) {
        info!(count, "device registered");
    }

    fn on_unregister(&self, count: u64) {
        info!(count, "device unregistered");
    }

    fn on_keepalive(&self, count: u64) {
        info!(count, "device keepalive");
    }

    fn on_catalog(&self, count: u64, item: &DeviceCatalogItem) {
        info!(
            count,
            name = %item.name,
            chid = %item.id,
            model = %item.model,
            manufacturer = %item.manufacturer,
            "device catalog"
        );
    }

    fn on_device_id(&self, gb_id: &str) {
        info!(gb_id, "device id");
    }

    fn on_peer_address(&self, addr: SocketAddr) {
        info!(%addr, "device address");
    }
}
