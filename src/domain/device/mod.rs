//! Device bounded context
//!
//! Per-device signaling state (registration, liveness, catalog correlation)
//! and the observer port through which state changes leave the core.

pub mod observer;
pub mod session;
pub mod tracker;

pub use observer::{DeviceObserver, LoggingObserver, NoopObserver};
pub use session::{DeviceCatalogItem, DeviceSession};
pub use tracker::{
    CatalogNotifyOutcome, CatalogOutcome, DeviceSessionTracker, KeepaliveOutcome,
    RegisterOutcome, RegisterTransition, SharedSession, DEFAULT_CATALOG_POLL_INTERVAL,
};
