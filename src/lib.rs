//! gbgate - a GB28181 signaling gateway
//!
//! Devices register, send keepalives and answer catalog queries over SIP/UDP
//! with MANSCDP XML bodies. The gateway answers them, tracks per-device state
//! and reports changes through a [`domain::device::DeviceObserver`].

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::{probe_register, Gateway, GatewayHandle};
pub use domain::device::{DeviceCatalogItem, DeviceObserver, DeviceSession};
pub use domain::shared::error::GatewayError;
pub use domain::shared::result::Result;
