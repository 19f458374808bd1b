//! Application layer - Use cases and application services
//!
//! This layer wires domain state and protocol infrastructure together:
//! - Gateway lifecycle (start, stop, introspection)
//! - Register probe (client-side REGISTER check)

pub mod gateway;
pub mod register_probe;

pub use gateway::{Gateway, GatewayHandle};
pub use register_probe::{probe_register, PROBE_TIMEOUT};
