//! Interface layer - External interfaces
//!
//! This layer handles:
//! - Device event streaming to the presentation layer
//! - Event formatting (JSON)

pub mod events;

pub use events::{EventBroadcaster, GatewayEvent};
