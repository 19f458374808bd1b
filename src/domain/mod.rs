//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Device sessions and the tracker that owns them
//! - The observer port for device notifications
//! - The gateway error taxonomy

pub mod device;
pub mod shared;

// Re-export commonly used types
pub use shared::{GatewayError, Result};
