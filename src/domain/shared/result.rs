//! Gateway result type

use super::error::GatewayError;

/// Standard result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
