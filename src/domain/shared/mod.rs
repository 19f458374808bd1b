//! Shared kernel - error taxonomy and result type

pub mod error;
pub mod result;

pub use error::GatewayError;
pub use result::Result;
