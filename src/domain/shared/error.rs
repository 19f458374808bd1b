//! Gateway errors

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid catalog payload: {0}")]
    InvalidCatalogPayload(String),

    #[error("Unhandled method: {0}")]
    UnhandledMethod(String),

    #[error("Unhandled {status} response to {method} (Call-ID {call_id})")]
    UnhandledResponseCorrelation {
        method: String,
        status: u16,
        call_id: String,
    },

    #[error("Failed to send to {destination}: {reason}")]
    SendFailure {
        destination: SocketAddr,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Errors that describe traffic the gateway chose not to act on.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            GatewayError::UnhandledMethod(_) | GatewayError::UnhandledResponseCorrelation { .. }
        )
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}
