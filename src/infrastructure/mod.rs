//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Protocol implementations (SIP, MANSCDP)
//! - Logging and metrics setup
//! - Local network discovery

pub mod logging;
pub mod metrics;
pub mod net;
pub mod protocols;
