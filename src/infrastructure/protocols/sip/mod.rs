//! SIP protocol implementation, GB28181 profile
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   Server (recv loop)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐     ┌──────────────────┐
//! │      Dispatcher         ├────►│  Catalog poller  │
//! └───────────┬─────────────┘     └────────┬─────────┘
//!             │                            │
//! ┌───────────▼────────────────────────────▼─────────┐
//! │   Message model / header builder (over rsip)     │
//! └───────────┬──────────────────────────────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport (UDP)       │
//! └─────────────────────────┘
//! ```

pub mod address;
pub mod builder;
pub mod dispatcher;
pub mod message;
pub mod params;
pub mod poller;
pub mod server;
pub mod transport;

pub use address::{SipAddress, SipUri, Via};
pub use builder::{HeaderBuilder, LocalIdentity, ResponseBuilder};
pub use dispatcher::Dispatcher;
pub use message::{Message, MessageKind, Payload, SipError, SipMethod};
pub use params::ParamChain;
pub use poller::CatalogPoller;
pub use server::{GatewayServer, ShutdownSignal};
pub use transport::{DatagramSink, UdpTransport};
