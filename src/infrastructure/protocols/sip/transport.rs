//! SIP transport layer - one shared UDP socket
//!
//! The receive loop owns reads. Writes go through [`DatagramSink`], which the
//! loop and every detached catalog-poll task share.

use super::message::SipError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Anything that can send a whole datagram to a peer.
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait DatagramSink: Send + Sync {
    async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<(), SipError>;
}

/// UDP transport implementation
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, SipError> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            SipError::TransportError(format!("Failed to bind UDP socket on {}: {}", bind_addr, e))
        })?;
        info!("UDP transport listening on {}", bind_addr);

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SipError> {
        self.socket
            .local_addr()
            .map_err(|e| SipError::TransportError(e.to_string()))
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SipError> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| SipError::TransportError(e.to_string()))
    }
}

#[async_trait]
impl DatagramSink for UdpTransport {
    async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<(), SipError> {
        let sent = self
            .socket
            .send_to(data, destination)
            .await
            .map_err(|e| SipError::TransportError(e.to_string()))?;
        debug!("Sent {} bytes to {} via UDP", sent, destination);

        if sent != data.len() {
            return Err(SipError::TransportError(format!(
                "short datagram write: {} of {} bytes",
                sent,
                data.len()
            )));
        }
        Ok(())
    }
}
