//! SIP server - the receive loop over one UDP socket

use super::dispatcher::Dispatcher;
use super::transport::UdpTransport;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Default receive buffer; larger datagrams are truncated
pub const DEFAULT_RECV_BUFFER: usize = 2048;

/// Shared stop flag for a running loop
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the flag and wake a pending receive. The datagram being
    /// dispatched, if any, completes first.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub(crate) async fn stopped(&self) {
        self.notify.notified().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GatewayServer {
    transport: UdpTransport,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
    recv_buffer: usize,
}

impl GatewayServer {
    pub fn new(
        transport: UdpTransport,
        dispatcher: Arc<Dispatcher>,
        shutdown: ShutdownSignal,
        recv_buffer: usize,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            shutdown,
            recv_buffer: recv_buffer.max(1),
        }
    }

    /// Receive until stopped. Nothing a datagram does ends the loop.
    pub async fn run(self) {
        let mut buf = vec![0u8; self.recv_buffer];
        info!("Receive loop started");

        while self.shutdown.is_running() {
            let received = tokio::select! {
                _ = self.shutdown.stopped() => break,
                received = self.transport.recv_from(&mut buf) => received,
            };

            let (len, source) = match received {
                Ok(received) => received,
                Err(e) => {
                    // ICMP port-unreachable from an earlier send surfaces here on some platforms
                    warn!("UDP receive failed: {}", e);
                    continue;
                }
            };
            debug!("Received {} bytes from {}", len, source);
            if len == buf.len() {
                warn!(
                    %source,
                    recv_buffer = buf.len(),
                    "Datagram filled the receive buffer and was probably truncated"
                );
            }

            let outcome = AssertUnwindSafe(self.dispatcher.handle_datagram(&buf[..len], source))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_informational() => info!(%source, "{}", e),
                Ok(Err(e)) => warn!(%source, "{}", e),
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%source, "Recovered from fault while dispatching datagram: {}", reason);
                }
            }
        }

        info!("Receive loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::{DeviceSessionTracker, NoopObserver};
    use crate::infrastructure::protocols::sip::builder::{HeaderBuilder, LocalIdentity};
    use crate::infrastructure::protocols::sip::message::Message;
    use crate::infrastructure::protocols::sip::transport::DatagramSink;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn register(call_id: &str, padding: usize) -> Vec<u8> {
        format!(
            "REGISTER sip:31011500002000000001@3101150000 SIP/2.0\r\n\
             Subject: gbgate{}\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:5060;rport;branch=z9hG4bK{call_id}\r\n\
             From: <sip:34020000001320000001@3402000000>;tag=1\r\n\
             To: <sip:34020000001320000001@3402000000>\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 1 REGISTER\r\n\
             User-Agent: IP Camera\r\n\
             Expires: 3600\r\n\
             Content-Length: 0\r\n\r\n",
            "x".repeat(padding)
        )
        .into_bytes()
    }

    async fn start_loop(recv_buffer: usize) -> (SocketAddr, ShutdownSignal) {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local = transport.local_addr().unwrap();
        let sink: Arc<dyn DatagramSink> = Arc::new(transport.clone());
        let builder = Arc::new(HeaderBuilder::new(
            LocalIdentity::new("31011500002000000001", "127.0.0.1", local.port()),
            "QVS",
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(DeviceSessionTracker::new()),
            builder,
            sink,
            Arc::new(NoopObserver),
        ));

        let shutdown = ShutdownSignal::new();
        let server = GatewayServer::new(transport, dispatcher, shutdown.clone(), recv_buffer);
        tokio::spawn(server.run());
        (local, shutdown)
    }

    async fn answer(device: &tokio::net::UdpSocket) -> Option<Message> {
        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_millis(300), device.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Message::parse(&buf[..len]).ok()
    }

    #[tokio::test]
    async fn test_buffer_sized_datagrams() {
        let exact = register("exact", 0);
        let (gateway, shutdown) = start_loop(exact.len()).await;
        let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Exactly buffer-sized: warned about but still handled
        device.send_to(&exact, gateway).await.unwrap();
        assert_eq!(answer(&device).await.unwrap().call_id, "exact");

        // Larger: cut short, dropped, and the loop keeps going
        device.send_to(&register("long", 512), gateway).await.unwrap();
        assert!(answer(&device).await.is_none());

        device.send_to(&register("again", 0), gateway).await.unwrap();
        assert_eq!(answer(&device).await.unwrap().call_id, "again");

        shutdown.stop();
    }

    #[tokio::test]
    async fn test_stop_before_wait_is_not_lost() {
        let shutdown = ShutdownSignal::new();
        assert!(shutdown.is_running());

        shutdown.stop();
        assert!(!shutdown.is_running());

        // notify_one stores a permit when nobody is waiting yet
        tokio::time::timeout(std::time::Duration::from_secs(1), shutdown.stopped())
            .await
            .unwrap();
    }
}
