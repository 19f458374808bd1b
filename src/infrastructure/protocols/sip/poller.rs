//! Catalog polling
//!
//! A query is sent from a detached task so the receive loop never waits on
//! an outbound write. The Call-ID is recorded on the session before the
//! datagram leaves, so a fast reply always finds it.

use super::address::SipAddress;
use super::builder::HeaderBuilder;
use super::message::{Payload, SipMethod};
use super::transport::DatagramSink;
use crate::domain::device::DeviceSessionTracker;
use crate::domain::shared::{GatewayError, Result};
use crate::infrastructure::metrics;
use crate::infrastructure::protocols::manscdp;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CatalogPoller {
    tracker: Arc<DeviceSessionTracker>,
    builder: Arc<HeaderBuilder>,
    sink: Arc<dyn DatagramSink>,
    serial: Arc<AtomicU32>,
}

impl CatalogPoller {
    pub fn new(
        tracker: Arc<DeviceSessionTracker>,
        builder: Arc<HeaderBuilder>,
        sink: Arc<dyn DatagramSink>,
    ) -> Self {
        Self {
            tracker,
            builder,
            sink,
            serial: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fire-and-forget query; failures are logged, never retried
    pub fn spawn(&self, addr: SocketAddr, target: SipAddress) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = poller.send_query(addr, &target).await {
                warn!(%addr, "Catalog query failed: {}", e);
            }
        })
    }

    /// Build and send one catalog query. Returns its Call-ID.
    pub async fn send_query(&self, addr: SocketAddr, target: &SipAddress) -> Result<String> {
        let session = self
            .tracker
            .session(addr)
            .await
            .ok_or_else(|| GatewayError::SendFailure {
                destination: addr,
                reason: "no device session".to_string(),
            })?;

        let (request, dump) = {
            let mut session = session.lock().await;
            let device_id = target
                .user()
                .map(str::to_string)
                .unwrap_or_else(|| session.gb_id.clone());
            let serial_number = self.serial.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

            let request = self
                .builder
                .new_request(SipMethod::Message, target, session.next_cseq())
                .with_payload(Payload::manscdp(manscdp::encode_catalog_query(
                    serial_number,
                    &device_id,
                )));
            session.expect_catalog_response(request.call_id.clone());
            (request, !session.last_catalog_ok)
        };

        let bytes = request.to_bytes()?;
        if dump {
            info!(
                %addr,
                call_id = %request.call_id,
                "Catalog query after failed exchange:\n{}",
                String::from_utf8_lossy(&bytes)
            );
        }

        self.sink
            .send_to(&bytes, addr)
            .await
            .map_err(|e| {
                metrics::record_send_failure();
                GatewayError::SendFailure {
                    destination: addr,
                    reason: e.to_string(),
                }
            })?;

        metrics::record_catalog_query();
        debug!(%addr, call_id = %request.call_id, cseq = request.cseq, "Catalog query sent");
        Ok(request.call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::builder::LocalIdentity;
    use crate::infrastructure::protocols::sip::message::Message;
    use crate::infrastructure::protocols::sip::transport::testing::{FailingSink, RecordingSink};

    fn device() -> SocketAddr {
        "192.168.1.64:5060".parse().unwrap()
    }

    fn target() -> SipAddress {
        SipAddress::parse("<sip:34020000001320000001@3402000000>;tag=dev").unwrap()
    }

    fn builder() -> Arc<HeaderBuilder> {
        Arc::new(HeaderBuilder::new(
            LocalIdentity::new("31011500002000000001", "10.0.0.1", 5061),
            "QVS",
        ))
    }

    #[tokio::test]
    async fn test_send_query_records_call_id() {
        let tracker = Arc::new(DeviceSessionTracker::new());
        tracker.touch(device(), "34020000001320000001").await;
        let sink = Arc::new(RecordingSink::default());
        let poller = CatalogPoller::new(tracker.clone(), builder(), sink.clone());

        let call_id = poller.send_query(device(), &target()).await.unwrap();

        let session = tracker.snapshot(device()).await.unwrap();
        assert_eq!(session.catalog_call_id.as_deref(), Some(call_id.as_str()));
        assert_eq!(session.cseq, 1);

        let sent = sink.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, device());

        let query = Message::parse(&sent[0].0).unwrap();
        assert_eq!(query.method(), Some(SipMethod::Message));
        assert_eq!(query.call_id, call_id);
        assert_eq!(query.cseq, 1);
        assert!(query.to.tag().is_none());

        let body = manscdp::decode(&query.payload.unwrap().data).unwrap();
        assert_eq!(body.cmd_type, manscdp::CmdType::Catalog);
        assert_eq!(body.device_id, "34020000001320000001");
        assert_eq!(body.serial_number, Some(1));
    }

    #[tokio::test]
    async fn test_each_query_advances_cseq_and_call_id() {
        let tracker = Arc::new(DeviceSessionTracker::new());
        tracker.touch(device(), "34020000001320000001").await;
        let sink = Arc::new(RecordingSink::default());
        let poller = CatalogPoller::new(tracker.clone(), builder(), sink);

        let first = poller.send_query(device(), &target()).await.unwrap();
        let second = poller.send_query(device(), &target()).await.unwrap();

        assert_ne!(first, second);
        let session = tracker.snapshot(device()).await.unwrap();
        assert_eq!(session.cseq, 2);
        assert!(session.is_catalog_response(&second));
    }

    #[tokio::test]
    async fn test_send_failure_is_reported() {
        let tracker = Arc::new(DeviceSessionTracker::new());
        tracker.touch(device(), "34020000001320000001").await;
        let poller = CatalogPoller::new(tracker, builder(), Arc::new(FailingSink));

        let err = poller.send_query(device(), &target()).await.unwrap_err();
        assert!(matches!(err, GatewayError::SendFailure { .. }));
    }

    #[tokio::test]
    async fn test_query_without_session() {
        let tracker = Arc::new(DeviceSessionTracker::new());
        let sink = Arc::new(RecordingSink::default());
        let poller = CatalogPoller::new(tracker, builder(), sink.clone());

        assert!(poller.send_query(device(), &target()).await.is_err());
        assert!(sink.sent().await.is_empty());
    }
}
