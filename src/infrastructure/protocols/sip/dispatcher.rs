//! Per-datagram dispatch: classify, update device state, answer
//!
//! Every error returned here is scoped to one datagram. The server loop
//! logs it and moves on.

use super::builder::HeaderBuilder;
use super::message::{Message, MessageKind, SipMethod};
use super::poller::CatalogPoller;
use super::transport::DatagramSink;
use crate::domain::device::{
    CatalogOutcome, DeviceObserver, DeviceSessionTracker, RegisterTransition,
};
use crate::domain::shared::{GatewayError, Result};
use crate::infrastructure::metrics;
use crate::infrastructure::protocols::manscdp::{self, CmdType, ManscdpMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Some device firmwares emit bare 4-byte datagrams between messages
pub const NOISE_DATAGRAM_LEN: usize = 4;

/// Expiry assumed when a REGISTER carries none
const IMPLICIT_REGISTER_EXPIRES: u32 = 3600;

pub struct Dispatcher {
    tracker: Arc<DeviceSessionTracker>,
    builder: Arc<HeaderBuilder>,
    sink: Arc<dyn DatagramSink>,
    observer: Arc<dyn DeviceObserver>,
    poller: CatalogPoller,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<DeviceSessionTracker>,
        builder: Arc<HeaderBuilder>,
        sink: Arc<dyn DatagramSink>,
        observer: Arc<dyn DeviceObserver>,
    ) -> Self {
        let poller = CatalogPoller::new(tracker.clone(), builder.clone(), sink.clone());
        Self {
            tracker,
            builder,
            sink,
            observer,
            poller,
        }
    }

    pub fn tracker(&self) -> &Arc<DeviceSessionTracker> {
        &self.tracker
    }

    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Result<()> {
        metrics::record_datagram_received();

        if data.len() == NOISE_DATAGRAM_LEN {
            debug!(%source, "Discarding {}-byte keep-alive noise", NOISE_DATAGRAM_LEN);
            metrics::record_datagram_dropped("noise");
            return Ok(());
        }

        let message = Message::parse(data).map_err(|e| {
            metrics::record_datagram_dropped("malformed");
            GatewayError::from(e)
        })?;

        match message.kind {
            MessageKind::Request { method, .. } => self.handle_request(method, &message, source).await,
            MessageKind::Response { status, .. } => {
                self.handle_response(status, &message, data, source).await
            }
        }
    }

    async fn handle_request(
        &self,
        method: SipMethod,
        message: &Message,
        source: SocketAddr,
    ) -> Result<()> {
        let gb_id = message.from.user().unwrap_or_default();
        let (_, created) = self.tracker.touch(source, gb_id).await;
        if created {
            self.observer.on_peer_address(source);
            metrics::update_device_sessions(self.tracker.session_count().await);
        }

        match method {
            SipMethod::Register => self.handle_register(message, source).await,
            SipMethod::Message => self.handle_message(message, source).await,
            other => Err(GatewayError::UnhandledMethod(other.to_string())),
        }
    }

    async fn handle_register(&self, message: &Message, source: SocketAddr) -> Result<()> {
        let gb_id = message.from.user().unwrap_or_default();
        let expires = message
            .register_expires()
            .unwrap_or(IMPLICIT_REGISTER_EXPIRES);

        let outcome = self.tracker.on_register(source, gb_id, expires).await;
        self.log_user_agent(message, source).await;
        if message.authorization.is_some() {
            debug!(%source, gb_id, "REGISTER carries Authorization, passed through unverified");
        }

        self.observer.on_device_id(gb_id);
        match outcome.transition {
            RegisterTransition::Registered => {
                info!(%source, gb_id, expires, count = outcome.count, "Device registered");
                metrics::record_registration();
                self.observer.on_register(outcome.count);
            }
            RegisterTransition::Unregistered => {
                info!(%source, gb_id, count = outcome.count, "Device unregistered");
                metrics::record_unregistration();
                self.observer.on_unregister(outcome.count);
            }
        }

        self.respond(message, source, 200).await
    }

    async fn handle_message(&self, message: &Message, source: SocketAddr) -> Result<()> {
        let Some(payload) = message.payload.as_ref().filter(|p| p.is_manscdp()) else {
            info!(
                %source,
                content_type = message.payload.as_ref().map(|p| p.content_type.as_str()),
                "MESSAGE without a MANSCDP body"
            );
            return self.respond(message, source, 200).await;
        };

        let body = match manscdp::decode(&payload.data) {
            Ok(body) => body,
            Err(e) => {
                // The device still gets its protocol-level answer.
                self.respond(message, source, 200).await?;
                return Err(e);
            }
        };

        match &body.cmd_type {
            CmdType::Keepalive => self.handle_keepalive(message, &body, source).await,
            CmdType::Catalog => self.handle_catalog_notify(message, &body, source).await,
            CmdType::Alarm => {
                info!(
                    %source,
                    device_id = %body.device_id,
                    sn = ?body.serial_number,
                    "Alarm notification"
                );
                self.respond(message, source, 200).await
            }
            CmdType::Other(cmd) => {
                info!(%source, cmd_type = %cmd, "Unhandled MANSCDP command");
                self.respond(message, source, 200).await
            }
        }
    }

    async fn handle_keepalive(
        &self,
        message: &Message,
        body: &ManscdpMessage,
        source: SocketAddr,
    ) -> Result<()> {
        let gb_id = message.from.user().unwrap_or_default();

        let outcome = self.tracker.on_keepalive(source, gb_id).await;
        self.log_user_agent(message, source).await;
        metrics::record_keepalive();

        if outcome.became_online {
            info!(%source, gb_id, device_id = %body.device_id, "Device online");
        }
        debug!(%source, gb_id, device_id = %body.device_id, count = outcome.count, "Keepalive");
        self.observer.on_device_id(gb_id);
        self.observer.on_keepalive(outcome.count);

        let answered = self.respond(message, source, 200).await;

        // The count has already advanced; a lost 200 must not skip this poll.
        if outcome.poll_catalog {
            self.poller.spawn(source, message.from.clone());
        }
        answered
    }

    async fn handle_catalog_notify(
        &self,
        message: &Message,
        body: &ManscdpMessage,
        source: SocketAddr,
    ) -> Result<()> {
        let gb_id = message.from.user().unwrap_or_default();
        let outcome = self
            .tracker
            .on_catalog_notify(source, gb_id, &body.items)
            .await;

        match &outcome.first_item {
            Some(item) => {
                info!(
                    %source,
                    count = outcome.count,
                    items = body.items.len(),
                    sum_num = ?body.sum_num,
                    "Catalog received"
                );
                self.observer.on_catalog(outcome.count, item);
            }
            None => info!(%source, "Catalog with zero items"),
        }

        self.respond(message, source, 200).await
    }

    async fn handle_response(
        &self,
        status: u16,
        message: &Message,
        raw: &[u8],
        source: SocketAddr,
    ) -> Result<()> {
        match message.cseq_method {
            SipMethod::Message => {
                let items = match message.payload.as_ref().filter(|p| p.is_manscdp()) {
                    Some(payload) => match manscdp::decode(&payload.data) {
                        Ok(body) => body.items,
                        Err(e) => {
                            warn!(%source, status, call_id = %message.call_id, "{}", e);
                            Vec::new()
                        }
                    },
                    None => Vec::new(),
                };

                match self
                    .tracker
                    .on_catalog_response(source, &message.call_id, status, &items)
                    .await
                {
                    CatalogOutcome::Ignored { .. } => Err(self.uncorrelated(message, status)),
                    CatalogOutcome::Provisional => {
                        debug!(%source, status, call_id = %message.call_id, "Provisional catalog response");
                        Ok(())
                    }
                    CatalogOutcome::Accepted { ok, surfaced } => {
                        metrics::record_catalog_response(status);
                        if ok {
                            debug!(%source, call_id = %message.call_id, "Catalog query accepted");
                        } else {
                            warn!(
                                %source,
                                status,
                                call_id = %message.call_id,
                                "Catalog query rejected:\n{}",
                                String::from_utf8_lossy(raw)
                            );
                        }
                        if let Some((count, item)) = surfaced {
                            self.observer.on_catalog(count, &item);
                        }
                        Ok(())
                    }
                }
            }
            SipMethod::Invite if status >= 200 => {
                let ack = self.builder.ack(message);
                debug!(%source, call_id = %message.call_id, "ACK for INVITE response");
                self.send(&ack, source).await?;
                self.tracker.next_cseq(source).await;
                Ok(())
            }
            _ => Err(self.uncorrelated(message, status)),
        }
    }

    fn uncorrelated(&self, message: &Message, status: u16) -> GatewayError {
        GatewayError::UnhandledResponseCorrelation {
            method: message.cseq_method.to_string(),
            status,
            call_id: message.call_id.clone(),
        }
    }

    async fn log_user_agent(&self, message: &Message, source: SocketAddr) {
        if let Some(user_agent) = &message.user_agent {
            if self.tracker.claim_user_agent_log(source).await {
                info!(%source, user_agent = %user_agent, "Device user agent");
            }
        }
    }

    async fn respond(&self, request: &Message, source: SocketAddr, status: u16) -> Result<()> {
        let response = self.builder.response(request, source, status);
        self.send(&response, source).await
    }

    async fn send(&self, message: &Message, destination: SocketAddr) -> Result<()> {
        let bytes = message.to_bytes()?;
        self.sink.send_to(&bytes, destination).await.map_err(|e| {
            metrics::record_send_failure();
            GatewayError::SendFailure {
                destination,
                reason: e.to_string(),
            }
        })
    }
}
