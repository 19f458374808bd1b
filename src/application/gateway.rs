//! Gateway lifecycle: bind, spawn the receive loop, stop

use crate::config::Config;
use crate::domain::device::{DeviceObserver, DeviceSessionTracker};
use crate::domain::shared::{GatewayError, Result};
use crate::infrastructure::protocols::sip::{
    DatagramSink, Dispatcher, GatewayServer, HeaderBuilder, LocalIdentity, ShutdownSignal,
    UdpTransport,
};
use crate::infrastructure::{logging, metrics, net};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing::{info, warn};

pub struct Gateway;

impl Gateway {
    /// Open the socket and start receiving. A bind failure is returned as
    /// [`GatewayError::Transport`]; nothing after that stops the loop
    /// except [`GatewayHandle::stop`].
    pub async fn start(
        config: Config,
        observer: Arc<dyn DeviceObserver>,
        log_enabled: bool,
    ) -> Result<GatewayHandle> {
        let log_guard = logging::init(&config.logging, log_enabled)?;

        if let Some(listen) = config.metrics.listen {
            if let Err(e) = metrics::init_metrics(listen) {
                warn!("Metrics disabled: {}", e);
            }
        }

        let sip = &config.sip;
        let transport = UdpTransport::bind(sip.bind_addr()?).await?;
        let local_addr = transport.local_addr()?;

        let identity = LocalIdentity::new(
            sip.server_id.clone(),
            net::advertised_host(sip.host.as_deref()),
            local_addr.port(),
        );
        info!(
            server_id = %identity.gb_id,
            host = %identity.host,
            port = identity.port,
            "Starting GB28181 gateway"
        );

        let builder = Arc::new(
            HeaderBuilder::new(identity, sip.user_agent.clone())
                .with_fixed_branch(sip.fixed_branch.clone())
                .with_response_expires(sip.response_expires),
        );
        let tracker = Arc::new(DeviceSessionTracker::with_poll_interval(
            sip.catalog_poll_interval,
        ));
        let sink: Arc<dyn DatagramSink> = Arc::new(transport.clone());
        let dispatcher = Arc::new(Dispatcher::new(tracker.clone(), builder, sink, observer));

        let shutdown = ShutdownSignal::new();
        let server = GatewayServer::new(transport, dispatcher, shutdown.clone(), sip.recv_buffer);
        let join = tokio::spawn(server.run());

        Ok(GatewayHandle {
            local_addr,
            tracker,
            shutdown,
            join,
            _log_guard: log_guard,
        })
    }
}

pub struct GatewayHandle {
    local_addr: SocketAddr,
    tracker: Arc<DeviceSessionTracker>,
    shutdown: ShutdownSignal,
    join: JoinHandle<()>,
    /// Flushes the log file once the handle is gone
    _log_guard: Option<WorkerGuard>,
}

impl GatewayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tracker(&self) -> Arc<DeviceSessionTracker> {
        self.tracker.clone()
    }

    /// Ask the loop to exit after the datagram in hand, if any
    pub fn stop(&self) {
        info!("Stopping gateway");
        self.shutdown.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running() && !self.join.is_finished()
    }

    /// Wait for the receive loop to exit
    pub async fn join(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| GatewayError::Transport(format!("receive loop aborted: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::NoopObserver;
    use std::time::Duration;

    fn config() -> Config {
        let mut config = Config::default();
        config.sip.bind_address = "127.0.0.1".to_string();
        config.sip.bind_port = 0;
        config.sip.host = Some("127.0.0.1".to_string());
        config
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let handle = Gateway::start(config(), Arc::new(NoopObserver), false)
            .await
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        assert!(handle.is_running());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let first = Gateway::start(config(), Arc::new(NoopObserver), false)
            .await
            .unwrap();

        let mut taken = config();
        taken.sip.bind_port = first.local_addr().port();
        let err = Gateway::start(taken, Arc::new(NoopObserver), false)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Transport(_)));

        first.stop();
    }
}
