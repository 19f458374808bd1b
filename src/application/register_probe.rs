//! Register probe: act as a device and send one REGISTER to a server

use crate::domain::shared::{GatewayError, Result};
use crate::infrastructure::net;
use crate::infrastructure::protocols::sip::{
    DatagramSink, HeaderBuilder, LocalIdentity, Message, SipAddress, SipMethod, SipUri,
    UdpTransport,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const PROBE_EXPIRES: u32 = 3600;
const PROBE_USER_AGENT: &str = "gbgate-probe";

/// Send a REGISTER for `device_id` to `server_addr` and return the first
/// response carrying its Call-ID, or [`GatewayError::Timeout`].
pub async fn probe_register(
    server_id: &str,
    server_addr: SocketAddr,
    device_id: &str,
    timeout: Duration,
) -> Result<Message> {
    let bind: SocketAddr = if server_addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let transport = UdpTransport::bind(bind).await?;
    let local = transport.local_addr()?;

    let host = if server_addr.ip().is_loopback() {
        server_addr.ip().to_string()
    } else {
        net::advertised_host(None)
    };
    let identity = LocalIdentity::new(device_id, host, local.port());
    let builder = HeaderBuilder::new(identity.clone(), PROBE_USER_AGENT);

    let server = SipAddress::new(SipUri::new(
        Some(server_id),
        server_addr.ip().to_string(),
        Some(server_addr.port()),
    ));
    let mut request = builder.new_request(SipMethod::Register, &server, 1);
    request.to = request.from.without_tag();
    request.contact = Some(SipAddress::new(identity.uri()));
    request.expires = Some(PROBE_EXPIRES);

    let bytes = request.to_bytes()?;
    transport
        .send_to(&bytes, server_addr)
        .await
        .map_err(|e| GatewayError::SendFailure {
            destination: server_addr,
            reason: e.to_string(),
        })?;
    info!(%server_addr, device_id, call_id = %request.call_id, "REGISTER probe sent");

    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; 4096];
    loop {
        let received = tokio::time::timeout_at(deadline, transport.recv_from(&mut buf))
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!("no REGISTER response from {} within {:?}", server_addr, timeout))
            })?;

        let (len, source) = match received {
            Ok(received) => received,
            Err(e) => {
                debug!("Probe receive failed: {}", e);
                continue;
            }
        };

        match Message::parse(&buf[..len]) {
            Ok(response) if response.is_response() && response.call_id == request.call_id => {
                info!(%source, status = ?response.status(), "REGISTER probe answered");
                return Ok(response);
            }
            Ok(other) => debug!(%source, call_id = %other.call_id, "Ignoring unrelated message"),
            Err(e) => debug!(%source, "Ignoring unparseable datagram: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_times_out_on_silent_server() {
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let err = probe_register(
            "31011500002000000001",
            addr,
            "34020000001320000001",
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_probe_request_shape() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let probe = tokio::spawn(probe_register(
            "31011500002000000001",
            addr,
            "34020000001320000001",
            Duration::from_millis(300),
        ));

        let mut buf = [0u8; 2048];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let request = Message::parse(&buf[..len]).unwrap();

        assert_eq!(request.method(), Some(SipMethod::Register));
        assert_eq!(request.cseq, 1);
        assert_eq!(request.expires, Some(3600));
        assert_eq!(request.from.user(), Some("34020000001320000001"));
        assert_eq!(request.to.user(), Some("34020000001320000001"));
        assert!(request.to.tag().is_none());
        assert!(request.via.branch().unwrap().starts_with("z9hG4bK"));

        assert!(probe.await.unwrap().is_err());
    }
}
