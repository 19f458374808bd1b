//! Local address discovery

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::{debug, warn};

/// Any routable address works; connect() on UDP sends nothing
const PROBE_TARGET: &str = "8.8.8.8:80";

/// IPv4 address the OS would use to reach the outside world
pub fn discover_outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(PROBE_TARGET).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Host written into outbound Via/From headers
pub fn advertised_host(configured: Option<&str>) -> String {
    if let Some(host) = configured.map(str::trim).filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    match discover_outbound_ip() {
        Some(ip) => {
            debug!("Discovered outbound address {}", ip);
            ip.to_string()
        }
        None => {
            warn!("Could not discover outbound address, advertising 127.0.0.1");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}
