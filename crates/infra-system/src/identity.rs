// Instance identity detection
// reason: sysinfo for a cross-platform host name

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use sysinfo::System;
use tracing::{debug, warn};

use cadence_core::port::InstanceIdentity;

/// Any routable address works; connecting a UDP socket sends no packets
const ROUTE_PROBE_ADDR: &str = "192.0.2.1:9";

const FALLBACK_HOST: &str = "localhost";

/// Identity of this process: host name plus outbound address and RPC port
///
/// `host_override` wins over the detected host name, which lets several
/// instances on one machine (and tests) present distinct identities.
pub fn detect_identity(host_override: Option<&str>, port: u16) -> InstanceIdentity {
    let host = host_override
        .map(str::to_string)
        .or_else(System::host_name)
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| {
            warn!("Host name unavailable, using '{}'", FALLBACK_HOST);
            FALLBACK_HOST.to_string()
        });

    let ip = outbound_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let identity = InstanceIdentity::new(host, SocketAddr::new(ip, port).to_string());
    debug!(identity = %identity, "Instance identity detected");
    identity
}

/// Local address the OS would use for outbound traffic
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(ROUTE_PROBE_ADDR).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
