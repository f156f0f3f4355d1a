//! Interface manager
//!
//! Resolves the bind address of each configured network interface and opens
//! one UDP socket on it.
//!
//! Without an explicit `ip_address`, the address is discovered on the named
//! interface: a link-local unicast address when the default multicast group
//! is used, a global unicast address when a group is configured.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use meshpulse_core::{InterfaceConfig, REQUEST_COMMAND};

use crate::error::{CollectorError, Result};

/// Kernel receive buffer requested for every socket
pub const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// One open collector socket
#[derive(Debug, Clone)]
pub struct Interface {
    /// Interface name
    pub ifname: String,
    /// Bound socket
    pub socket: Arc<UdpSocket>,
    /// Bound address
    pub local_addr: SocketAddr,
    /// IPv6 scope id of the interface (0 for IPv4)
    pub scope_id: u32,
    /// Group multicast requests go to
    pub multicast_group: IpAddr,
    /// Whether requests are multicast on this interface
    pub send_request: bool,
}

impl Interface {
    /// Resolve the bind address and open the socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &InterfaceConfig) -> Result<Self> {
        let ip = resolve_bind_address(config)?;
        let socket_err = |source: io::Error| CollectorError::Socket {
            ifname: config.ifname.clone(),
            source,
        };

        let (bind, scope_id) = match ip {
            IpAddr::V4(v4) => (SocketAddr::V4(SocketAddrV4::new(v4, config.port)), 0),
            IpAddr::V6(v6) => {
                let scope_id = interface_index(&config.ifname).map_err(socket_err)?;
                (
                    SocketAddr::V6(SocketAddrV6::new(v6, config.port, 0, scope_id)),
                    scope_id,
                )
            }
        };

        let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
            .map_err(socket_err)?;
        socket.set_reuse_address(true).map_err(socket_err)?;
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            warn!(ifname = %config.ifname, error = %e, "Unable to enlarge receive buffer");
        }
        if bind.is_ipv6() {
            socket.set_only_v6(true).map_err(socket_err)?;
            socket.set_multicast_if_v6(scope_id).map_err(socket_err)?;
        }
        socket.bind(&bind.into()).map_err(socket_err)?;
        socket.set_nonblocking(true).map_err(socket_err)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(socket_err)?;
        let local_addr = socket.local_addr().map_err(socket_err)?;

        info!(
            ifname = %config.ifname,
            local_addr = %local_addr,
            send_request = !config.send_no_request,
            "Listening"
        );

        Ok(Self {
            ifname: config.ifname.clone(),
            socket: Arc::new(socket),
            local_addr,
            scope_id,
            multicast_group: config.multicast_group(),
            send_request: !config.send_no_request,
        })
    }

    /// Destination for `ip` on this socket, scoped to this interface.
    ///
    /// None when the address family differs from the socket's.
    pub fn destination(&self, ip: IpAddr, port: u16) -> Option<SocketAddr> {
        match (ip, self.local_addr) {
            (IpAddr::V4(v4), SocketAddr::V4(_)) => Some(SocketAddr::V4(SocketAddrV4::new(v4, port))),
            (IpAddr::V6(v6), SocketAddr::V6(_)) => Some(SocketAddr::V6(SocketAddrV6::new(
                v6,
                port,
                0,
                self.scope_id,
            ))),
            _ => None,
        }
    }

    /// Whether a node reachable at `addr` can be addressed through this socket.
    ///
    /// The family must match; an IPv6 address carrying a scope id must
    /// carry this interface's.
    pub fn matches(&self, addr: &SocketAddr) -> bool {
        match (addr, self.local_addr) {
            (SocketAddr::V4(_), SocketAddr::V4(_)) => true,
            (SocketAddr::V6(node), SocketAddr::V6(_)) => {
                node.scope_id() == 0 || node.scope_id() == self.scope_id
            }
            _ => false,
        }
    }

    /// Send the request command to `ip:port`
    pub async fn send_request(&self, ip: IpAddr, port: u16) -> Result<()> {
        let destination = self
            .destination(ip, port)
            .ok_or_else(|| CollectorError::Unreachable {
                ifname: self.ifname.clone(),
                destination: ip,
            })?;
        self.socket
            .send_to(REQUEST_COMMAND, destination)
            .await
            .map_err(|source| CollectorError::Socket {
                ifname: self.ifname.clone(),
                source,
            })?;
        debug!(ifname = %self.ifname, destination = %destination, "Request sent");
        Ok(())
    }
}

/// Address the socket for `config` binds to
pub fn resolve_bind_address(config: &InterfaceConfig) -> Result<IpAddr> {
    if let Some(ip) = config.ip_address {
        return Ok(ip);
    }

    let no_address = |reason: String| CollectorError::NoUnicastAddress {
        ifname: config.ifname.clone(),
        reason,
    };

    let addresses =
        local_ip_address::list_afinet_netifas().map_err(|e| no_address(e.to_string()))?;
    let link_local = config.wants_link_local();

    addresses
        .into_iter()
        .filter(|(name, _)| name == &config.ifname)
        .map(|(_, ip)| ip)
        .find(|ip| {
            if link_local {
                is_link_local_unicast(ip)
            } else {
                is_global_unicast(ip)
            }
        })
        .ok_or_else(|| {
            no_address(if link_local {
                "no link-local address".to_string()
            } else {
                "no global unicast address".to_string()
            })
        })
}

/// Index of the named network interface
pub fn interface_index(name: &str) -> io::Result<u32> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid interface name"))?;

    // SAFETY: c_name is a valid NUL-terminated string; if_nametoindex only
    // reads it and returns 0 on failure.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

/// fe80::/10
pub fn is_link_local_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(v4) => v4.is_link_local(),
    }
}

/// Routable unicast address
pub fn is_global_unicast(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_link_local_unicast(ip) {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !v4.is_broadcast(),
        IpAddr::V6(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn loopback() -> InterfaceConfig {
        InterfaceConfig {
            ip_address: Some("127.0.0.1".parse().unwrap()),
            send_no_request: true,
            ..InterfaceConfig::new("lo")
        }
    }

    #[test]
    fn test_address_classes() {
        let ll: IpAddr = "fe80::1".parse().unwrap();
        let global: IpAddr = "2001:db8::1".parse().unwrap();
        let v4: IpAddr = "192.0.2.1".parse().unwrap();

        assert!(is_link_local_unicast(&ll));
        assert!(!is_global_unicast(&ll));
        assert!(is_global_unicast(&global));
        assert!(is_global_unicast(&v4));
        assert!(!is_global_unicast(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!is_global_unicast(&"ff05::2:1001".parse().unwrap()));
    }

    #[test]
    fn test_explicit_address_wins() {
        let config = loopback();
        assert_eq!(
            resolve_bind_address(&config).unwrap(),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_unknown_interface_has_no_address() {
        let err = resolve_bind_address(&InterfaceConfig::new("nonexistent0")).unwrap_err();
        assert_eq!(err.error_code(), "NO_UNICAST_ADDRESS");
    }

    #[tokio::test]
    async fn test_open_loopback() {
        let iface = Interface::open(&loopback()).unwrap();
        assert!(iface.local_addr.ip().is_loopback());
        assert_ne!(iface.local_addr.port(), 0);
        assert!(!iface.send_request);
        assert_eq!(iface.scope_id, 0);
    }

    #[tokio::test]
    async fn test_scope_matching() {
        let iface = Interface::open(&loopback()).unwrap();
        assert!(iface.matches(&"127.0.0.2:1001".parse().unwrap()));
        let scoped = SocketAddrV6::new("fe80::1".parse().unwrap(), 1001, 0, 1);
        assert!(!iface.matches(&SocketAddr::V6(scoped)));
        assert!(iface.destination("fe80::1".parse().unwrap(), 1001).is_none());
    }
}
