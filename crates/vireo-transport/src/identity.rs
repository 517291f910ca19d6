//! Server identity and configuration.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use vireo_proto::DOT_PORT;

/// Protocol tag for DNS-over-TLS servers.
pub const PROTOCOL_DOT: u8 = 1;

/// Configuration for one encrypted upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotServerConfig {
    /// Server socket address (port 853 unless overridden).
    pub addr: SocketAddr,

    /// Provider hostname. `Some` selects strict certificate
    /// verification against this name; `None` is opportunistic (no
    /// verification at all).
    pub hostname: Option<String>,

    /// PEM bundle of additional trust anchors. Used by the platform to
    /// pin a private CA; tests use it for their generated roots.
    pub ca_pem: Option<String>,

    /// Deadline for TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
}

impl DotServerConfig {
    /// Creates a config for an opportunistic server at the default
    /// DoT port.
    pub fn opportunistic(ip: IpAddr) -> Self {
        Self {
            addr: SocketAddr::new(ip, DOT_PORT),
            hostname: None,
            ca_pem: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Creates a config requiring the certificate to match `hostname`.
    pub fn strict(ip: IpAddr, hostname: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            ..Self::opportunistic(ip)
        }
    }

    /// Overrides the port (tests run frontends on ephemeral ports).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Attaches a private CA bundle in PEM form.
    pub fn with_ca_pem(mut self, pem: impl Into<String>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    /// The identity this configuration names.
    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            addr: self.addr.ip(),
            hostname: self.hostname.clone().unwrap_or_default(),
            protocol: PROTOCOL_DOT,
        }
    }
}

/// What makes two configured servers "the same server".
///
/// The triple (address, provider hostname, protocol). The port is
/// deliberately not part of the identity: a server reached on a
/// different port is still the same server for validation-state
/// bookkeeping. Hostnames compare byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    /// Server IP address.
    pub addr: IpAddr,
    /// Provider hostname ("" when none was configured).
    pub hostname: String,
    /// Transport protocol tag.
    pub protocol: u8,
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.is_empty() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.addr, self.hostname)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(ip: &str, port: u16, hostname: &str) -> DotServerConfig {
        let mut config = DotServerConfig::opportunistic(ip.parse().unwrap()).with_port(port);
        if !hostname.is_empty() {
            config.hostname = Some(hostname.to_string());
        }
        config
    }

    #[test]
    fn port_is_not_identity() {
        let a = server("127.0.0.1", 853, "dns.example.com");
        let b = server("127.0.0.1", 5353, "dns.example.com");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn address_is_identity() {
        let a = server("127.0.0.1", 853, "dns.example.com");
        let b = server("127.0.0.2", 853, "dns.example.com");
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn hostname_is_identity() {
        let a = server("127.0.0.1", 853, "dns.example.com");
        let b = server("127.0.0.1", 853, "other.example.com");
        let c = server("127.0.0.1", 853, "");
        assert_ne!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn protocol_is_identity() {
        let a = server("127.0.0.1", 853, "dns.example.com");
        let mut id = a.identity();
        id.protocol += 1;
        assert_ne!(a.identity(), id);
    }
}
