//! Socket endpoints and their owning processes
//!
//! A [`Socket`] is one endpoint of a connection. Sockets are wrapped in
//! [`LocalSocket`] or [`RemoteSocket`] before they are stored, and the wrapper
//! decides identity:
//!
//! - local sockets are equal when `(ip, port, protocol)` match, so a TCP and a
//!   UDP listener on the same port are two entries;
//! - remote sockets are equal when `(ip, port)` match, so a peer reached over
//!   TCP and UDP is one entry.
//!
//! Resolved names never take part in identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::ops::Deref;

/// Transport protocol of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    /// All protocols polled on every cycle
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Tcp6, Protocol::Udp, Protocol::Udp6];

    /// Whether the protocol is connection oriented
    pub fn is_tcp(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Tcp6)
    }

    /// Whether addresses of this protocol are IPv6
    pub fn is_ipv6(self) -> bool {
        matches!(self, Protocol::Tcp6 | Protocol::Udp6)
    }

    /// Protocol name as used by the services database
    pub fn service_proto(self) -> &'static str {
        if self.is_tcp() {
            "tcp"
        } else {
            "udp"
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Tcp6 => write!(f, "TCP6"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Udp6 => write!(f, "UDP6"),
        }
    }
}

/// One endpoint of a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    /// IP address
    pub ip: IpAddr,
    /// Port number
    pub port: u16,
    /// Transport protocol
    pub protocol: Protocol,
    /// Hostname, set once by resolution
    pub hostname: Option<String>,
    /// Service name, set once by resolution
    pub service: Option<String>,
}

impl Socket {
    /// Create an unresolved socket
    pub fn new(ip: IpAddr, port: u16, protocol: Protocol) -> Self {
        Self {
            ip,
            port,
            protocol,
            hostname: None,
            service: None,
        }
    }

    /// Whether both hostname and service have been set
    pub fn is_resolved(&self) -> bool {
        self.hostname.is_some() && self.service.is_some()
    }

    /// Address column text, honouring the DNS toggle
    pub fn host_text(&self, resolve_dns: bool) -> String {
        match (&self.hostname, resolve_dns) {
            (Some(hostname), true) => hostname.clone(),
            _ => self.ip.to_string(),
        }
    }

    /// Port column text, honouring the service toggle
    pub fn port_text(&self, resolve_service: bool) -> String {
        match (&self.service, resolve_service) {
            (Some(service), true) => service.clone(),
            _ => self.port.to_string(),
        }
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.protocol, self.ip, self.port)?;
        if let (Some(hostname), Some(service)) = (&self.hostname, &self.service) {
            write!(f, " ({}:{})", hostname, service)?;
        }
        Ok(())
    }
}

/// Socket bound on this host, identified by `(ip, port, protocol)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalSocket(pub Socket);

/// Peer socket, identified by `(ip, port)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteSocket(pub Socket);

impl PartialEq for LocalSocket {
    fn eq(&self, other: &Self) -> bool {
        self.0.ip == other.0.ip && self.0.port == other.0.port && self.0.protocol == other.0.protocol
    }
}

impl Eq for LocalSocket {}

impl Hash for LocalSocket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ip.hash(state);
        self.0.port.hash(state);
        self.0.protocol.hash(state);
    }
}

impl PartialEq for RemoteSocket {
    fn eq(&self, other: &Self) -> bool {
        self.0.ip == other.0.ip && self.0.port == other.0.port
    }
}

impl Eq for RemoteSocket {}

impl Hash for RemoteSocket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ip.hash(state);
        self.0.port.hash(state);
    }
}

impl Deref for LocalSocket {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.0
    }
}

impl Deref for RemoteSocket {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.0
    }
}

impl fmt::Display for LocalSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for RemoteSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Process holding a socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOwner {
    /// Display name of the owning process
    pub process_name: String,
    /// Egress interface used to reach a remote peer
    pub interface_name: Option<String>,
}

impl ProcessOwner {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            interface_name: None,
        }
    }

    pub fn with_interface(mut self, interface_name: Option<String>) -> Self {
        self.interface_name = interface_name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn socket(ip: &str, port: u16, protocol: Protocol) -> Socket {
        Socket::new(ip.parse().unwrap(), port, protocol)
    }

    #[test]
    fn test_local_identity_ignores_resolved_names() {
        let a = LocalSocket(socket("10.0.0.1", 443, Protocol::Tcp));
        let mut resolved = socket("10.0.0.1", 443, Protocol::Tcp);
        resolved.hostname = Some("web.internal".to_string());
        resolved.service = Some("https".to_string());
        let b = LocalSocket(resolved);

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_local_identity_includes_protocol() {
        let tcp = LocalSocket(socket("0.0.0.0", 53, Protocol::Tcp));
        let udp = LocalSocket(socket("0.0.0.0", 53, Protocol::Udp));
        assert_ne!(tcp, udp);
    }

    #[test]
    fn test_remote_identity_ignores_protocol() {
        let tcp = RemoteSocket(socket("1.1.1.1", 53, Protocol::Tcp));
        let udp = RemoteSocket(socket("1.1.1.1", 53, Protocol::Udp));
        assert_eq!(tcp, udp);

        let set: HashSet<_> = [tcp, udp].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_text_honours_toggles() {
        let mut s = socket("93.184.216.34", 443, Protocol::Tcp);
        assert_eq!(s.host_text(true), "93.184.216.34");
        assert_eq!(s.port_text(true), "443");

        s.hostname = Some("example.com".to_string());
        s.service = Some("https".to_string());
        assert_eq!(s.host_text(true), "example.com");
        assert_eq!(s.host_text(false), "93.184.216.34");
        assert_eq!(s.port_text(true), "https");
        assert_eq!(s.port_text(false), "443");
    }

    #[test]
    fn test_display() {
        let mut s = socket("::1", 8080, Protocol::Tcp6);
        assert_eq!(s.to_string(), "TCP6 ::1:8080");
        s.hostname = Some("localhost".to_string());
        s.service = Some("http-alt".to_string());
        assert_eq!(s.to_string(), "TCP6 ::1:8080 (localhost:http-alt)");
    }
}
