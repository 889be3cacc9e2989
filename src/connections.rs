//! Network connection enumeration (netstat-like)
//!
//! This module lists TCP and UDP sockets together with the pid owning them.
//! On Linux the socket tables come from `/proc/net/{tcp,tcp6,udp,udp6}` and
//! ownership from the `socket:[inode]` links under `/proc/<pid>/fd`.
//!
//! # Examples
//!
//! ```no_run
//! use dashnet::connections::{ConnectionLister, ProcNetConnectionLister};
//! use dashnet::socket::Protocol;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lister = ProcNetConnectionLister::new();
//! for conn in lister.list(Protocol::Tcp)? {
//!     println!("{:?} {:?} -> {:?} ({})", conn.pid, conn.local, conn.remote, conn.state);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{DashnetError, Result};
use crate::process::is_process_gone;
use crate::socket::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// One socket reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Protocol table the record came from
    pub protocol: Protocol,
    /// Owning process ID, if it could be attributed
    pub pid: Option<u32>,
    /// Local endpoint
    pub local: Option<SocketAddr>,
    /// Remote endpoint, `None` for listeners and unconnected UDP
    pub remote: Option<SocketAddr>,
    /// Connection state (for TCP)
    pub state: ConnectionState,
}

/// TCP connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    // UDP has no state
    Stateless,
}

impl ConnectionState {
    /// States of a socket on its way out; these are never shown
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            ConnectionState::FinWait1 | ConnectionState::FinWait2 | ConnectionState::TimeWait
        )
    }

    /// Map the hex state column of `/proc/net/tcp`
    pub fn from_proc_hex(state: u32) -> Self {
        match state {
            0x01 => ConnectionState::Established,
            0x02 => ConnectionState::SynSent,
            0x03 => ConnectionState::SynReceived,
            0x04 => ConnectionState::FinWait1,
            0x05 => ConnectionState::FinWait2,
            0x06 => ConnectionState::TimeWait,
            0x07 => ConnectionState::Closed,
            0x08 => ConnectionState::CloseWait,
            0x09 => ConnectionState::LastAck,
            0x0A => ConnectionState::Listen,
            0x0B => ConnectionState::Closing,
            _ => ConnectionState::Unknown,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unknown => write!(f, "UNKNOWN"),
            ConnectionState::Closed => write!(f, "CLOSED"),
            ConnectionState::Listen => write!(f, "LISTEN"),
            ConnectionState::SynSent => write!(f, "SYN_SENT"),
            ConnectionState::SynReceived => write!(f, "SYN_RECV"),
            ConnectionState::Established => write!(f, "ESTABLISHED"),
            ConnectionState::FinWait1 => write!(f, "FIN_WAIT1"),
            ConnectionState::FinWait2 => write!(f, "FIN_WAIT2"),
            ConnectionState::CloseWait => write!(f, "CLOSE_WAIT"),
            ConnectionState::Closing => write!(f, "CLOSING"),
            ConnectionState::LastAck => write!(f, "LAST_ACK"),
            ConnectionState::TimeWait => write!(f, "TIME_WAIT"),
            ConnectionState::Stateless => write!(f, "-"),
        }
    }
}

/// Enumerates the socket table of one protocol
pub trait ConnectionLister: Send + Sync {
    fn list(&self, protocol: Protocol) -> Result<Vec<ConnectionRecord>>;

    /// List several protocols, in order
    fn list_many(&self, protocols: &[Protocol]) -> Result<Vec<ConnectionRecord>> {
        let mut all = Vec::new();
        for protocol in protocols {
            all.extend(self.list(*protocol)?);
        }
        Ok(all)
    }
}

/// Connection lister reading a procfs mount
#[derive(Debug, Clone)]
pub struct ProcNetConnectionLister {
    root: PathBuf,
}

impl Default for ProcNetConnectionLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcNetConnectionLister {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read tables from another procfs root
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn table_path(&self, protocol: Protocol) -> PathBuf {
        let name = match protocol {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        };
        self.root.join("net").join(name)
    }

    fn read_table(
        &self,
        protocol: Protocol,
        owners: &HashMap<u64, u32>,
    ) -> Result<Vec<ConnectionRecord>> {
        let path = self.table_path(protocol);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            // kernels built without IPv6 have no tcp6/udp6 tables
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(contents
            .lines()
            .skip(1) // header
            .filter_map(|line| parse_proc_net_line(line, protocol))
            .map(|(mut record, inode)| {
                record.pid = owners.get(&inode).copied();
                record
            })
            .collect())
    }
}

impl ConnectionLister for ProcNetConnectionLister {
    fn list(&self, protocol: Protocol) -> Result<Vec<ConnectionRecord>> {
        self.list_many(&[protocol])
    }

    fn list_many(&self, protocols: &[Protocol]) -> Result<Vec<ConnectionRecord>> {
        if !cfg!(target_os = "linux") && self.root == Path::new("/proc") {
            return Err(DashnetError::UnsupportedPlatform(
                "socket tables are read from /proc/net".into(),
            ));
        }

        let owners = socket_owners(&self.root)?;
        let mut all = Vec::new();
        for protocol in protocols {
            all.extend(self.read_table(*protocol, &owners)?);
        }
        Ok(all)
    }
}

/// Parse one row of a `/proc/net` socket table; returns the record and its inode
pub fn parse_proc_net_line(line: &str, protocol: Protocol) -> Option<(ConnectionRecord, u64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 {
        return None;
    }

    let (local_ip, local_port) = parse_address(parts[1], protocol.is_ipv6())?;
    let (remote_ip, remote_port) = parse_address(parts[2], protocol.is_ipv6())?;
    let inode = parts[9].parse::<u64>().ok()?;

    let state = if protocol.is_tcp() {
        ConnectionState::from_proc_hex(u32::from_str_radix(parts[3], 16).unwrap_or(0))
    } else {
        ConnectionState::Stateless
    };

    let remote = if state != ConnectionState::Listen && remote_port != 0 {
        Some(SocketAddr::new(remote_ip, remote_port))
    } else {
        None
    };

    Some((
        ConnectionRecord {
            protocol,
            pid: None,
            local: Some(SocketAddr::new(local_ip, local_port)),
            remote,
            state,
        },
        inode,
    ))
}

/// Parse `ADDR:PORT` where ADDR is the kernel's hex dump of the address words
pub fn parse_address(addr: &str, is_ipv6: bool) -> Option<(IpAddr, u16)> {
    let (ip_hex, port_hex) = addr.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = if is_ipv6 {
        if ip_hex.len() != 32 || !ip_hex.is_ascii() {
            return None;
        }
        let mut octets = [0u8; 16];
        for (i, chunk) in octets.chunks_mut(4).enumerate() {
            let word = u32::from_str_radix(&ip_hex[i * 8..i * 8 + 8], 16).ok()?;
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        let word = u32::from_str_radix(ip_hex, 16).ok()?;
        IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
    };

    Some((ip, port))
}

/// Inode of a `socket:[inode]` fd link target
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

fn is_not_a_link(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::EINVAL) {
            return true;
        }
    }
    err.kind() == io::ErrorKind::InvalidInput
}

/// Map socket inodes to the first pid holding them
///
/// Processes that exit mid-scan and fds that are not links are skipped.
/// Processes of other users are skipped too (their fd directories are not
/// readable without privileges). Every other error is returned.
fn socket_owners(root: &Path) -> Result<HashMap<u64, u32>> {
    let mut owners = HashMap::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let pid = match entry.file_name().to_string_lossy().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => continue,
        };

        let fds = match std::fs::read_dir(entry.path().join("fd")) {
            Ok(fds) => fds,
            Err(e) if is_process_gone(&e) => continue,
            Err(e) if is_permission_denied(&e) => {
                log::trace!("fd table of pid {} not readable", pid);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for fd in fds {
            let fd = match fd {
                Ok(fd) => fd,
                Err(e) if is_process_gone(&e) => break,
                Err(e) => return Err(e.into()),
            };

            match std::fs::read_link(fd.path()) {
                Ok(target) => {
                    if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                        owners.entry(inode).or_insert(pid);
                    }
                }
                Err(e) if is_process_gone(&e) || is_not_a_link(&e) || is_permission_denied(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(owners)
}
