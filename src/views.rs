//! Aggregation views over a snapshot
//!
//! Views are recomputed from the snapshot on every call, so they always show
//! the latest filtering. The `*_table` builders turn them into [`Table`]s for
//! the render sink, honouring the DNS and service toggles.

use crate::render::Table;
use crate::snapshot::{Snapshot, SocketUse};
use crate::socket::{ProcessOwner, Socket};
use serde::Serialize;
use std::collections::HashMap;

/// Local sockets held by one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessTraffic {
    pub process_name: String,
    pub count: usize,
}

/// One address with its first owner and number of connections
#[derive(Debug, Clone, Serialize)]
pub struct AddressTraffic {
    pub socket: Socket,
    pub owner: ProcessOwner,
    pub count: usize,
}

/// One connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRow {
    pub local: Option<Socket>,
    pub remote: Option<Socket>,
    pub owner: ProcessOwner,
}

/// Count of local sockets per process name, in first-seen order
pub fn traffic_by_process(snapshot: &Snapshot) -> Vec<ProcessTraffic> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut traffic: Vec<ProcessTraffic> = Vec::new();

    for (_, used) in snapshot.locals() {
        let name = used.owner.process_name.as_str();
        match index.get(name) {
            Some(&i) => traffic[i].count += 1,
            None => {
                index.insert(name, traffic.len());
                traffic.push(ProcessTraffic {
                    process_name: name.to_string(),
                    count: 1,
                });
            }
        }
    }
    traffic
}

fn address_traffic<'a>(entries: impl Iterator<Item = (&'a Socket, &'a SocketUse)>) -> Vec<AddressTraffic> {
    entries
        .map(|(socket, used)| AddressTraffic {
            socket: socket.clone(),
            owner: used.owner.clone(),
            count: used.count,
        })
        .collect()
}

/// Local addresses; a socket shared by several processes shows its first owner
pub fn traffic_by_local_address(snapshot: &Snapshot) -> Vec<AddressTraffic> {
    address_traffic(snapshot.locals().map(|(s, used)| (&s.0, used)))
}

/// Remote addresses; a peer reached by several processes shows its first owner
pub fn traffic_by_remote_address(snapshot: &Snapshot) -> Vec<AddressTraffic> {
    address_traffic(snapshot.remotes().map(|(s, used)| (&s.0, used)))
}

/// Every connection, in insertion order
pub fn all_connections(snapshot: &Snapshot) -> Vec<ConnectionRow> {
    snapshot
        .connections()
        .map(|((local, remote), owner)| ConnectionRow {
            local: local.as_ref().map(|s| s.0.clone()),
            remote: remote.as_ref().map(|s| s.0.clone()),
            owner: owner.clone(),
        })
        .collect()
}

/// Column text options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextOpts {
    pub resolve_dns: bool,
    pub resolve_service: bool,
}

pub fn process_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new("Traffic by process", &["PROCESS", "CONNECTIONS"]);
    for row in traffic_by_process(snapshot) {
        table.push_row(vec![row.process_name, row.count.to_string()]);
    }
    table
}

pub fn remote_address_table(snapshot: &Snapshot, opts: TextOpts) -> Table {
    let mut table = Table::new(
        "Traffic by remote address",
        &["INTERFACE", "REMOTE ADDRESS", "PORT", "PROTOCOL", "CONNECTIONS"],
    );
    for row in traffic_by_remote_address(snapshot) {
        table.push_row(vec![
            row.owner.interface_name.unwrap_or_default(),
            row.socket.host_text(opts.resolve_dns),
            row.socket.port_text(opts.resolve_service),
            row.socket.protocol.to_string(),
            row.count.to_string(),
        ]);
    }
    table
}

pub fn local_address_table(snapshot: &Snapshot, opts: TextOpts) -> Table {
    let mut table = Table::new(
        "Traffic by local address",
        &["LOCAL ADDRESS", "PORT", "PROTOCOL", "CONNECTIONS"],
    );
    for row in traffic_by_local_address(snapshot) {
        table.push_row(vec![
            row.socket.host_text(opts.resolve_dns),
            row.socket.port_text(opts.resolve_service),
            row.socket.protocol.to_string(),
            row.count.to_string(),
        ]);
    }
    table
}

pub fn connections_table(snapshot: &Snapshot, opts: TextOpts) -> Table {
    let mut table = Table::new(
        "TCP/UDP connections",
        &[
            "PROCESS",
            "LOCAL ADDRESS",
            "PORT",
            "REMOTE ADDRESS",
            "PORT",
            "PROTOCOL",
            "INTERFACE",
        ],
    );
    for row in all_connections(snapshot) {
        let host = |s: &Option<Socket>| s.as_ref().map(|s| s.host_text(opts.resolve_dns)).unwrap_or_default();
        let port = |s: &Option<Socket>| s.as_ref().map(|s| s.port_text(opts.resolve_service)).unwrap_or_default();
        let protocol = row
            .local
            .as_ref()
            .or(row.remote.as_ref())
            .map(|s| s.protocol.to_string())
            .unwrap_or_default();

        table.push_row(vec![
            row.owner.process_name.clone(),
            host(&row.local),
            port(&row.local),
            host(&row.remote),
            port(&row.remote),
            protocol,
            row.owner.interface_name.clone().unwrap_or_default(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ConnectionState;
    use crate::snapshot::tests::{loader, local, process, record, remote};
    use crate::socket::Protocol;

    fn opts(resolve: bool) -> TextOpts {
        TextOpts {
            resolve_dns: resolve,
            resolve_service: resolve,
        }
    }

    #[test]
    fn test_same_name_processes_are_merged() {
        let loader = loader(
            vec![process(1, "curl"), process(2, "curl")],
            vec![
                record(Some(1), Some("10.0.0.1:443"), None, ConnectionState::Listen),
                record(Some(2), Some("10.0.0.1:80"), None, ConnectionState::Listen),
            ],
        );
        let snapshot = loader.load().unwrap();
        assert_eq!(
            traffic_by_process(&snapshot),
            vec![ProcessTraffic {
                process_name: "curl".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_process_order_is_first_seen() {
        let loader = loader(
            vec![process(1, "sshd"), process(2, "curl")],
            vec![
                record(Some(2), Some("10.0.0.5:40000"), Some("1.1.1.1:443"), ConnectionState::Established),
                record(Some(1), Some("0.0.0.0:22"), None, ConnectionState::Listen),
                record(Some(2), Some("10.0.0.5:40001"), Some("1.1.1.1:443"), ConnectionState::Established),
            ],
        );
        let names: Vec<_> = traffic_by_process(&loader.load().unwrap())
            .into_iter()
            .map(|t| (t.process_name, t.count))
            .collect();
        assert_eq!(names, vec![("curl".to_string(), 2), ("sshd".to_string(), 1)]);
    }

    #[test]
    fn test_shared_local_address_counts_every_connection() {
        let l1 = local("10.0.0.5:8080", Protocol::Tcp);
        let mut snapshot = Snapshot::new();
        snapshot.insert(Some(l1.clone()), Some(remote("1.1.1.1:5000")), ProcessOwner::new("p1"));
        snapshot.insert(Some(l1), Some(remote("2.2.2.2:5000")), ProcessOwner::new("p2"));

        let traffic = traffic_by_local_address(&snapshot);
        assert_eq!(traffic.len(), 1);
        assert_eq!(traffic[0].count, 2);
        assert_eq!(traffic[0].owner.process_name, "p1");
    }

    #[test]
    fn test_views_follow_filtering() {
        let loader = loader(
            vec![process(1, "curl"), process(2, "sshd")],
            vec![
                record(Some(1), Some("10.0.0.5:40000"), Some("93.184.216.34:443"), ConnectionState::Established),
                record(Some(2), Some("0.0.0.0:22"), None, ConnectionState::Listen),
            ],
        );
        let mut snapshot = loader.load().unwrap();
        assert_eq!(all_connections(&snapshot).len(), 2);

        snapshot.filter_by_regex(&regex::Regex::new("sshd").unwrap());
        let rows = all_connections(&snapshot);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner.process_name, "sshd");
        assert!(rows[0].remote.is_none());
        assert!(traffic_by_remote_address(&snapshot).is_empty());
    }

    #[test]
    fn test_tables_honour_toggles() {
        let mut snapshot = Snapshot::new();
        let mut peer = remote("93.184.216.34:443");
        peer.0.hostname = Some("example.com".to_string());
        peer.0.service = Some("https".to_string());
        snapshot.insert(
            Some(local("10.0.0.5:40000", Protocol::Tcp)),
            Some(peer),
            ProcessOwner::new("curl").with_interface(Some("wlan0".to_string())),
        );

        let resolved = remote_address_table(&snapshot, opts(true));
        assert_eq!(resolved.rows[0], vec!["wlan0", "example.com", "https", "TCP", "1"]);

        let raw = remote_address_table(&snapshot, opts(false));
        assert_eq!(raw.rows[0], vec!["wlan0", "93.184.216.34", "443", "TCP", "1"]);

        let list = connections_table(&snapshot, opts(false));
        assert_eq!(list.headers.len(), list.rows[0].len());
        assert_eq!(
            list.rows[0],
            vec!["curl", "10.0.0.5", "40000", "93.184.216.34", "443", "TCP", "wlan0"]
        );
    }

    #[test]
    fn test_listener_row_has_empty_remote_columns() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(Some(local("0.0.0.0:22", Protocol::Tcp)), None, ProcessOwner::new("sshd"));

        let list = connections_table(&snapshot, opts(true));
        assert_eq!(list.rows[0], vec!["sshd", "0.0.0.0", "22", "", "", "TCP", ""]);
        assert_eq!(process_table(&snapshot).rows, vec![vec!["sshd".to_string(), "1".to_string()]]);
        assert_eq!(local_address_table(&snapshot, opts(true)).rows.len(), 1);
    }
}
