//! Point-in-time correlation of sockets to processes
//!
//! A [`Snapshot`] holds three tables built together by [`SnapshotLoader::load`]:
//!
//! - `locals`: local socket → first owner and number of connections using it
//! - `remotes`: remote socket → first owner and number of connections using it
//! - `connections`: `(local?, remote?)` → owner, one entry per connection
//!
//! Every table iterates in insertion order. Every present side of a
//! connection is a key of `locals` / `remotes`; [`Snapshot::filter_by_regex`]
//! keeps that true while it prunes.

use crate::connections::{ConnectionLister, ProcNetConnectionLister};
use crate::error::Result;
use crate::interface::{InterfaceResolver, RouteInterfaceResolver};
use crate::process::{NameDeriver, ProcFsProcessLister, ProcessLister, ProcessTable};
use crate::resolve::{NameResolver, ResolutionCache, SystemResolver};
use crate::socket::{LocalSocket, ProcessOwner, Protocol, RemoteSocket, Socket};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// Hash map remembering insertion order
#[derive(Debug, Clone, PartialEq)]
struct OrderedMap<K: Eq + Hash, V> {
    entries: HashMap<K, (u64, V)>,
    next_seq: u64,
}

impl<K: Eq + Hash, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Eq + Hash, V> OrderedMap<K, V> {
    /// Insert unless the key is present; returns the stored value
    fn get_or_insert_with(&mut self, key: K, value: impl FnOnce() -> V) -> &mut V {
        let seq = &mut self.next_seq;
        &mut self
            .entries
            .entry(key)
            .or_insert_with(|| {
                let entry = (*seq, value());
                *seq += 1;
                entry
            })
            .1
    }

    fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, v)| v)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut ordered: Vec<_> = self.entries.iter().collect();
        ordered.sort_by_key(|(_, (seq, _))| *seq);
        ordered.into_iter().map(|(k, (_, v))| (k, v))
    }
}

/// Owner and use count of a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUse {
    /// Owner of the first connection seen on the socket
    pub owner: ProcessOwner,
    /// Connections currently using the socket
    pub count: usize,
}

/// Key of the connection table
pub type ConnectionKey = (Option<LocalSocket>, Option<RemoteSocket>);

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    locals: OrderedMap<LocalSocket, SocketUse>,
    remotes: OrderedMap<RemoteSocket, SocketUse>,
    connections: OrderedMap<ConnectionKey, ProcessOwner>,
    cache: ResolutionCache,
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.locals == other.locals
            && self.remotes == other.remotes
            && self.connections == other.connections
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one connection
    ///
    /// A connection already present keeps its first owner and is not counted
    /// twice. Returns whether the connection was new.
    pub fn insert(
        &mut self,
        local: Option<LocalSocket>,
        remote: Option<RemoteSocket>,
        owner: ProcessOwner,
    ) -> bool {
        if local.is_none() && remote.is_none() {
            return false;
        }

        let key = (local, remote);
        if self.connections.contains_key(&key) {
            log::trace!("duplicate connection for {}", owner.process_name);
            return false;
        }

        if let Some(local) = &key.0 {
            let local_owner = ProcessOwner::new(owner.process_name.clone());
            self.locals
                .get_or_insert_with(local.clone(), || SocketUse {
                    owner: local_owner,
                    count: 0,
                })
                .count += 1;
        }
        if let Some(remote) = &key.1 {
            self.remotes
                .get_or_insert_with(remote.clone(), || SocketUse {
                    owner: owner.clone(),
                    count: 0,
                })
                .count += 1;
        }
        self.connections.get_or_insert_with(key, || owner);
        true
    }

    /// Local sockets in first-seen order
    pub fn locals(&self) -> impl Iterator<Item = (&LocalSocket, &SocketUse)> {
        self.locals.iter()
    }

    /// Remote sockets in first-seen order
    pub fn remotes(&self) -> impl Iterator<Item = (&RemoteSocket, &SocketUse)> {
        self.remotes.iter()
    }

    /// Connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = (&ConnectionKey, &ProcessOwner)> {
        self.connections.iter()
    }

    pub fn local(&self, socket: &LocalSocket) -> Option<&SocketUse> {
        self.locals.get(socket)
    }

    pub fn remote(&self, socket: &RemoteSocket) -> Option<&SocketUse> {
        self.remotes.get(socket)
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.len() == 0
    }

    /// Resolution cache owned by this snapshot
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Whether every present side of every connection is in `locals` / `remotes`
    pub fn is_consistent(&self) -> bool {
        self.connections.iter().all(|((local, remote), _)| {
            local.as_ref().map_or(true, |l| self.locals.contains_key(l))
                && remote.as_ref().map_or(true, |r| self.remotes.contains_key(r))
        })
    }

    /// Drop every connection whose text does not match `pattern`
    ///
    /// The matched text is the process name, the interface name and both
    /// sockets. Removing a connection releases its sockets, which are removed
    /// once no connection uses them. This cannot be undone; load a new
    /// snapshot to see everything again. Returns the number of connections
    /// removed.
    pub fn filter_by_regex(&mut self, pattern: &Regex) -> usize {
        let rejected: Vec<ConnectionKey> = self
            .connections
            .iter()
            .filter(|(key, owner)| !pattern.is_match(&filter_line(key, owner)))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &rejected {
            self.connections.remove(key);
            if let Some(local) = &key.0 {
                release(&mut self.locals, local);
            }
            if let Some(remote) = &key.1 {
                release(&mut self.remotes, remote);
            }
        }

        if !rejected.is_empty() {
            self.reassign_owners();
            log::debug!(
                "filter '{}' removed {} connections",
                pattern.as_str(),
                rejected.len()
            );
        }
        rejected.len()
    }

    /// Give each socket the owner of the first remaining connection using it
    fn reassign_owners(&mut self) {
        let mut seen_locals = HashSet::new();
        let mut seen_remotes = HashSet::new();
        for ((local, remote), owner) in self.connections.iter() {
            if let Some(local) = local {
                if seen_locals.insert(local) {
                    if let Some(used) = self.locals.get_mut(local) {
                        used.owner = ProcessOwner::new(owner.process_name.clone());
                    }
                }
            }
            if let Some(remote) = remote {
                if seen_remotes.insert(remote) {
                    if let Some(used) = self.remotes.get_mut(remote) {
                        used.owner = owner.clone();
                    }
                }
            }
        }
    }
}

fn release<K: Eq + Hash>(table: &mut OrderedMap<K, SocketUse>, key: &K) {
    let drained = match table.get_mut(key) {
        Some(used) => {
            used.count = used.count.saturating_sub(1);
            used.count == 0
        }
        None => false,
    };
    if drained {
        table.remove(key);
    }
}

fn filter_line((local, remote): &ConnectionKey, owner: &ProcessOwner) -> String {
    let mut line = owner.process_name.clone();
    for part in [
        owner.interface_name.clone(),
        local.as_ref().map(|s| s.to_string()),
        remote.as_ref().map(|s| s.to_string()),
    ]
    .into_iter()
    .flatten()
    {
        line.push(' ');
        line.push_str(&part);
    }
    line
}

/// Builds snapshots from the OS collaborators
pub struct SnapshotLoader {
    processes: Arc<dyn ProcessLister>,
    connections: Arc<dyn ConnectionLister>,
    names: Arc<dyn NameResolver>,
    interfaces: Arc<dyn InterfaceResolver>,
    deriver: NameDeriver,
}

impl SnapshotLoader {
    pub fn new(
        processes: Arc<dyn ProcessLister>,
        connections: Arc<dyn ConnectionLister>,
        names: Arc<dyn NameResolver>,
        interfaces: Arc<dyn InterfaceResolver>,
    ) -> Self {
        Self {
            processes,
            connections,
            names,
            interfaces,
            deriver: NameDeriver::default(),
        }
    }

    /// Loader backed by procfs, the system resolver and `ip route`
    pub fn system(config: &crate::config::Config) -> Self {
        Self::new(
            Arc::new(ProcFsProcessLister::new()),
            Arc::new(ProcNetConnectionLister::new()),
            Arc::new(SystemResolver),
            Arc::new(RouteInterfaceResolver::new()),
        )
        .with_deriver(NameDeriver::from_config(&config.process))
    }

    pub fn with_deriver(mut self, deriver: NameDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    /// Build a fresh snapshot of the current sockets
    ///
    /// Blocks for as long as the name and route lookups take.
    pub fn load(&self) -> Result<Snapshot> {
        let started = Instant::now();
        let table = ProcessTable::new(&self.processes.list()?, &self.deriver);
        let records = self.connections.list_many(&Protocol::ALL)?;

        let mut snapshot = Snapshot::new();
        for record in records {
            if record.state.is_closing() {
                continue;
            }

            let name = table.lookup(record.pid).display_name().to_string();

            let local = record.local.map(|addr| {
                let mut socket = Socket::new(addr.ip(), addr.port(), record.protocol);
                snapshot.cache.resolve(self.names.as_ref(), &mut socket);
                LocalSocket(socket)
            });

            let mut interface = None;
            let remote = record.remote.map(|addr| {
                let mut socket = Socket::new(addr.ip(), addr.port(), record.protocol);
                snapshot.cache.resolve(self.names.as_ref(), &mut socket);
                interface = self.interfaces.device_for(addr.ip());
                RemoteSocket(socket)
            });

            snapshot.insert(local, remote, ProcessOwner::new(name).with_interface(interface));
        }

        log::debug!(
            "loaded {} connections ({} local, {} remote) in {:?}",
            snapshot.connection_count(),
            snapshot.local_count(),
            snapshot.remote_count(),
            started.elapsed()
        );
        Ok(snapshot)
    }
}
