//! Hostname and service-name resolution
//!
//! [`NameResolver`] performs the blocking lookups. [`ResolutionCache`] owns
//! the fallback policy: a failed lookup becomes the raw ip or port, and every
//! answer (fallbacks included) is memoized so the same ip or port is looked up
//! at most once per cache. A cache lives inside one snapshot and dies with it.

use crate::socket::{Protocol, Socket};
use std::collections::HashMap;
use std::net::IpAddr;

/// Blocking name lookups
///
/// `None` means the lookup failed or found nothing.
pub trait NameResolver: Send + Sync {
    /// Reverse DNS lookup for an address
    fn host_for(&self, ip: IpAddr) -> Option<String>;

    /// Service name registered for a port
    fn service_for(&self, port: u16, protocol: Protocol) -> Option<String>;
}

/// Resolver backed by the system resolver library
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn host_for(&self, ip: IpAddr) -> Option<String> {
        #[cfg(unix)]
        return unix::reverse_lookup(ip);

        #[cfg(not(unix))]
        {
            let _ = ip;
            None
        }
    }

    fn service_for(&self, port: u16, protocol: Protocol) -> Option<String> {
        #[cfg(unix)]
        return unix::service_lookup(port, protocol.service_proto());

        #[cfg(not(unix))]
        {
            let _ = (port, protocol);
            None
        }
    }
}

/// Resolver that never resolves anything; every socket shows raw values
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

impl NameResolver for NoopResolver {
    fn host_for(&self, _ip: IpAddr) -> Option<String> {
        None
    }

    fn service_for(&self, _port: u16, _protocol: Protocol) -> Option<String> {
        None
    }
}

/// Memoized ip→hostname and port→service answers
#[derive(Debug, Default, Clone)]
pub struct ResolutionCache {
    hosts: HashMap<IpAddr, String>,
    services: HashMap<u16, String>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hostname for `ip`, falling back to the address text
    pub fn hostname(&mut self, resolver: &dyn NameResolver, ip: IpAddr) -> String {
        self.hosts
            .entry(ip)
            .or_insert_with(|| {
                resolver.host_for(ip).unwrap_or_else(|| {
                    log::debug!("no hostname for {}", ip);
                    ip.to_string()
                })
            })
            .clone()
    }

    /// Service name for `port`, falling back to the port number
    ///
    /// The cache is keyed by port only: the first protocol asked for a port
    /// decides the answer for every socket on that port.
    pub fn service(&mut self, resolver: &dyn NameResolver, port: u16, protocol: Protocol) -> String {
        self.services
            .entry(port)
            .or_insert_with(|| {
                resolver
                    .service_for(port, protocol)
                    .unwrap_or_else(|| port.to_string())
            })
            .clone()
    }

    /// Fill in the unset names of `socket`; set names are never touched
    pub fn resolve(&mut self, resolver: &dyn NameResolver, socket: &mut Socket) {
        if socket.hostname.is_none() {
            socket.hostname = Some(self.hostname(resolver, socket.ip));
        }
        if socket.service.is_none() {
            socket.service = Some(self.service(resolver, socket.port, socket.protocol));
        }
    }

    /// Number of cached hostnames
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of cached service names
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[cfg(unix)]
mod unix {
    use parking_lot::Mutex;
    use std::ffi::{CStr, CString};
    use std::net::IpAddr;

    // getservbyport returns a pointer into static storage
    static SERVICES_DB: Mutex<()> = Mutex::new(());

    const HOST_BUFFER_LEN: usize = 1025;

    pub fn reverse_lookup(ip: IpAddr) -> Option<String> {
        let mut host = [0 as libc::c_char; HOST_BUFFER_LEN];

        let rc = match ip {
            IpAddr::V4(v4) => {
                let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.octets());
                unsafe {
                    libc::getnameinfo(
                        &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                        std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                        host.as_mut_ptr(),
                        host.len() as libc::socklen_t,
                        std::ptr::null_mut(),
                        0,
                        libc::NI_NAMEREQD,
                    )
                }
            }
            IpAddr::V6(v6) => {
                let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_addr.s6_addr = v6.octets();
                unsafe {
                    libc::getnameinfo(
                        &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
                        std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                        host.as_mut_ptr(),
                        host.len() as libc::socklen_t,
                        std::ptr::null_mut(),
                        0,
                        libc::NI_NAMEREQD,
                    )
                }
            }
        };

        if rc != 0 {
            return None;
        }

        let name = unsafe { CStr::from_ptr(host.as_ptr()) }
            .to_string_lossy()
            .trim_end_matches('.')
            .to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    pub fn service_lookup(port: u16, proto: &str) -> Option<String> {
        let proto = CString::new(proto).ok()?;
        let _guard = SERVICES_DB.lock();

        let entry = unsafe { libc::getservbyport(libc::c_int::from(port.to_be()), proto.as_ptr()) };
        if entry.is_null() {
            return None;
        }

        let name = unsafe { CStr::from_ptr((*entry).s_name) };
        Some(name.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FailingResolver {
        host_calls: AtomicUsize,
        service_calls: AtomicUsize,
    }

    impl NameResolver for FailingResolver {
        fn host_for(&self, _ip: IpAddr) -> Option<String> {
            self.host_calls.fetch_add(1, Ordering::SeqCst);
            None
        }

        fn service_for(&self, _port: u16, _protocol: Protocol) -> Option<String> {
            self.service_calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    struct FixedResolver;

    impl NameResolver for FixedResolver {
        fn host_for(&self, ip: IpAddr) -> Option<String> {
            Some(format!("host-{}", ip))
        }

        fn service_for(&self, port: u16, protocol: Protocol) -> Option<String> {
            Some(format!("{}-{}", protocol.service_proto(), port))
        }
    }

    fn socket(ip: &str, port: u16, protocol: Protocol) -> Socket {
        Socket::new(ip.parse().unwrap(), port, protocol)
    }

    #[test]
    fn test_failure_falls_back_to_raw_values() {
        let resolver = FailingResolver::default();
        let mut cache = ResolutionCache::new();
        let mut s = socket("192.168.1.20", 5353, Protocol::Udp);

        cache.resolve(&resolver, &mut s);

        assert_eq!(s.hostname.as_deref(), Some("192.168.1.20"));
        assert_eq!(s.service.as_deref(), Some("5353"));
    }

    #[test]
    fn test_failed_lookup_is_not_retried() {
        let resolver = FailingResolver::default();
        let mut cache = ResolutionCache::new();

        let mut first = socket("192.168.1.20", 5353, Protocol::Udp);
        cache.resolve(&resolver, &mut first);
        cache.resolve(&resolver, &mut first);

        // same ip and port on a different protocol hits the cache too
        let mut second = socket("192.168.1.20", 5353, Protocol::Tcp);
        cache.resolve(&resolver, &mut second);

        assert_eq!(resolver.host_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.service_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.hostname.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_resolved_names_are_fixed() {
        let mut cache = ResolutionCache::new();
        let mut s = socket("10.0.0.1", 22, Protocol::Tcp);
        s.hostname = Some("bastion".to_string());

        cache.resolve(&FixedResolver, &mut s);

        assert_eq!(s.hostname.as_deref(), Some("bastion"));
        assert_eq!(s.service.as_deref(), Some("tcp-22"));
        assert_eq!(cache.host_count(), 0);
        assert_eq!(cache.service_count(), 1);
    }

    #[test]
    fn test_service_cache_keyed_by_port() {
        let mut cache = ResolutionCache::new();
        let udp = cache.service(&FixedResolver, 53, Protocol::Udp);
        let tcp = cache.service(&FixedResolver, 53, Protocol::Tcp);
        assert_eq!(udp, "udp-53");
        assert_eq!(tcp, "udp-53");
    }

    #[test]
    fn test_noop_resolver() {
        let mut cache = ResolutionCache::new();
        let mut s = socket("fe80::1", 443, Protocol::Tcp6);
        cache.resolve(&NoopResolver, &mut s);
        assert_eq!(s.hostname.as_deref(), Some("fe80::1"));
        assert_eq!(s.service.as_deref(), Some("443"));
    }
}
