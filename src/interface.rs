//! Egress interface lookup for remote peers
//!
//! The routing table is queried with `ip route get <addr>` and the device name
//! is taken from the `dev <name>` token of the answer. Nothing is cached: every
//! call runs the command once.

use regex::Regex;
use std::net::IpAddr;
use std::process::Command;
use std::sync::OnceLock;

/// Maps a destination address to the local interface used to reach it
pub trait InterfaceResolver: Send + Sync {
    /// Device name, or `None` when the route has no device or the query failed
    fn device_for(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver running the iproute2 `ip` command
#[derive(Debug, Clone)]
pub struct RouteInterfaceResolver {
    program: String,
}

impl Default for RouteInterfaceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteInterfaceResolver {
    pub fn new() -> Self {
        Self {
            program: "ip".to_string(),
        }
    }

    /// Use another executable with the same interface as `ip`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl InterfaceResolver for RouteInterfaceResolver {
    fn device_for(&self, ip: IpAddr) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["route", "get", &ip.to_string()])
            .output();

        match output {
            Ok(out) if out.status.success() => parse_route_device(&String::from_utf8_lossy(&out.stdout)),
            Ok(out) => {
                log::debug!(
                    "{} route get {} exited with {}",
                    self.program,
                    ip,
                    out.status
                );
                None
            }
            Err(e) => {
                log::debug!("failed to run {}: {}", self.program, e);
                None
            }
        }
    }
}

/// Resolver that never finds an interface
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterfaceResolver;

impl InterfaceResolver for NoInterfaceResolver {
    fn device_for(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

fn device_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\bdev\s+(\S+)").ok())
        .as_ref()
}

/// Extract the device name from `ip route get` output
pub fn parse_route_device(output: &str) -> Option<String> {
    device_pattern()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_route() {
        let out = "1.1.1.1 via 192.168.1.1 dev wlp3s0 src 192.168.1.42 uid 1000 \n    cache \n";
        assert_eq!(parse_route_device(out), Some("wlp3s0".to_string()));
    }

    #[test]
    fn test_parse_local_route() {
        let out = "local 127.0.0.1 dev lo table local src 127.0.0.1 uid 1000 \n    cache <local> \n";
        assert_eq!(parse_route_device(out), Some("lo".to_string()));
    }

    #[test]
    fn test_parse_ipv6_route() {
        let out = "2606:4700::1111 from :: via fe80::1 dev eth0 proto ra src 2001:db8::2 metric 100 pref medium\n";
        assert_eq!(parse_route_device(out), Some("eth0".to_string()));
    }

    #[test]
    fn test_device_pattern_compiles() {
        assert!(device_pattern().is_some());
    }

    #[test]
    fn test_parse_without_device() {
        assert_eq!(parse_route_device("RTNETLINK answers: Network is unreachable"), None);
        assert_eq!(parse_route_device(""), None);
    }

    #[test]
    fn test_missing_program_yields_none() {
        let resolver = RouteInterfaceResolver::with_program("dashnet-no-such-ip-binary");
        assert_eq!(resolver.device_for("1.1.1.1".parse().unwrap()), None);
    }
}
