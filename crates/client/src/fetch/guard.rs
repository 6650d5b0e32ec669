//! Refuses render targets on private, internal or reserved addresses.
//!
//! The prerender front accepts arbitrary URLs, so without this check any
//! client could make it fetch internal services. Hostnames are resolved and
//! every answer must be public.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::Url;

use crate::render::RenderError;

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || a == 0
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_multicast()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

/// Whether an address must not be rendered.
pub fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

/// Resolve the URL's host and reject it if any address is blocked.
pub async fn check_target(url: &Url) -> Result<(), RenderError> {
    let host = url
        .host_str()
        .ok_or_else(|| RenderError::Blocked(format!("{url}: no host")))?;
    let port = url.port_or_known_default().unwrap_or(80);

    // IPv6 literals come back bracketed
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return if is_blocked(ip) { Err(RenderError::Blocked(ip.to_string())) } else { Ok(()) };
    }

    let addrs = tokio::net::lookup_host((bare, port))
        .await
        .map_err(|e| RenderError::Navigation(format!("DNS resolution failed for {bare}: {e}")))?;

    let mut resolved = false;
    for addr in addrs {
        resolved = true;
        if is_blocked(addr.ip()) {
            return Err(RenderError::Blocked(format!("{bare} resolves to {}", addr.ip())));
        }
    }

    if !resolved {
        return Err(RenderError::Navigation(format!("DNS resolution returned no addresses for {bare}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_internal_v4() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.20.0.1", "192.168.1.1", "169.254.169.254", "0.0.0.0", "100.64.0.1"] {
            assert!(is_blocked(ip.parse().unwrap()), "{ip} should be blocked");
        }
    }

    #[test]
    fn test_allows_public_v4() {
        for ip in ["8.8.8.8", "93.184.216.34", "100.128.0.1"] {
            assert!(!is_blocked(ip.parse().unwrap()), "{ip} should be allowed");
        }
    }

    #[test]
    fn test_blocks_internal_v6() {
        for ip in ["::1", "::", "fd00::1", "fe80::1", "ff02::1", "::ffff:127.0.0.1"] {
            assert!(is_blocked(ip.parse().unwrap()), "{ip} should be blocked");
        }
        assert!(!is_blocked("2001:4860:4860::8888".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_check_target_ip_literals() {
        let loopback = Url::parse("http://127.0.0.1:8080/admin").unwrap();
        assert!(matches!(check_target(&loopback).await, Err(RenderError::Blocked(_))));

        let v6 = Url::parse("http://[::1]/").unwrap();
        assert!(matches!(check_target(&v6).await, Err(RenderError::Blocked(_))));

        let public = Url::parse("https://8.8.8.8/").unwrap();
        assert!(check_target(&public).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_target_localhost_name() {
        let url = Url::parse("http://localhost/").unwrap();
        assert!(matches!(check_target(&url).await, Err(RenderError::Blocked(_))));
    }
}
