//! Destination policy: only public addresses may be fetched.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use url::{Host, Url};

use crate::error::FetchError;

const METADATA_HOSTS: &[&str] = &["metadata.google.internal", "metadata", "instance-data"];
const METADATA_V4: &[Ipv4Addr] = &[
    Ipv4Addr::new(169, 254, 169, 254),
    Ipv4Addr::new(169, 254, 170, 2),
    Ipv4Addr::new(100, 100, 100, 200),
];
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Checks everything knowable from the URL alone: scheme, literal IPs and
/// reserved hostnames. Hostnames still go through [`resolve_public`].
pub fn check_url(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(FetchError::Forbidden(format!("scheme {} not allowed", other))),
    }

    match url.host() {
        None => Err(FetchError::Forbidden("URL has no host".to_string())),
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
        Some(Host::Domain(name)) => check_hostname(name),
    }
}

pub fn check_hostname(name: &str) -> Result<(), FetchError> {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if name == "localhost"
        || name.ends_with(".localhost")
        || name.ends_with(".local")
        || name.ends_with(".internal")
        || METADATA_HOSTS.contains(&name.as_str())
    {
        return Err(FetchError::Forbidden(format!("host {} is not public", name)));
    }
    Ok(())
}

pub fn check_ip(ip: IpAddr) -> Result<(), FetchError> {
    if is_forbidden(ip) {
        Err(FetchError::Forbidden(format!("address {} is not public", ip)))
    } else {
        Ok(())
    }
}

/// Resolve `host` and reject it if any resolved address is non-public.
pub async fn resolve_public(host: &str, port: u16) -> Result<Vec<SocketAddr>, FetchError> {
    check_hostname(host)?;
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| FetchError::Unreachable(format!("DNS lookup for {} failed: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(FetchError::Unreachable(format!("{} resolved to no addresses", host)));
    }
    for addr in &addrs {
        check_ip(addr.ip())?;
    }
    Ok(addrs)
}

pub fn is_forbidden(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_forbidden_v4(v4);
            }
            is_forbidden_v6(v6)
        }
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..=127).contains(&b))
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (18..=19).contains(&b))
        || a >= 240
        || METADATA_V4.contains(&ip)
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        || ip == METADATA_V6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbidden(url: &str) -> bool {
        matches!(check_url(&Url::parse(url).unwrap()), Err(FetchError::Forbidden(_)))
    }

    #[test]
    fn rejects_private_and_metadata_literals() {
        assert!(forbidden("http://127.0.0.1/secret"));
        assert!(forbidden("http://169.254.169.254/latest/meta-data/"));
        assert!(forbidden("http://10.1.2.3/"));
        assert!(forbidden("http://172.16.0.1/"));
        assert!(forbidden("http://192.168.1.1/"));
        assert!(forbidden("http://100.100.100.200/"));
        assert!(forbidden("http://[::1]/"));
        assert!(forbidden("http://[fd00:ec2::254]/"));
        assert!(forbidden("http://[fe80::1]/"));
        assert!(forbidden("http://[::ffff:127.0.0.1]/"));
        assert!(forbidden("http://0.0.0.0/"));
    }

    #[test]
    fn rejects_reserved_names_and_schemes() {
        assert!(forbidden("http://localhost:8080/"));
        assert!(forbidden("http://metadata.google.internal/computeMetadata/v1/"));
        assert!(forbidden("file:///etc/passwd"));
        assert!(forbidden("ftp://example.com/"));
    }

    #[test]
    fn allows_public() {
        assert!(check_url(&Url::parse("https://example.com/").unwrap()).is_ok());
        assert!(check_url(&Url::parse("http://93.184.216.34/").unwrap()).is_ok());
        assert!(check_url(&Url::parse("http://[2606:2800:220:1::]/").unwrap()).is_ok());
    }
}
