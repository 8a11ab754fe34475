// src/core/target.rs

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::core::error::ScanError;

/// A target that passed validation: a parsed http(s) URL together with the
/// addresses it resolved to. Probes connect to these addresses rather than
/// resolving the host again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    url: Url,
    host: String,
    addrs: Vec<IpAddr>,
}

impl ScanTarget {
    /// Builds a target without running the address guard. Only for callers
    /// that have validated the URL themselves, such as tests against a local
    /// fixture server.
    pub fn from_validated(url: Url, addrs: Vec<IpAddr>) -> Self {
        let host = url.host_str().unwrap_or_default().to_string();
        Self { url, host, addrs }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    pub fn primary_addr(&self) -> Option<IpAddr> {
        self.addrs.first().copied()
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Parses a raw target string. Bare hosts get an `https://` scheme.
pub fn parse_target(raw: &str) -> Result<Url, ScanError> {
    let invalid = |reason: &str| ScanError::InvalidTarget {
        target: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("target is empty"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https targets are supported"));
    }
    if url.host().is_none() {
        return Err(invalid("target has no host"));
    }
    Ok(url)
}

/// Returns the reason an address may not be scanned, or `None` for a public
/// unicast address.
pub fn classify_address(addr: IpAddr) -> Option<&'static str> {
    match addr {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => classify_ipv6(v6),
    }
}

fn classify_ipv4(ip: Ipv4Addr) -> Option<&'static str> {
    let [a, b, c, _] = ip.octets();
    if ip.is_loopback() {
        Some("loopback")
    } else if ip.is_private() {
        Some("private")
    } else if ip.is_link_local() {
        Some("link-local")
    } else if a == 0 {
        Some("unspecified")
    } else if a == 100 && (64..128).contains(&b) {
        Some("shared (carrier-grade NAT)")
    } else if a == 192 && b == 0 && c == 0 {
        Some("reserved")
    } else if ip.is_documentation() {
        Some("documentation")
    } else if a == 198 && (b == 18 || b == 19) {
        Some("benchmarking")
    } else if ip.is_multicast() {
        Some("multicast")
    } else if ip.is_broadcast() || a >= 240 {
        Some("reserved")
    } else {
        None
    }
}

fn classify_ipv6(ip: Ipv6Addr) -> Option<&'static str> {
    let segments = ip.segments();
    if ip.is_loopback() {
        Some("loopback")
    } else if ip.is_unspecified() {
        Some("unspecified")
    } else if let Some(v4) = ip.to_ipv4_mapped() {
        classify_ipv4(v4)
    } else if segments[0] == 0x0064 && segments[1] == 0xff9b && segments[2..6].iter().all(|s| *s == 0) {
        // NAT64 well-known prefix: judge the embedded IPv4 address.
        let [_, _, _, _, _, _, hi, lo] = segments;
        classify_ipv4(Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8))
    } else if segments[0] & 0xfe00 == 0xfc00 {
        Some("unique local")
    } else if segments[0] & 0xffc0 == 0xfe80 {
        Some("link-local")
    } else if ip.is_multicast() {
        Some("multicast")
    } else if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        Some("documentation")
    } else if segments[..6].iter().all(|s| *s == 0) {
        Some("reserved")
    } else {
        None
    }
}

/// Parses, resolves and guards a target before any probe is dispatched.
///
/// Every resolved address must be public; a single private record rejects
/// the whole target.
pub async fn validate_target(raw: &str) -> Result<ScanTarget, ScanError> {
    let url = parse_target(raw)?;
    let host = url.host_str().unwrap_or_default().to_string();

    let addrs = match url.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => {
            let lowered = domain.to_ascii_lowercase();
            if lowered == "localhost" || lowered.ends_with(".localhost") {
                warn!(host = %domain, "Rejected localhost target.");
                return Err(ScanError::DisallowedAddress {
                    host,
                    addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    reason: "loopback",
                });
            }
            resolve(domain).await?
        }
        None => {
            return Err(ScanError::InvalidTarget {
                target: raw.to_string(),
                reason: "target has no host".to_string(),
            });
        }
    };

    if addrs.is_empty() {
        return Err(ScanError::Resolution {
            host,
            reason: "no addresses returned".to_string(),
        });
    }

    for addr in &addrs {
        if let Some(reason) = classify_address(*addr) {
            warn!(host = %host, addr = %addr, reason, "Rejected target resolving to a disallowed address.");
            return Err(ScanError::DisallowedAddress {
                host,
                addr: *addr,
                reason,
            });
        }
    }

    info!(host = %host, addrs = ?addrs, "Target validated.");
    Ok(ScanTarget { url, host, addrs })
}

async fn resolve(domain: &str) -> Result<Vec<IpAddr>, ScanError> {
    debug!(host = domain, "Resolving target host.");
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let lookup = resolver.lookup_ip(domain).await.map_err(|e| ScanError::Resolution {
        host: domain.to_string(),
        reason: e.to_string(),
    })?;
    Ok(lookup.iter().collect())
}
