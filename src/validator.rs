//! URL safety checks.
//!
//! A URL is safe to fetch when it uses `http`/`https`, carries a host, and
//! every address that host resolves to is publicly routable. Resolution is
//! redone on every call.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::lookup_host;
use url::Url;

/// Why a candidate URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("malformed URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("could not resolve '{host}': {reason}")]
    Unresolvable { host: String, reason: String },

    #[error("'{host}' resolves to non-public address {ip}")]
    NonPublicAddress { host: String, ip: IpAddr },
}

/// Hostname resolution used by the validator.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// System resolver backed by `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait]
impl Resolve for DnsResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[derive(Clone)]
pub struct UrlValidator {
    resolver: Arc<dyn Resolve>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new(Arc::new(DnsResolver))
    }
}

impl UrlValidator {
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self { resolver }
    }

    /// Parse and vet `candidate`, returning the parsed URL when it is safe.
    pub async fn check(&self, candidate: &str) -> Result<Url, UrlRejection> {
        let url = Url::parse(candidate.trim())
            .map_err(|e| UrlRejection::Malformed(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UrlRejection::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(UrlRejection::MissingHost),
        };
        // IPv6 literals come back bracketed from `host_str`.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|e| UrlRejection::Unresolvable {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        if addrs.is_empty() {
            return Err(UrlRejection::Unresolvable {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            });
        }

        if let Some(ip) = addrs.into_iter().find(|ip| !is_public_ip(*ip)) {
            return Err(UrlRejection::NonPublicAddress {
                host: host.to_string(),
                ip,
            });
        }

        Ok(url)
    }

    pub async fn is_safe(&self, candidate: &str) -> bool {
        match self.check(candidate).await {
            Ok(_) => true,
            Err(rejection) => {
                tracing::debug!(url = candidate, %rejection, "rejected URL");
                false
            }
        }
    }
}

/// Convenience wrapper using the system resolver.
pub async fn is_safe_url(candidate: &str) -> bool {
    UrlValidator::default().is_safe(candidate).await
}

pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    let non_public = ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0b1100_0000) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240;

    !non_public
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_v4(mapped);
    }

    let seg = ip.segments();
    let first = seg[0];
    let non_public = ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
        // fec0::/10 deprecated site local
        || (first & 0xffc0) == 0xfec0
        // 2001:db8::/32 documentation
        || (first == 0x2001 && seg[1] == 0x0db8)
        // 100::/64 discard-only
        || (first == 0x0100 && seg[1] == 0 && seg[2] == 0 && seg[3] == 0);

    !non_public
}
