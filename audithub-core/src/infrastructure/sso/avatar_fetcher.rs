//! Avatar download guarded against server-side request forgery.
//!
//! Provider avatar URLs come from third-party profile data, so the fetch only
//! talks to allowlisted HTTPS hosts, checks that every address the host
//! resolves to is public, and then pins the connection to one vetted address
//! so a second DNS answer cannot swap in an internal target.

use async_trait::async_trait;
use futures::StreamExt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::application::sso::AvatarFetcher;
use crate::config::AvatarConfig;
use crate::domain::auth::entities::Avatar;
use crate::domain::sso::errors::SsoError;

const HTTPS_PORT: u16 = 443;

pub struct HttpAvatarFetcher {
    config: AvatarConfig,
}

impl HttpAvatarFetcher {
    pub fn new(config: AvatarConfig) -> Self {
        Self { config }
    }

    /// Scheme, credentials, port and host checks that need no network
    pub fn validate_url(&self, raw: &str) -> Result<Url, SsoError> {
        let url = Url::parse(raw).map_err(|_| rejected("URL does not parse"))?;

        if url.scheme() != "https" {
            return Err(rejected("only https is allowed"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(rejected("URL carries credentials"));
        }
        // `port()` is None when the port is the scheme default
        if url.port().is_some_and(|p| p != HTTPS_PORT) {
            return Err(rejected("non-default port"));
        }

        let host = match url.host() {
            Some(url::Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(_) => return Err(rejected("IP literal hosts are not allowed")),
            None => return Err(rejected("URL has no host")),
        };
        if !self
            .config
            .allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&host))
        {
            return Err(rejected(format!("host '{}' is not allowlisted", host)));
        }

        Ok(url)
    }

    /// Resolve `host` and insist that every answer is public
    async fn vetted_address(&self, host: &str) -> Result<SocketAddr, SsoError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, HTTPS_PORT))
            .await
            .map_err(|e| {
                debug!(host, error = %e, "Avatar host did not resolve");
                rejected("host did not resolve")
            })?
            .collect();

        if addrs.is_empty() {
            return Err(rejected("host did not resolve"));
        }
        if let Some(bad) = addrs.iter().find(|a| !is_public_ip(a.ip())) {
            warn!(host, address = %bad.ip(), "Avatar host resolves to a non-public address");
            return Err(rejected("host resolves to a non-public address"));
        }
        Ok(addrs[0])
    }

    fn content_type_allowed(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
    }
}

#[async_trait]
impl AvatarFetcher for HttpAvatarFetcher {
    async fn fetch(&self, raw_url: &str) -> Result<Avatar, SsoError> {
        let url = self.validate_url(raw_url)?;
        let host = url.host_str().unwrap_or_default().to_string();
        let address = self.vetted_address(&host).await?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .https_only(true)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .resolve(&host, address)
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to build avatar HTTP client");
                rejected("HTTP client unavailable")
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            debug!(host = %host, error = %e, "Avatar request failed");
            rejected("request failed")
        })?;

        if !response.status().is_success() {
            return Err(rejected(format!("upstream returned {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !self.content_type_allowed(&content_type) {
            return Err(rejected(format!("content type '{}' is not allowed", content_type)));
        }

        let max_bytes = self.config.max_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > max_bytes as u64)
        {
            return Err(rejected("image exceeds the size limit"));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|_| rejected("download interrupted"))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(rejected("image exceeds the size limit"));
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(rejected("empty body"));
        }

        let content_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        debug!(host = %host, size = bytes.len(), "Avatar downloaded");
        Ok(Avatar {
            content_type,
            bytes,
        })
    }
}

fn rejected(reason: impl Into<String>) -> SsoError {
    SsoError::AvatarRejected {
        reason: reason.into(),
    }
}

/// Whether `ip` is globally routable
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let shared_cgnat = a == 100 && (b & 0xc0) == 64;
    let this_network = a == 0;
    let protocol_assignments = a == 192 && b == 0 && c == 0;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    let reserved = a >= 240;

    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared_cgnat
        || this_network
        || protocol_assignments
        || benchmarking
        || reserved)
}

/// IPv4 address carried inside a NAT64 (64:ff9b::/96) or 6to4 (2002::/16) address
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let s = ip.segments();
    let octets = ip.octets();
    if s[..6] == [0x0064, 0xff9b, 0, 0, 0, 0] {
        Some(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
    } else if s[0] == 0x2002 {
        Some(Ipv4Addr::new(octets[2], octets[3], octets[4], octets[5]))
    } else {
        None
    }
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = embedded_v4(ip) {
        return is_public_v4(v4);
    }
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    // ::ffff:0:0/96 is handled by the caller; this catches deprecated ::a.b.c.d
    let ipv4_compatible = ip.segments()[..6].iter().all(|s| *s == 0) && !ip.is_loopback();

    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation
        || ipv4_compatible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpAvatarFetcher {
        HttpAvatarFetcher::new(AvatarConfig::default())
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn non_public_ipv4_ranges_are_rejected() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "255.255.255.255",
            "192.0.2.10",
            "100.64.0.1",
            "100.127.255.254",
            "224.0.0.1",
            "198.18.0.1",
            "240.0.0.1",
        ] {
            assert!(!is_public_ip(ip(addr)), "{addr} should be rejected");
        }
    }

    #[test]
    fn non_public_ipv6_ranges_are_rejected() {
        for addr in [
            "::1",
            "::",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "ff02::1",
            "2001:db8::1",
            "::ffff:127.0.0.1",
            "::ffff:169.254.169.254",
            "::ffff:10.0.0.1",
        ] {
            assert!(!is_public_ip(ip(addr)), "{addr} should be rejected");
        }
    }

    #[test]
    fn public_addresses_pass() {
        for addr in [
            "8.8.8.8",
            "142.250.74.46",
            "100.128.0.1",
            "2606:4700::1111",
            "::ffff:8.8.4.4",
        ] {
            assert!(is_public_ip(ip(addr)), "{addr} should be allowed");
        }
    }

    #[test]
    fn translated_ipv6_follows_the_embedded_ipv4() {
        for addr in [
            "64:ff9b::7f00:1",
            "64:ff9b::a9fe:a9fe",
            "64:ff9b::10.1.2.3",
            "2002:7f00:1::1",
            "2002:a9fe:a9fe::",
            "2002:c0a8:101::5",
        ] {
            assert!(!is_public_ip(ip(addr)), "{addr} should be rejected");
        }
        for addr in ["64:ff9b::808:808", "2002:808:404::1"] {
            assert!(is_public_ip(ip(addr)), "{addr} should be allowed");
        }
    }

    #[test]
    fn url_checks() {
        let f = fetcher();
        assert!(f.validate_url("https://cdn.discordapp.com/avatars/1/a.png").is_ok());
        assert!(f.validate_url("https://LH3.googleusercontent.com/a/x").is_ok());
        assert!(f.validate_url("https://cdn.discordapp.com:443/a.png").is_ok());

        for bad in [
            "http://cdn.discordapp.com/a.png",
            "https://user:pw@cdn.discordapp.com/a.png",
            "https://cdn.discordapp.com:8443/a.png",
            "https://evil.example/a.png",
            "https://169.254.169.254/latest/meta-data",
            "https://[::1]/a.png",
            "not a url",
            "file:///etc/passwd",
        ] {
            assert!(
                matches!(f.validate_url(bad), Err(SsoError::AvatarRejected { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn content_type_allowlist_ignores_parameters() {
        let f = fetcher();
        assert!(f.content_type_allowed("image/png"));
        assert!(f.content_type_allowed("IMAGE/JPEG; charset=binary"));
        assert!(!f.content_type_allowed("image/svg+xml"));
        assert!(!f.content_type_allowed("text/html"));
        assert!(!f.content_type_allowed(""));
    }

    #[tokio::test]
    async fn disallowed_host_never_touches_the_network() {
        let err = fetcher()
            .fetch("https://metadata.google.internal/computeMetadata/v1/")
            .await
            .unwrap_err();
        assert!(matches!(err, SsoError::AvatarRejected { .. }));
    }
}
