//! SSRF-safe HTTP fetcher.
//!
//! [`Fetcher::fetch`] is the only code path in the crate that opens a
//! network connection. Every request is validated in a fixed order, and
//! each check fails fast with its own [`FetchError`] variant:
//!
//! 1. The scheme must be `http` or `https`.
//! 2. If the caller supplies an allow-list, the hostname must be a literal
//!    member of it. This happens before any DNS lookup.
//! 3. Every address the hostname resolves to must be publicly routable.
//!    Loopback, RFC 1918, RFC 4193, RFC 3927 and other reserved ranges are
//!    refused.
//! 4. The request is sent to the validated address (the hostname is pinned,
//!    not re-resolved), with a fixed timeout and without following
//!    redirects. At most `max_bytes + 1` bytes are read; the declared
//!    content-type must start with an allowed prefix and the body must not
//!    exceed `max_bytes`.
//!
//! All failures are terminal for the call. Retrying is the job of
//! [`crate::retry`].
//!
//! DNS resolution and the HTTP exchange sit behind the [`Resolve`] and
//! [`Transport`] traits so tests can drive the validation logic without
//! touching the network.

use std::io::Read;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ipnet::IpNet;
use thiserror::Error;
use url::{Host, Url};

use crate::config::FetcherConfig;

/// Errors raised by [`Fetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("host not allowlisted: {0}")]
    HostNotAllowed(String),
    #[error("failed to resolve host {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("refusing to connect to private address {addr} for host {host}")]
    PrivateAddressBlocked { host: String, addr: IpAddr },
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("call deadline exceeded")]
    DeadlineExceeded,
}

impl FetchError {
    /// HTTP-like status code for metrics, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Hostname resolution.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// A single outbound GET, pinned to an already-validated address.
#[derive(Debug, Clone)]
pub struct PinnedRequest {
    pub url: Url,
    pub host: String,
    pub addr: SocketAddr,
    pub timeout: Duration,
    /// Transports must not read more than this many body bytes.
    pub read_limit: usize,
    pub user_agent: String,
}

/// What a transport hands back: status, declared content-type and at most
/// `read_limit` body bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Executes a [`PinnedRequest`]. Blocking.
pub trait Transport: Send + Sync {
    fn get(&self, request: &PinnedRequest) -> Result<TransportResponse, FetchError>;
}

/// Blocking `reqwest` transport.
///
/// A client is built per request so the hostname can be pinned to the
/// validated socket address with [`reqwest::blocking::ClientBuilder::resolve`].
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn get(&self, request: &PinnedRequest) -> Result<TransportResponse, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .resolve(&request.host, request.addr)
            .user_agent(request.user_agent.as_str())
            .build()?;

        let response = client.get(request.url.clone()).send()?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = Vec::new();
        response
            .take(request.read_limit as u64)
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

/// The network boundary. Cheap to share behind an `Arc`.
pub struct Fetcher {
    timeout: Duration,
    max_bytes: usize,
    allowed_content_types: Vec<String>,
    user_agent: String,
    resolver: Arc<dyn Resolve>,
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    /// Fetcher using the system resolver and the `reqwest` transport.
    pub fn new(config: &FetcherConfig) -> Self {
        Self::with_backends(config, Arc::new(SystemResolver), Arc::new(ReqwestTransport))
    }

    pub fn with_backends(
        config: &FetcherConfig,
        resolver: Arc<dyn Resolve>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
            allowed_content_types: config.allowed_content_types.clone(),
            user_agent: config.user_agent.clone(),
            resolver,
            transport,
        }
    }

    /// Fetch `url`, optionally restricted to `allowed_hosts`. Blocking.
    pub fn fetch(&self, url: &str, allowed_hosts: Option<&[&str]>) -> Result<FetchResult, FetchError> {
        self.fetch_within(url, allowed_hosts, None)
    }

    /// Like [`Fetcher::fetch`], with the transport timeout lowered to
    /// `budget` when the caller has less time left than the fetcher's own
    /// timeout.
    pub fn fetch_within(
        &self,
        url: &str,
        allowed_hosts: Option<&[&str]>,
        budget: Option<Duration>,
    ) -> Result<FetchResult, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let host = match parsed.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => {
                return Err(FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: "missing host".to_string(),
                })
            }
        };

        if let Some(allowed) = allowed_hosts {
            if !allowed.contains(&host.as_str()) {
                return Err(FetchError::HostNotAllowed(host));
            }
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addr = self.resolve_public(&host, port)?;

        let request = PinnedRequest {
            url: parsed,
            host: host.clone(),
            addr,
            timeout: budget.map_or(self.timeout, |b| b.min(self.timeout)),
            read_limit: self.max_bytes + 1,
            user_agent: self.user_agent.clone(),
        };
        let response = self.transport.get(&request)?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::HttpStatus(response.status));
        }

        if !self
            .allowed_content_types
            .iter()
            .any(|prefix| response.content_type.starts_with(prefix.as_str()))
        {
            return Err(FetchError::UnsupportedContentType(response.content_type));
        }

        if response.body.len() > self.max_bytes {
            return Err(FetchError::ResponseTooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(FetchResult {
            url: url.to_string(),
            content: response.body,
            content_type: response.content_type,
        })
    }

    /// Resolve `host` and return the address to connect to. Fails if any
    /// resolved address is non-public.
    fn resolve_public(&self, host: &str, port: u16) -> Result<SocketAddr, FetchError> {
        let addrs = self
            .resolver
            .resolve(host, port)
            .map_err(|e| FetchError::Resolve {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(bad) = addrs.iter().find(|a| is_blocked_address(a.ip())) {
            return Err(FetchError::PrivateAddressBlocked {
                host: host.to_string(),
                addr: bad.ip(),
            });
        }

        addrs.into_iter().next().ok_or_else(|| FetchError::Resolve {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        })
    }
}

/// Non-public ranges: private, loopback, link-local, shared, documentation,
/// benchmarking, multicast and the IANA reserved blocks for both families.
const BLOCKED_CIDRS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    // ::/8 covers ::, ::1 and IPv4-compatible addresses; mapped
    // addresses are unwrapped and checked as IPv4 first.
    "::/8",
    "64:ff9b:1::/48",
    "100::/8",
    "200::/7",
    "400::/6",
    "800::/5",
    "1000::/4",
    "2001::/23",
    "2001:db8::/32",
    "4000::/3",
    "6000::/3",
    "8000::/3",
    "a000::/3",
    "c000::/3",
    "e000::/4",
    "f000::/5",
    "f800::/6",
    "fc00::/7",
    "fe00::/9",
    "fe80::/10",
    "fec0::/10",
    "ff00::/8",
];

fn blocked_nets() -> &'static [IpNet] {
    static NETS: OnceLock<Vec<IpNet>> = OnceLock::new();
    NETS.get_or_init(|| BLOCKED_CIDRS.iter().filter_map(|c| c.parse().ok()).collect())
}

/// True for any address that is not publicly routable.
pub fn is_blocked_address(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    };
    // 255.255.255.255 sits inside 240.0.0.0/4.
    blocked_nets().iter().any(|net| net.contains(&ip))
}
