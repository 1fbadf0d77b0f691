//! # Load Balancing
//!
//! Resolves a logical service address such as `socket://echo-service/x` to a
//! concrete server chosen by discovery, rewrites the URL for that server's
//! protocol port, and delegates to the protocol's client.
//!
//! ## Port selection
//! - `http` / `https`: the server's own port.
//! - other known protocols: the server's `{scheme}-port` metadata entry,
//!   falling back to the protocol's default port.
//! - anything else: `AddressError::UnsupportedScheme`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::client::Client;
use crate::config::Options;
use crate::config::port_metadata_key;
use crate::error::AddressError;
use crate::protocol::Protocol;
use crate::protocol::parse_address;
use crate::request::HttpMethod;
use crate::request::Request;
use crate::request::Response;

/// A service instance known to discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Overrides the scheme of the original URL when set.
    pub scheme: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Server {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, scheme: None, metadata: HashMap::new() }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Where a rewritten request actually goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Source of service instances.
pub trait Discovery: Send + Sync {
    /// Picks one instance of `service`, or `None` when there is none.
    fn choose_server(&self, service: &str) -> Option<Server>;

    /// Per-service timeouts, used when the caller passed the defaults.
    fn client_config(&self, _service: &str) -> Option<Options> {
        None
    }
}

#[derive(Default)]
struct ServiceEntry {
    servers: Vec<Server>,
    next: AtomicUsize,
    options: Option<Options>,
}

/// In-memory discovery with round-robin selection.
#[derive(Default)]
pub struct StaticDiscovery {
    services: DashMap<String, ServiceEntry>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance. Service names are matched case-insensitively.
    pub fn register(&self, service: &str, server: Server) {
        self.services
            .entry(service.to_ascii_lowercase())
            .or_default()
            .servers
            .push(server);
    }

    pub fn set_options(&self, service: &str, options: Options) {
        self.services.entry(service.to_ascii_lowercase()).or_default().options = Some(options);
    }

    /// Removes every instance of `service`.
    pub fn deregister(&self, service: &str) {
        if let Some(mut entry) = self.services.get_mut(&service.to_ascii_lowercase()) {
            entry.servers.clear();
        }
    }

    pub fn servers(&self, service: &str) -> Vec<Server> {
        self.services
            .get(&service.to_ascii_lowercase())
            .map(|entry| entry.servers.clone())
            .unwrap_or_default()
    }
}

impl Discovery for StaticDiscovery {
    fn choose_server(&self, service: &str) -> Option<Server> {
        let entry = self.services.get(&service.to_ascii_lowercase())?;
        if entry.servers.is_empty() {
            return None;
        }
        let idx = entry.next.fetch_add(1, Ordering::Relaxed) % entry.servers.len();
        Some(entry.servers[idx].clone())
    }

    fn client_config(&self, service: &str) -> Option<Options> {
        self.services.get(&service.to_ascii_lowercase()).and_then(|entry| entry.options)
    }
}

/// When a transport failure moves on to another server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Further servers tried after the first one fails.
    pub max_next_server: usize,
    /// Retry non-GET requests too.
    pub retry_on_all_operations: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_next_server: 0, retry_on_all_operations: false }
    }

    /// Tries up to `max_next_server` further servers after a transport failure.
    pub fn next_server(max_next_server: usize) -> Self {
        Self { max_next_server, retry_on_all_operations: false }
    }

    pub fn is_retryable(&self, method: HttpMethod) -> bool {
        self.retry_on_all_operations || method == HttpMethod::Get
    }

    fn attempts(&self, method: HttpMethod) -> usize {
        if self.is_retryable(method) { 1 + self.max_next_server } else { 1 }
    }
}

/// Rewrites `original` to point at `server`.
///
/// Userinfo, path, query and fragment are kept as they are. IPv6 hosts
/// are bracketed.
pub fn reconstruct_uri(server: &Server, original: &Url) -> Result<(String, Endpoint), AddressError> {
    let scheme = server
        .scheme
        .clone()
        .unwrap_or_else(|| original.scheme().to_string())
        .to_ascii_lowercase();

    let port = if Protocol::is_http_family(&scheme) {
        server.port
    } else {
        let Some(protocol) = Protocol::from_name(&scheme) else {
            return Err(AddressError::UnsupportedScheme(original.to_string()));
        };
        let key = port_metadata_key(protocol);
        match server.metadata.get(&key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AddressError::InvalidPortMetadata { key, value: raw.clone() })?,
            None => protocol.default_port(),
        }
    };

    let mut out = format!("{scheme}://");
    if !original.username().is_empty() || original.password().is_some() {
        out.push_str(original.username());
        if let Some(password) = original.password() {
            out.push(':');
            out.push_str(password);
        }
        out.push('@');
    }
    let host = server.host.trim();
    if host.contains(':') && !host.starts_with('[') {
        out.push_str(&format!("[{host}]:{port}"));
    } else {
        out.push_str(&format!("{host}:{port}"));
    }
    out.push_str(original.path());
    if let Some(query) = original.query().filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = original.fragment().filter(|f| !f.is_empty()) {
        out.push('#');
        out.push_str(fragment);
    }

    Ok((out, Endpoint { scheme, host: server.host.clone(), port }))
}

/// Resolves the service named by the URL host through discovery, then
/// delegates to the protocol client.
pub struct LoadBalancedClient {
    delegate: Arc<dyn Client>,
    discovery: Arc<dyn Discovery>,
    retry: RetryPolicy,
}

impl LoadBalancedClient {
    pub fn new(delegate: Arc<dyn Client>, discovery: Arc<dyn Discovery>) -> Self {
        Self { delegate, discovery, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

#[async_trait::async_trait]
impl Client for LoadBalancedClient {
    async fn execute(&self, request: Request, options: &Options) -> Result<Response, AddressError> {
        let original = parse_address(&request.url)?;
        let service = original
            .host_str()
            .ok_or_else(|| AddressError::InvalidAddress {
                address: request.url.clone(),
                reason: "no service name".into(),
            })?
            .to_string();

        let options = if options.is_default() {
            self.discovery.client_config(&service).unwrap_or(*options)
        } else {
            *options
        };

        let attempts = self.retry.attempts(request.method);
        let mut last = None;
        for attempt in 1..=attempts {
            let Some(server) = self.discovery.choose_server(&service) else {
                break;
            };
            let (url, endpoint) = reconstruct_uri(&server, &original)?;
            debug!(%service, %endpoint, attempt, "load balanced call");

            let response = self.delegate.execute(request.with_url(url), &options).await?;
            if !response.is_transport_failure() || attempt == attempts {
                return Ok(response);
            }
            warn!(%service, %endpoint, reason = %response.reason, "retrying on next server");
            last = Some(response);
        }

        Ok(last.unwrap_or_else(|| {
            Response::failure(
                format!("Load balancer does not have available server for client: {service}"),
                request.headers.clone(),
            )
        }))
    }
}
