//! # Client Factory
//!
//! Turns a client declaration into a ready proxy: works out the target URL,
//! picks a transport for its protocol, and hands the result to a
//! `Targeter`.
//!
//! - No URL: the name is the logical service, tagged with the declared
//!   protocol and resolved through the load balancer on every call.
//! - URL given: the transport is used directly with that address.

use std::sync::Arc;

use polywire::Value;

use crate::client::Client;
use crate::client::SocketClient;
use crate::codec::BodyEncoder;
use crate::codec::DefaultEncoder;
use crate::codec::ResponseDecoder;
use crate::config::Options;
use crate::config::SocketClientConfig;
use crate::error::AddressError;
use crate::error::CallError;
use crate::error::FactoryError;
use crate::loadbalancer::Discovery;
use crate::loadbalancer::LoadBalancedClient;
use crate::loadbalancer::RetryPolicy;
use crate::metadata::MethodMetadata;
use crate::protocol::Protocol;
use crate::protocol::ensure_protocol_prefix;
use crate::protocol::parse_address;
use crate::protocol::resolve_protocol;
use crate::proxy::Invoker;
use crate::proxy::Proxy;
use crate::proxy::ProxyBuilder;
use crate::proxy::Target;

/// A declared remote client.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub type_name: String,
    /// Logical service name; also the load balancer key.
    pub name: String,
    pub url: Option<String>,
    pub path: String,
    /// Protocol used to tag untagged names and URLs.
    pub protocol: Protocol,
    pub methods: Vec<MethodMetadata>,
}

impl ClientSpec {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            url: None,
            path: String::new(),
            protocol: Protocol::Http,
            methods: Vec::new(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into()).filter(|u: &String| !u.trim().is_empty());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn method(mut self, metadata: MethodMetadata) -> Self {
        self.methods.push(metadata);
        self
    }

    /// The target URL and whether calls go through the load balancer.
    pub fn target_url(&self) -> (String, bool) {
        match &self.url {
            None => (ensure_protocol_prefix(self.protocol, &self.name) + &clean_path(&self.path), true),
            Some(url) => (ensure_protocol_prefix(self.protocol, url.trim()) + &clean_path(&self.path), false),
        }
    }
}

/// `/`-prefixed, without a trailing `/`; empty stays empty.
pub fn clean_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return String::new();
    }
    let mut out = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    if out.ends_with('/') {
        out.pop();
    }
    out
}

/// Shared collaborators for every client the factory creates.
#[derive(Clone)]
pub struct ClientContext {
    /// Transport for `http` targets; there is none built in.
    pub http: Option<Arc<dyn Client>>,
    pub socket: SocketClientConfig,
    pub discovery: Arc<dyn Discovery>,
    pub encoder: Arc<dyn BodyEncoder>,
    pub decoder: ResponseDecoder,
    pub options: Options,
    pub retry: RetryPolicy,
}

impl ClientContext {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            http: None,
            socket: SocketClientConfig::default(),
            discovery,
            encoder: Arc::new(DefaultEncoder),
            decoder: ResponseDecoder::default(),
            options: Options::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_http(mut self, client: Arc<dyn Client>) -> Self {
        self.http = Some(client);
        self
    }

    pub fn with_socket(mut self, config: SocketClientConfig) -> Self {
        self.socket = config;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The plain transport for `protocol`.
    fn transport(&self, protocol: Protocol) -> Result<Arc<dyn Client>, FactoryError> {
        match protocol {
            Protocol::Socket => Ok(Arc::new(SocketClient::new(self.socket))),
            Protocol::Http => self.http.clone().ok_or(FactoryError::NoClient(protocol)),
            Protocol::Dubbo | Protocol::Thrift => Err(FactoryError::NoClient(protocol)),
        }
    }
}

/// Builds the invoker for a target.
pub trait Targeter: Send + Sync {
    fn target(&self, spec: &ClientSpec, builder: ProxyBuilder) -> Result<Arc<dyn Invoker>, FactoryError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTargeter;

impl Targeter for DefaultTargeter {
    fn target(&self, _spec: &ClientSpec, builder: ProxyBuilder) -> Result<Arc<dyn Invoker>, FactoryError> {
        Ok(Arc::new(builder.build()?))
    }
}

/// Answers calls that failed.
#[async_trait::async_trait]
pub trait Fallback: Send + Sync {
    async fn fallback(&self, method: &str, args: Vec<Value>, cause: CallError) -> Result<Value, CallError>;
}

/// Wraps every proxy in an invoker that routes failures to a `Fallback`.
#[derive(Clone)]
pub struct FallbackTargeter {
    fallback: Arc<dyn Fallback>,
}

impl FallbackTargeter {
    pub fn new(fallback: Arc<dyn Fallback>) -> Self {
        Self { fallback }
    }
}

impl Targeter for FallbackTargeter {
    fn target(&self, _spec: &ClientSpec, builder: ProxyBuilder) -> Result<Arc<dyn Invoker>, FactoryError> {
        Ok(Arc::new(FallbackInvoker { inner: builder.build()?, fallback: self.fallback.clone() }))
    }
}

struct FallbackInvoker {
    inner: Proxy,
    fallback: Arc<dyn Fallback>,
}

#[async_trait::async_trait]
impl Invoker for FallbackInvoker {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        match self.inner.invoke(method, args.clone()).await {
            Ok(value) => Ok(value),
            Err(cause) => {
                tracing::debug!(method, %cause, "falling back");
                self.fallback.fallback(method, args, cause).await
            }
        }
    }

    fn target(&self) -> &Target {
        self.inner.target()
    }
}

/// Creates proxies from client declarations.
#[derive(Clone)]
pub struct ClientFactory {
    context: ClientContext,
    targeter: Arc<dyn Targeter>,
}

impl ClientFactory {
    pub fn new(context: ClientContext) -> Self {
        Self { context, targeter: Arc::new(DefaultTargeter) }
    }

    pub fn with_targeter(mut self, targeter: Arc<dyn Targeter>) -> Self {
        self.targeter = targeter;
        self
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn create(&self, spec: &ClientSpec) -> Result<Arc<dyn Invoker>, FactoryError> {
        if spec.name.trim().is_empty() {
            return Err(AddressError::InvalidAddress {
                address: spec.url.clone().unwrap_or_default(),
                reason: "client name must be set".into(),
            }
            .into());
        }

        let (url, balanced) = spec.target_url();
        let parsed = parse_address(&url)?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(AddressError::InvalidAddress { address: url, reason: "no host".into() }.into());
        }
        let protocol = resolve_protocol(&url).unwrap_or(spec.protocol);
        let transport = self.context.transport(protocol)?;
        let client: Arc<dyn Client> = if balanced {
            Arc::new(
                LoadBalancedClient::new(transport, self.context.discovery.clone()).with_retry(self.context.retry),
            )
        } else {
            transport
        };
        tracing::info!(client = %spec.name, %url, %protocol, balanced, "creating rpc client");

        let builder = Proxy::builder(Target::new(&spec.type_name, &spec.name, url), client)
            .options(self.context.options)
            .encoder(self.context.encoder.clone())
            .decoder(self.context.decoder.clone())
            .methods(spec.methods.iter().cloned());
        self.targeter.target(spec, builder)
    }
}
