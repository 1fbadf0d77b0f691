//! # Proxy
//!
//! A proxy stands in for a remote interface. Each declared method gets a
//! template builder when the proxy is built; a call then runs
//! builder → target URL → client → response decoder.
//!
//! ## Invariants
//! - The dispatch table is fixed after `build`.
//! - Two proxies are equal when their targets are equal.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use polywire::Value;
use polywire::Wire;
use tracing::debug;

use crate::builder::BuilderKind;
use crate::builder::TemplateFactory;
use crate::builder::select_builder;
use crate::client::Client;
use crate::codec::BodyEncoder;
use crate::codec::DefaultEncoder;
use crate::codec::ResponseDecoder;
use crate::config::Options;
use crate::error::CallError;
use crate::error::ContractError;
use crate::metadata::MethodMetadata;
use crate::protocol::Protocol;
use crate::protocol::resolve_protocol;

/// What a proxy talks to: an interface type, a logical name and a base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub type_name: String,
    pub name: String,
    pub url: String,
}

impl Target {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), name: name.into(), url: url.into() }
    }

    /// The protocol tagging the URL; untagged URLs are plain HTTP.
    pub fn protocol(&self) -> Protocol {
        resolve_protocol(&self.url).unwrap_or(Protocol::Http)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target(type={}, name={}, url={})", self.type_name, self.name, self.url)
    }
}

/// Invokes methods by name with dynamic arguments.
#[async_trait::async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError>;

    fn target(&self) -> &Target;
}

impl dyn Invoker {
    /// Invokes and converts the result to `R`.
    pub async fn call<R: Wire>(&self, method: &str, args: Vec<Value>) -> Result<R, CallError> {
        Ok(R::from_value(self.invoke(method, args).await?)?)
    }
}

struct MethodHandler {
    metadata: Arc<MethodMetadata>,
    factory: Arc<dyn TemplateFactory>,
}

pub struct Proxy {
    target: Target,
    client: Arc<dyn Client>,
    options: Options,
    decoder: ResponseDecoder,
    dispatch: HashMap<String, MethodHandler>,
}

impl Proxy {
    pub fn builder(target: Target, client: Arc<dyn Client>) -> ProxyBuilder {
        ProxyBuilder {
            target,
            client,
            options: Options::default(),
            encoder: Arc::new(DefaultEncoder),
            decoder: ResponseDecoder::default(),
            methods: Vec::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn metadata(&self, method: &str) -> Option<&MethodMetadata> {
        self.dispatch.get(method).map(|h| h.metadata.as_ref())
    }

    /// Which builder serves `method`.
    pub fn builder_kind(&self, method: &str) -> Option<BuilderKind> {
        self.dispatch.get(method).map(|h| h.factory.kind())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.dispatch.keys().map(String::as_str)
    }

    /// Invokes and converts the result to `R`.
    pub async fn call<R: Wire>(&self, method: &str, args: Vec<Value>) -> Result<R, CallError> {
        Ok(R::from_value(self.invoke(method, args).await?)?)
    }
}

#[async_trait::async_trait]
impl Invoker for Proxy {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let handler = self
            .dispatch
            .get(method)
            .ok_or_else(|| CallError::UnknownMethod(method.to_string()))?;
        let metadata = handler.metadata.as_ref();

        let mut template = handler.factory.create(metadata, &args)?;
        template.apply_target(&self.target.url);
        let request = template.request();
        debug!(target_name = %self.target.name, method = metadata.config_key(), url = %request.url, "invoke");

        let response = self.client.execute(request, &self.options).await?;
        self.decoder.decode(metadata.config_key(), response, metadata.return_type())
    }

    fn target(&self) -> &Target {
        &self.target
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.target)
            .field("methods", &self.dispatch.len())
            .finish_non_exhaustive()
    }
}

pub struct ProxyBuilder {
    target: Target,
    client: Arc<dyn Client>,
    options: Options,
    encoder: Arc<dyn BodyEncoder>,
    decoder: ResponseDecoder,
    methods: Vec<MethodMetadata>,
}

impl ProxyBuilder {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn BodyEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn decoder(mut self, decoder: ResponseDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn method(mut self, metadata: MethodMetadata) -> Self {
        self.methods.push(metadata);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = MethodMetadata>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Chooses a builder per method for the target's protocol.
    pub fn build(self) -> Result<Proxy, ContractError> {
        let protocol = self.target.protocol();
        let mut dispatch = HashMap::with_capacity(self.methods.len());
        for metadata in self.methods {
            let name = metadata.method_name().to_string();
            if dispatch.contains_key(&name) {
                return Err(ContractError::DuplicateMethod { type_name: self.target.type_name.clone(), method: name });
            }
            let factory = select_builder(&metadata, protocol, self.encoder.clone());
            dispatch.insert(name, MethodHandler { metadata: Arc::new(metadata), factory });
        }
        Ok(Proxy {
            target: self.target,
            client: self.client,
            options: self.options,
            decoder: self.decoder,
            dispatch,
        })
    }
}
