//! # Polyrpc
//!
//! Remote method calls over pluggable protocols. The client side turns a
//! declared method into a request, the server side maps invocation keys to
//! handlers, and both meet on the binary `socket` transport.
//!
//! ## Architecture
//!
//! - **Protocols**: a fixed table (`http`, `dubbo`, `thrift`, `socket`) with
//!   default ports. A URL's scheme selects the transport.
//! - **Client**: `MethodMetadata` → `TemplateFactory` → `RequestTemplate`
//!   → `Client` → `ResponseDecoder`, wrapped in a `Proxy`.
//! - **Load balancing**: a logical service URL is resolved per call through
//!   `Discovery` and rewritten to the chosen server's protocol port.
//! - **Server**: `Controller`s populate a `MethodRegistry`; a
//!   `SocketServer` serves its `socket` table.
//!
//! ## Failure model
//!
//! Transport failures become 502 responses, never panics or hangs.
//! Application failures travel back as a `Fault` inside a well-formed
//! response and surface as `CallError::Remote`.

pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod loadbalancer;
pub mod metadata;
pub mod protocol;
pub mod proxy;
pub mod request;
pub mod server;
pub mod template;


pub use polywire;

pub use crate::error::AddressError;
pub use crate::error::CallError;
pub use crate::error::ConfigError;
pub use crate::error::ContractError;
pub use crate::error::EncodeError;
pub use crate::error::FactoryError;
pub use crate::error::RegistryError;
pub use crate::error::ServerError;

pub use crate::protocol::Protocol;
pub use crate::protocol::ensure_protocol_prefix;
pub use crate::protocol::resolve_protocol;

pub use crate::config::Options;
pub use crate::config::OverflowPolicy;
pub use crate::config::ServerSettings;
pub use crate::config::SocketClientConfig;

pub use crate::request::HttpMethod;
pub use crate::request::Request;
pub use crate::request::Response;

pub use crate::template::RequestTemplate;

pub use crate::metadata::MethodMetadata;
pub use crate::metadata::ParamBinding;

pub use crate::builder::BuilderKind;
pub use crate::builder::TemplateFactory;
pub use crate::builder::select_builder;

pub use crate::client::Client;
pub use crate::client::SocketClient;

pub use crate::loadbalancer::Discovery;
pub use crate::loadbalancer::LoadBalancedClient;
pub use crate::loadbalancer::RetryPolicy;
pub use crate::loadbalancer::Server;
pub use crate::loadbalancer::StaticDiscovery;
pub use crate::loadbalancer::reconstruct_uri;

pub use crate::proxy::Invoker;
pub use crate::proxy::Proxy;
pub use crate::proxy::Target;

pub use crate::factory::ClientContext;
pub use crate::factory::ClientFactory;
pub use crate::factory::ClientSpec;

pub use crate::server::Controller;
pub use crate::server::MethodRegistry;
pub use crate::server::RpcController;
pub use crate::server::ServerGroup;
pub use crate::server::SocketServer;
