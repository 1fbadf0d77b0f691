//! # Error Definitions
//!
//! One enum per concern. Transport failures are not here: the socket client
//! turns them into 502 responses instead of errors.

use polywire::Fault;
use polywire::WireError;
use thiserror::Error;

use crate::protocol::Protocol;

/// Addressing and endpoint resolution failures. Fatal and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Not supported scheme in URL: {0}")]
    UnsupportedScheme(String),
    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),
    #[error("server metadata `{key}` is not a port: `{value}`")]
    InvalidPortMetadata { key: String, value: String },
}

/// Building a request template from call arguments failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("Body parameter {0} was null")]
    NullBody(usize),
    #[error("URI parameter {0} was null")]
    NullUri(usize),
    #[error("parameter {index} must be a map, found {found}")]
    NotAMap { index: usize, found: &'static str },
    #[error("{type_name} is not a type supported by this encoder")]
    Unsupported { type_name: String },
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A method declaration that cannot be turned into a request builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("{0}: method has too many body parameters")]
    MultipleBodies(String),
    #[error("{0}: body parameters cannot be used with form parameters")]
    BodyWithForm(String),
    #[error("{method}: only one {kind} parameter is allowed")]
    Duplicate { method: String, kind: &'static str },
    #[error("{method}: parameter {index} must be a map or record to bind as {kind}")]
    NotKeyed { method: String, index: usize, kind: &'static str },
    #[error("{0}: parameter name must not be empty")]
    EmptyName(String),
    #[error("{type_name} declares method `{method}` twice")]
    DuplicateMethod { type_name: String, method: String },
}

/// Everything a proxied call can fail with.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("no method `{0}` on this client")]
    UnknownMethod(String),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("status {status} reading {method}: {reason}")]
    Status { method: String, status: u16, reason: String },
    #[error("remote fault: {0}")]
    Remote(Fault),
    #[error("decode: {0}")]
    Decode(String),
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl CallError {
    /// The HTTP-style status when the call failed with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Server-side method registry construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate {protocol} rpc method `{key}`")]
    DuplicateMethod { protocol: Protocol, key: String },
}

/// Listener lifecycle failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("server already stopped")]
    Stopped,
}

/// Settings that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: String, value: String },
}

/// Turning a client declaration into a proxy failed.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no client for load balancing defined for protocol {0}")]
    NoClient(Protocol),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}
