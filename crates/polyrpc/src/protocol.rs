//! # Protocols
//!
//! The process-wide table of supported protocols and the rules for tagging
//! service addresses with them.
//!
//! ## Invariants
//! - The table is immutable; names are unique and double as URL schemes.
//! - A tagged address starts with `"{name}://"`. A bare name such as
//!   `httpbin` is not tagged, even though it starts with `http`.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::AddressError;

/// A supported wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Http,
    Dubbo,
    Thrift,
    Socket,
}

/// Name and default port of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    pub protocol: Protocol,
    pub name: &'static str,
    pub default_port: u16,
}

static PROTOCOLS: [ProtocolDescriptor; 4] = [
    ProtocolDescriptor { protocol: Protocol::Http, name: "http", default_port: 8080 },
    ProtocolDescriptor { protocol: Protocol::Dubbo, name: "dubbo", default_port: 20880 },
    ProtocolDescriptor { protocol: Protocol::Thrift, name: "thrift", default_port: 8080 },
    ProtocolDescriptor { protocol: Protocol::Socket, name: "socket", default_port: 12345 },
];

/// All descriptors, in table order.
pub fn protocols() -> &'static [ProtocolDescriptor] {
    &PROTOCOLS
}

impl Protocol {
    pub fn descriptor(self) -> &'static ProtocolDescriptor {
        match self {
            Protocol::Http => &PROTOCOLS[0],
            Protocol::Dubbo => &PROTOCOLS[1],
            Protocol::Thrift => &PROTOCOLS[2],
            Protocol::Socket => &PROTOCOLS[3],
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn default_port(self) -> u16 {
        self.descriptor().default_port
    }

    /// `"{name}://"`.
    pub fn prefix(self) -> String {
        format!("{}://", self.name())
    }

    /// Exact, case-insensitive name lookup.
    pub fn from_name(name: &str) -> Option<Protocol> {
        PROTOCOLS
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.protocol)
    }

    /// The protocol tagging an address, from the scheme before `"://"`.
    pub fn of_address(address: &str) -> Option<Protocol> {
        let (scheme, _) = address.split_once("://")?;
        Protocol::from_name(scheme)
    }

    /// Schemes served by the plain HTTP stack with the server's own port.
    pub fn is_http_family(scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::from_name(s).ok_or_else(|| AddressError::UnknownProtocol(s.to_string()))
    }
}

/// Resolves either a bare protocol name or a tagged address.
pub fn resolve_protocol(url_or_name: &str) -> Option<Protocol> {
    if url_or_name.contains("://") {
        Protocol::of_address(url_or_name)
    } else {
        Protocol::from_name(url_or_name)
    }
}

/// Whether the address already starts with a known `"{name}://"`.
pub fn has_known_prefix(address: &str) -> bool {
    PROTOCOLS.iter().any(|d| match address.split_at_checked(d.name.len()) {
        Some((head, rest)) => head.eq_ignore_ascii_case(d.name) && rest.starts_with("://"),
        None => false,
    })
}

/// Prepends `"{protocol}://"` unless the address is already tagged.
///
/// Idempotent: a tagged address is returned unchanged.
pub fn ensure_protocol_prefix(protocol: Protocol, address: &str) -> String {
    if has_known_prefix(address) {
        address.to_string()
    } else {
        format!("{}{}", protocol.prefix(), address)
    }
}

/// Parses a tagged address.
pub fn parse_address(address: &str) -> Result<Url, AddressError> {
    Url::parse(address).map_err(|e| AddressError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
