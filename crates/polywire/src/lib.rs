//! # Polywire
//!
//! The data model spoken between polyrpc clients and servers.
//!
//! ## Architecture
//!
//! - `Value` / `ValueType`: the dynamic shape of arguments and results.
//! - `Wire`: bridges concrete Rust types to that shape. Derive it with `#[derive(Wire)]`.
//! - `RequestEnvelope`: one per request, one per response, framed by polypack itself.
//!
//! Argument lists carry no per-argument type names. The receiver decodes them
//! positionally against the parameter types it registered, and a mismatch is
//! an error rather than a guess.

extern crate self as polywire;

pub mod error;
pub mod value;
pub mod codec;
pub mod wire;
pub mod headers;
pub mod envelope;
pub mod stream;

pub use error::Result;
pub use error::WireError;

pub use value::Value;
pub use value::ValueType;

pub use wire::Blob;
pub use wire::Wire;

pub use headers::Headers;

pub use envelope::ArgsBody;
pub use envelope::Body;
pub use envelope::Fault;
pub use envelope::FaultKind;
pub use envelope::RequestEnvelope;
pub use envelope::ResultBody;
pub use envelope::RPC_CALL_HEADER;

pub use stream::DEFAULT_MAX_FRAME_LEN;
pub use stream::StreamError;
pub use stream::read_envelope;
pub use stream::write_envelope;

#[cfg(feature = "derive")]
pub use polypack_derive::Wire;
