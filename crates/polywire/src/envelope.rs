//! # Envelope
//!
//! The unit exchanged once per request and once per response on the socket
//! transport.
//!
//! ## Layout
//!
//! ```text
//! Variant "Envelope"
//!   Map
//!     "key"     -> String              invocation key
//!     "headers" -> Map<List<String>>   ordered header multimap
//!     "body"    -> Variant "args"   -> List   (positional arguments)
//!                | Variant "result" -> Ok(value) | Err(Variant kind -> String)
//! ```
//!
//! ## Invariants
//! - Bodies are stored pre-encoded. Arguments are decoded only once the
//!   receiver knows the parameter types; results once the caller knows the
//!   return type.
//! - Unknown map entries are skipped so either side can add fields later.

use std::fmt;

use polypack::Decoder;
use polypack::Encoder;
use polypack::Tag;

use crate::codec;
use crate::error::Result;
use crate::error::WireError;
use crate::headers::Headers;
use crate::value::Value;
use crate::value::ValueType;

/// Marks a response whose body must go through the RPC result decoder.
pub const RPC_CALL_HEADER: &str = "X-RPC-CALL";

const ENVELOPE: &str = "Envelope";

/// The positional argument list of a request, kept in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgsBody {
    raw: Vec<u8>,
}

impl ArgsBody {
    pub fn from_values(values: &[Value]) -> Result<Self> {
        Ok(Self { raw: codec::encode_values(values)? })
    }

    /// Wraps already-encoded bytes, checking they hold exactly one list.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let mut dec = Decoder::new(&raw);
        match dec.peek_tag()? {
            Tag::List => {}
            other => {
                return Err(WireError::ProtocolViolation(format!("args body must be a list, found {other:?}")));
            }
        }
        dec.skip()?;
        dec.finish()?;
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Number of positional arguments.
    pub fn len(&self) -> Result<usize> {
        let mut dec = Decoder::new(&self.raw);
        let mut count = 0;
        for item in dec.list()? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Decodes against the target method's parameter types.
    pub fn decode(&self, types: &[ValueType]) -> Result<Vec<Value>> {
        codec::decode_values(&mut Decoder::new(&self.raw), types)
    }

    /// Decodes without a schema.
    pub fn decode_any(&self) -> Result<Vec<Value>> {
        codec::decode_values_any(&mut Decoder::new(&self.raw))
    }
}

/// What went wrong on the serving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The invocation key is not in the method registry.
    MethodNotFound,
    /// The arguments did not decode against the method's parameter types.
    BadArguments,
    /// The handler itself failed or panicked.
    InvocationFailed,
    /// The server refused the connection because its worker pool was full.
    ServerBusy,
    /// The request envelope was malformed.
    ProtocolViolation,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::MethodNotFound => "method-not-found",
            FaultKind::BadArguments => "bad-arguments",
            FaultKind::InvocationFailed => "invocation-failed",
            FaultKind::ServerBusy => "server-busy",
            FaultKind::ProtocolViolation => "protocol-violation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "method-not-found" => Some(FaultKind::MethodNotFound),
            "bad-arguments" => Some(FaultKind::BadArguments),
            "invocation-failed" => Some(FaultKind::InvocationFailed),
            "server-busy" => Some(FaultKind::ServerBusy),
            "protocol-violation" => Some(FaultKind::ProtocolViolation),
            _ => None,
        }
    }
}

/// An application-level error carried inside a well-formed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn method_not_found(key: &str) -> Self {
        Self::new(FaultKind::MethodNotFound, format!("Can not find {key} in the RPC method mapping!"))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for Fault {}

/// The tagged outcome of a call, kept in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBody {
    raw: Vec<u8>,
}

impl ResultBody {
    pub fn ok(value: &Value) -> Result<Self> {
        let mut enc = Encoder::new();
        enc.ok_begin()?;
        codec::encode_value(&mut enc, value)?;
        enc.ok_end()?;
        Ok(Self { raw: enc.into_bytes()? })
    }

    pub fn fault(fault: &Fault) -> Result<Self> {
        let mut enc = Encoder::new();
        enc.err_begin()?;
        enc.variant_begin(fault.kind.as_str())?;
        enc.str(&fault.message)?;
        enc.variant_end()?;
        enc.err_end()?;
        Ok(Self { raw: enc.into_bytes()? })
    }

    /// Wraps already-encoded bytes, checking they hold exactly one result.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let mut dec = Decoder::new(&raw);
        let _ = dec.result()?;
        dec.finish()?;
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Decodes the success arm against the caller's return type.
    pub fn decode(&self, ty: &ValueType) -> Result<std::result::Result<Value, Fault>> {
        let mut dec = Decoder::new(&self.raw);
        match dec.result()? {
            Ok(mut ok) => Ok(Ok(codec::decode_value(&mut ok, ty)?)),
            Err(mut err) => Ok(Err(decode_fault(&mut err)?)),
        }
    }

    /// The fault, when this is an error result.
    pub fn as_fault(&self) -> Result<Option<Fault>> {
        let mut dec = Decoder::new(&self.raw);
        match dec.result()? {
            Ok(_) => Ok(None),
            Err(mut err) => Ok(Some(decode_fault(&mut err)?)),
        }
    }
}

fn decode_fault(dec: &mut Decoder) -> Result<Fault> {
    let (name, mut payload) = dec.variant()?;
    let kind = FaultKind::from_name(name)
        .ok_or_else(|| WireError::ProtocolViolation(format!("unknown fault kind `{name}`")))?;
    Ok(Fault::new(kind, payload.str()?))
}

/// Which body an envelope carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Args(ArgsBody),
    Result(ResultBody),
}

/// One request or response on the socket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub invocation_key: String,
    pub headers: Headers,
    pub body: Body,
}

impl RequestEnvelope {
    pub fn request(invocation_key: impl Into<String>, headers: Headers, args: ArgsBody) -> Self {
        Self { invocation_key: invocation_key.into(), headers, body: Body::Args(args) }
    }

    pub fn response(invocation_key: impl Into<String>, headers: Headers, result: ResultBody) -> Self {
        Self { invocation_key: invocation_key.into(), headers, body: Body::Result(result) }
    }

    pub fn args(&self) -> Option<&ArgsBody> {
        match &self.body {
            Body::Args(args) => Some(args),
            Body::Result(_) => None,
        }
    }

    pub fn result(&self) -> Option<&ResultBody> {
        match &self.body {
            Body::Result(result) => Some(result),
            Body::Args(_) => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        enc.variant_begin(ENVELOPE)?;
        enc.map_begin()?;

        enc.variant_begin("key")?;
        enc.str(&self.invocation_key)?;
        enc.variant_end()?;

        enc.variant_begin("headers")?;
        self.headers.encode(&mut enc)?;
        enc.variant_end()?;

        enc.variant_begin("body")?;
        match &self.body {
            Body::Args(args) => {
                enc.variant_begin("args")?;
                enc.raw(args.as_bytes())?;
            }
            Body::Result(result) => {
                enc.variant_begin("result")?;
                enc.raw(result.as_bytes())?;
            }
        }
        enc.variant_end()?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.variant_end()?;
        Ok(enc.into_bytes()?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let (name, mut inner) = dec.variant()?;
        if name != ENVELOPE {
            return Err(WireError::ProtocolViolation(format!("expected Envelope, found `{name}`")));
        }
        dec.finish()?;

        let mut key = None;
        let mut headers = Headers::new();
        let mut body = None;

        for entry in inner.map()? {
            let (field, mut val) = entry?;
            match field {
                "key" => key = Some(val.str()?.to_string()),
                "headers" => headers = Headers::decode(&mut val)?,
                "body" => {
                    let (kind, mut payload) = val.variant()?;
                    let raw = payload.item_bytes()?.to_vec();
                    body = Some(match kind {
                        "args" => Body::Args(ArgsBody::from_bytes(raw)?),
                        "result" => Body::Result(ResultBody::from_bytes(raw)?),
                        other => {
                            return Err(WireError::ProtocolViolation(format!("unknown body kind `{other}`")));
                        }
                    });
                }
                _ => val.skip()?,
            }
        }

        Ok(Self {
            invocation_key: key.ok_or_else(|| WireError::ProtocolViolation("envelope has no key".into()))?,
            headers,
            body: body.ok_or_else(|| WireError::ProtocolViolation("envelope has no body".into()))?,
        })
    }
}
