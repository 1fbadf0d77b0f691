//! # Body Codecs
//!
//! Encoders put call arguments into request bodies; decoders turn responses
//! back into values of the method's return type.
//!
//! Response routing:
//! - non-2xx goes to the `ErrorDecoder`
//! - a response carrying `X-RPC-CALL` goes to the RPC result decoder
//! - everything else goes to the plain body decoder

use std::sync::Arc;

use polywire::RPC_CALL_HEADER;
use polywire::ResultBody;
use polywire::Value;
use polywire::ValueType;
use url::form_urlencoded;

use crate::error::CallError;
use crate::error::EncodeError;
use crate::protocol::Protocol;
use crate::request::Response;
use crate::template::RequestTemplate;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Writes one argument into a request body.
pub trait BodyEncoder: Send + Sync {
    fn encode(&self, value: &Value, ty: &ValueType, template: &mut RequestTemplate) -> Result<(), EncodeError>;
}

/// Maps become url-encoded forms; strings and bytes are sent as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEncoder;

impl BodyEncoder for DefaultEncoder {
    fn encode(&self, value: &Value, ty: &ValueType, template: &mut RequestTemplate) -> Result<(), EncodeError> {
        match value {
            Value::Option(Some(inner)) => self.encode(inner, ty, template),
            Value::String(text) => {
                template.set_body(Some(text.clone().into_bytes()));
                Ok(())
            }
            Value::Bytes(bytes) => {
                template.set_body(Some(bytes.clone()));
                Ok(())
            }
            Value::Map(map) => {
                let mut form = form_urlencoded::Serializer::new(String::new());
                for (name, field) in map {
                    match field {
                        Value::List(items) => {
                            for item in items.iter().filter_map(Value::to_plain_string) {
                                form.append_pair(name, &item);
                            }
                        }
                        other => {
                            if let Some(text) = other.to_plain_string() {
                                form.append_pair(name, &text);
                            }
                        }
                    }
                }
                template.header(CONTENT_TYPE, [FORM_CONTENT_TYPE]);
                template.set_body(Some(form.finish().into_bytes()));
                Ok(())
            }
            _ => Err(EncodeError::Unsupported { type_name: ty.to_string() }),
        }
    }
}

/// Reads a successful plain response.
pub trait BodyDecoder: Send + Sync {
    fn decode(&self, response: Response, ty: &ValueType) -> Result<Value, CallError>;
}

/// Handles unit, text, bytes and optional forms of those.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecoder;

impl BodyDecoder for DefaultDecoder {
    fn decode(&self, response: Response, ty: &ValueType) -> Result<Value, CallError> {
        match ty {
            ValueType::Unit => Ok(Value::Unit),
            ValueType::Option(inner) => match response.body {
                None => Ok(Value::Option(None)),
                Some(_) => Ok(Value::Option(Some(Box::new(self.decode(response, inner)?)))),
            },
            ValueType::String => {
                let body = response.body.unwrap_or_default();
                String::from_utf8(body)
                    .map(Value::String)
                    .map_err(|e| CallError::Decode(format!("response body is not utf-8: {e}")))
            }
            ValueType::Bytes => Ok(Value::Bytes(response.body.unwrap_or_default())),
            ValueType::Any => match response.body {
                None => Ok(Value::Option(None)),
                Some(body) => match String::from_utf8(body) {
                    Ok(text) => Ok(Value::String(text)),
                    Err(e) => Ok(Value::Bytes(e.into_bytes())),
                },
            },
            other => Err(CallError::Decode(format!("{other} is not a type supported by this decoder"))),
        }
    }
}

/// Turns a non-2xx response into an error.
pub trait ErrorDecoder: Send + Sync {
    fn decode(&self, method_key: &str, response: &Response) -> CallError;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDecoder;

impl ErrorDecoder for DefaultErrorDecoder {
    fn decode(&self, method_key: &str, response: &Response) -> CallError {
        CallError::Status {
            method: method_key.to_string(),
            status: response.status,
            reason: response.reason.clone(),
        }
    }
}

/// Decodes the `ResultBody` of a response produced by an RPC transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcResultDecoder;

impl RpcResultDecoder {
    pub fn decode(&self, response: Response, ty: &ValueType) -> Result<Value, CallError> {
        let protocol = response.headers.first(RPC_CALL_HEADER).unwrap_or_default();
        if Protocol::from_name(protocol).is_none() {
            return Err(CallError::Decode(format!("unknown rpc protocol `{protocol}` in {RPC_CALL_HEADER}")));
        }
        let body = match response.body {
            Some(body) if !body.is_empty() => body,
            _ if *ty == ValueType::Unit => return Ok(Value::Unit),
            _ => return Ok(Value::Option(None)),
        };
        match ResultBody::from_bytes(body)?.decode(ty)? {
            Ok(value) => Ok(value),
            Err(fault) => Err(CallError::Remote(fault)),
        }
    }
}

/// Routes a response to the right decoder.
#[derive(Clone)]
pub struct ResponseDecoder {
    body: Arc<dyn BodyDecoder>,
    error: Arc<dyn ErrorDecoder>,
    rpc: RpcResultDecoder,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(Arc::new(DefaultDecoder), Arc::new(DefaultErrorDecoder))
    }
}

impl ResponseDecoder {
    pub fn new(body: Arc<dyn BodyDecoder>, error: Arc<dyn ErrorDecoder>) -> Self {
        Self { body, error, rpc: RpcResultDecoder }
    }

    pub fn decode(&self, method_key: &str, response: Response, ty: &ValueType) -> Result<Value, CallError> {
        if !response.is_success() {
            return Err(self.error.decode(method_key, &response));
        }
        if response.headers.contains(RPC_CALL_HEADER) {
            return self.rpc.decode(response, ty);
        }
        self.body.decode(response, ty)
    }
}
