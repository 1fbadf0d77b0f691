//! # Socket Client
//!
//! One TCP connection per call: connect, write the request envelope, read
//! the response envelope, close. The invocation key travels in the
//! `interface` query parameter of the request URL.
//!
//! An unusable URL is an `AddressError`; only I/O failures become 502
//! responses.

use std::time::Duration;

use polywire::ArgsBody;
use polywire::Headers;
use polywire::RequestEnvelope;
use polywire::StreamError;
use polywire::read_envelope;
use polywire::write_envelope;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::builder::INVOCATION_QUERY;
use crate::client::Client;
use crate::config::Options;
use crate::config::SocketClientConfig;
use crate::error::AddressError;
use crate::protocol::Protocol;
use crate::protocol::parse_address;
use crate::request::Request;
use crate::request::Response;

/// Client for `socket://` targets.
#[derive(Debug, Clone, Default)]
pub struct SocketClient {
    config: SocketClientConfig,
}

impl SocketClient {
    pub fn new(config: SocketClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SocketClientConfig {
        &self.config
    }

    /// The caller's options, unless they are the library defaults.
    fn effective(&self, options: &Options) -> Options {
        if options.is_default() { self.config.options } else { *options }
    }

    async fn call(&self, request: &Request, url: &Url, options: Options) -> Result<(Headers, Option<Vec<u8>>), String> {
        let host = url.host_str().unwrap_or_default();
        let port = url.port().unwrap_or(Protocol::Socket.default_port());
        let key = invocation_key(url);

        let args = match &request.body {
            Some(bytes) if !bytes.is_empty() => ArgsBody::from_bytes(bytes.clone()).map_err(|e| e.to_string())?,
            _ => ArgsBody::from_values(&[]).map_err(|e| e.to_string())?,
        };
        let envelope = RequestEnvelope::request(key, request.headers.clone(), args);

        let mut stream = within(options.connect_timeout, "connect", TcpStream::connect((host, port)))
            .await?
            .map_err(|e| format!("connect {host}:{port}: {e}"))?;
        debug!(host, port, key = %envelope.invocation_key, "socket call");

        let outcome = within(
            options.read_timeout,
            "read",
            exchange(&mut stream, &envelope, self.config.max_frame_len),
        )
        .await;
        let _ = stream.shutdown().await;
        drop(stream);

        let response = outcome?.map_err(|e| e.to_string())?;
        let result = response
            .result()
            .ok_or_else(|| "response envelope carries no result".to_string())?;
        Ok((response.headers.clone(), Some(result.as_bytes().to_vec())))
    }
}

async fn exchange(
    stream: &mut TcpStream,
    envelope: &RequestEnvelope,
    max_frame_len: usize,
) -> Result<RequestEnvelope, StreamError> {
    write_envelope(stream, envelope).await?;
    read_envelope(stream, max_frame_len).await
}

async fn within<F: Future>(limit: Duration, what: &str, fut: F) -> Result<F::Output, String> {
    timeout(limit, fut)
        .await
        .map_err(|_| format!("{what} timed out after {} ms", limit.as_millis()))
}

/// Parses the request URL. A URL without a host cannot be dialled.
fn target_url(address: &str) -> Result<Url, AddressError> {
    let url = parse_address(address)?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(AddressError::InvalidAddress { address: address.to_string(), reason: "no host".into() });
    }
    Ok(url)
}

/// The `interface` query value, or the path with `/` read as `.`.
fn invocation_key(url: &Url) -> String {
    url.query_pairs()
        .find(|(name, _)| name == INVOCATION_QUERY)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| url.path().trim_matches('/').replace('/', "."))
}

#[async_trait::async_trait]
impl Client for SocketClient {
    async fn execute(&self, request: Request, options: &Options) -> Result<Response, AddressError> {
        let url = target_url(&request.url)?;
        let options = self.effective(options);
        match self.call(&request, &url, options).await {
            Ok((headers, body)) => Ok(Response::ok(headers, body)),
            Err(reason) => {
                warn!(url = %request.url, %reason, "socket call failed");
                Ok(Response::failure(reason, request.headers))
            }
        }
    }
}
