//! Client transports.
//!
//! A `Client` moves one `Request` to its target and returns the normalized
//! `Response`. Transport failures come back as 502 responses; only
//! addressing errors that no retry can fix are returned as `Err`.

pub mod socket;

use std::sync::Arc;

use crate::config::Options;
use crate::error::AddressError;
use crate::request::Request;
use crate::request::Response;

pub use socket::SocketClient;

#[async_trait::async_trait]
pub trait Client: Send + Sync + 'static {
    /// Sends the request and awaits its response.
    async fn execute(&self, request: Request, options: &Options) -> Result<Response, AddressError>;
}

#[async_trait::async_trait]
impl<C: Client + ?Sized> Client for Arc<C> {
    async fn execute(&self, request: Request, options: &Options) -> Result<Response, AddressError> {
        (**self).execute(request, options).await
    }
}
