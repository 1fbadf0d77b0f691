//! The set of protocol listeners of one process.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::config::ServerSettings;
use crate::error::ServerError;
use crate::protocol::Protocol;
use crate::server::registry::MethodRegistry;
use crate::server::socket::SocketServer;

/// A protocol listener with a start/stop lifecycle.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn start(&self) -> Result<SocketAddr, ServerError>;

    async fn stop(&self) -> Result<(), ServerError>;

    fn is_running(&self) -> bool;
}

#[async_trait::async_trait]
impl Listener for SocketServer {
    fn protocol(&self) -> Protocol {
        Protocol::Socket
    }

    async fn start(&self) -> Result<SocketAddr, ServerError> {
        SocketServer::start(self).await
    }

    async fn stop(&self) -> Result<(), ServerError> {
        SocketServer::stop(self).await
    }

    fn is_running(&self) -> bool {
        SocketServer::is_running(self)
    }
}

/// Starts and stops every listener together. One listener failing does
/// not stop the others.
#[derive(Default)]
pub struct ServerGroup {
    listeners: Vec<Arc<dyn Listener>>,
}

impl ServerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// One listener per protocol in the registry that has a transport.
    pub fn from_registry(registry: &MethodRegistry, settings: ServerSettings) -> Self {
        let mut group = Self::new();
        for protocol in registry.protocols() {
            match (protocol, registry.context(protocol)) {
                (Protocol::Socket, Some(context)) => {
                    group.add(Arc::new(SocketServer::new(context, settings.clone())));
                }
                (Protocol::Socket, None) => {}
                (other, _) => warn!(protocol = %other, "no server transport for protocol, methods not served"),
            }
        }
        group
    }

    pub fn add(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn listeners(&self) -> &[Arc<dyn Listener>] {
        &self.listeners
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn start_all(&self) -> Vec<(Protocol, Result<SocketAddr, ServerError>)> {
        let mut outcomes = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            let outcome = listener.start().await;
            match &outcome {
                Ok(addr) => info!(protocol = %listener.protocol(), %addr, "rpc listener started"),
                Err(e) => warn!(protocol = %listener.protocol(), "rpc listener failed to start: {e}"),
            }
            outcomes.push((listener.protocol(), outcome));
        }
        outcomes
    }

    pub async fn stop_all(&self) -> Vec<(Protocol, Result<(), ServerError>)> {
        let mut outcomes = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            let outcome = listener.stop().await;
            if let Err(e) = &outcome {
                warn!(protocol = %listener.protocol(), "rpc listener failed to stop: {e}");
            }
            outcomes.push((listener.protocol(), outcome));
        }
        outcomes
    }

    /// Whether any listener is running.
    pub fn is_running(&self) -> bool {
        self.listeners.iter().any(|l| l.is_running())
    }
}
