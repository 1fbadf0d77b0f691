//! # Socket Server
//!
//! Accepts TCP connections and serves one request envelope per connection:
//! read, look up the invocation key, decode the arguments, invoke, write
//! the result envelope, close.
//!
//! ## Concurrency
//! - One accept task; each connection runs on its own task.
//! - At most `max_workers` connections are served at once. When all are
//!   busy, `Block` stops accepting until one frees up and `Reject` answers
//!   with a `ServerBusy` fault.
//! - Busy replies are capped at `max_workers` in flight and read the
//!   request for at most `BUSY_READ_TIMEOUT`; past the cap a connection
//!   is closed unanswered.
//! - Handlers run on the blocking pool; a panic becomes `InvocationFailed`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use polywire::Fault;
use polywire::FaultKind;
use polywire::Headers;
use polywire::RPC_CALL_HEADER;
use polywire::RequestEnvelope;
use polywire::ResultBody;
use polywire::StreamError;
use polywire::Value;
use polywire::WireError;
use polywire::read_envelope;
use polywire::write_envelope;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::OverflowPolicy;
use crate::config::ServerSettings;
use crate::error::ServerError;
use crate::protocol::Protocol;
use crate::server::handler::InvokeError;
use crate::server::registry::MethodHandlerDescriptor;
use crate::server::registry::RpcServerContext;

/// Longest a busy reply waits for the request it answers.
pub const BUSY_READ_TIMEOUT: Duration = Duration::from_secs(1);

enum State {
    Idle,
    Running {
        addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// The `socket` protocol listener.
pub struct SocketServer {
    context: Arc<RpcServerContext>,
    settings: ServerSettings,
    state: Mutex<State>,
    running: AtomicBool,
}

impl SocketServer {
    pub fn new(context: Arc<RpcServerContext>, settings: ServerSettings) -> Self {
        Self { context, settings, state: Mutex::new(State::Idle), running: AtomicBool::new(false) }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Running { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Binds and starts accepting. Starting a running server returns its
    /// address; a stopped server cannot be restarted.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Running { addr, .. } => return Ok(*addr),
            State::Stopped => return Err(ServerError::Stopped),
            State::Idle => {}
        }

        let port = self.settings.socket_port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.context.clone(),
            self.settings.clone(),
            shutdown_rx,
        ));

        info!(%addr, methods = self.context.len(), workers = self.settings.max_workers, "socket server started");
        *state = State::Running { addr, shutdown, task };
        self.running.store(true, Ordering::Release);
        Ok(addr)
    }

    /// Stops accepting and waits for the accept loop to exit. Connections
    /// already being served run to completion.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Stopped);
        self.running.store(false, Ordering::Release);
        if let State::Running { addr, shutdown, task } = previous {
            let _ = shutdown.send(true);
            if let Err(e) = task.await {
                error!(%addr, "socket accept loop panicked: {e}");
            }
            info!(%addr, "socket server stopped");
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<RpcServerContext>,
    settings: ServerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(settings.max_workers));
    let reject_permits = Arc::new(Semaphore::new(settings.max_workers.max(1)));
    let settings = Arc::new(settings);

    loop {
        let reserved = match settings.overflow {
            OverflowPolicy::Block => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                }
            }
            OverflowPolicy::Reject => None,
        };

        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            },
        };
        debug!(%peer, "accepted connection");

        let permit = match reserved {
            Some(permit) => permit,
            None => match permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    match reject_permits.clone().try_acquire_owned() {
                        Ok(busy) => {
                            warn!(%peer, "all workers busy, rejecting connection");
                            tokio::spawn(reject(stream, settings.clone(), busy));
                        }
                        Err(_) => warn!(%peer, "all workers and busy replies in use, closing connection"),
                    }
                    continue;
                }
            },
        };

        tokio::spawn(serve(stream, peer, context.clone(), settings.clone(), permit));
    }
}

async fn read_request(
    stream: &mut TcpStream,
    limit: Duration,
    max_frame_len: usize,
) -> Result<RequestEnvelope, StreamError> {
    match timeout(limit, read_envelope(stream, max_frame_len)).await {
        Ok(read) => read,
        Err(_) => Err(StreamError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "request read timed out",
        ))),
    }
}

async fn reply(stream: &mut TcpStream, response: Result<RequestEnvelope, WireError>) {
    match response {
        Ok(envelope) => {
            if let Err(e) = write_envelope(stream, &envelope).await {
                warn!("write response failed: {e}");
            }
        }
        Err(e) => error!("encode response failed: {e}"),
    }
    let _ = stream.shutdown().await;
}

async fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    context: Arc<RpcServerContext>,
    settings: Arc<ServerSettings>,
    _permit: OwnedSemaphorePermit,
) {
    let response = match read_request(&mut stream, settings.read_timeout, settings.max_frame_len).await {
        Ok(request) => dispatch(&context, request).await,
        Err(StreamError::Closed) => return,
        Err(StreamError::Io(e)) => {
            warn!(%peer, "read request failed: {e}");
            return;
        }
        Err(e) => {
            warn!(%peer, "malformed request: {e}");
            response_envelope(&context, String::new(), Err(Fault::new(FaultKind::ProtocolViolation, e.to_string())))
        }
    };
    reply(&mut stream, response).await;
}

async fn reject(mut stream: TcpStream, settings: Arc<ServerSettings>, _permit: OwnedSemaphorePermit) {
    let limit = settings.read_timeout.min(BUSY_READ_TIMEOUT);
    let key = match read_request(&mut stream, limit, settings.max_frame_len).await {
        Ok(request) => request.invocation_key,
        Err(_) => String::new(),
    };
    let mut headers = Headers::new();
    headers.set(RPC_CALL_HEADER, [Protocol::Socket.name()]);
    let fault = Fault::new(FaultKind::ServerBusy, "all workers are busy");
    let response = ResultBody::fault(&fault).map(|result| RequestEnvelope::response(key, headers, result));
    reply(&mut stream, response).await;
}

fn response_envelope(
    context: &RpcServerContext,
    key: String,
    outcome: Result<Value, Fault>,
) -> Result<RequestEnvelope, WireError> {
    let mut headers = Headers::new();
    headers.set(RPC_CALL_HEADER, [context.protocol().name()]);
    let result = match &outcome {
        Ok(value) => ResultBody::ok(value).or_else(|e| {
            ResultBody::fault(&Fault::new(FaultKind::InvocationFailed, format!("encode result: {e}")))
        })?,
        Err(fault) => ResultBody::fault(fault)?,
    };
    Ok(RequestEnvelope::response(key, headers, result))
}

/// Answers one request envelope.
pub async fn dispatch(context: &RpcServerContext, request: RequestEnvelope) -> Result<RequestEnvelope, WireError> {
    let key = request.invocation_key.clone();
    let outcome = match context.get(&key) {
        None => {
            warn!(%key, "no rpc method mapped");
            Err(Fault::method_not_found(&key))
        }
        Some(method) => invoke(method.clone(), &request).await,
    };
    if let Err(fault) = &outcome {
        debug!(%key, %fault, "rpc call failed");
    }
    response_envelope(context, key, outcome)
}

async fn invoke(method: MethodHandlerDescriptor, request: &RequestEnvelope) -> Result<Value, Fault> {
    let args = request
        .args()
        .ok_or_else(|| Fault::new(FaultKind::ProtocolViolation, "request envelope carries no arguments"))?;
    let values = args
        .decode(&method.param_types)
        .map_err(|e| Fault::new(FaultKind::BadArguments, e.to_string()))?;

    match tokio::task::spawn_blocking(move || method.invoke(values)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(InvokeError::BadArguments(msg))) => Err(Fault::new(FaultKind::BadArguments, msg)),
        Ok(Err(InvokeError::Failed(msg))) => Err(Fault::new(FaultKind::InvocationFailed, msg)),
        Err(e) if e.is_panic() => Err(Fault::new(FaultKind::InvocationFailed, "handler panicked")),
        Err(e) => Err(Fault::new(FaultKind::InvocationFailed, e.to_string())),
    }
}
