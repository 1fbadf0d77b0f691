//! Server side: controllers, the per-protocol method registry, and the
//! listeners that serve it.

pub mod group;
pub mod handler;
pub mod registry;
pub mod socket;

pub use group::Listener;
pub use group::ServerGroup;
pub use handler::Handler;
pub use handler::InvokeError;
pub use registry::Controller;
pub use registry::MethodHandlerDescriptor;
pub use registry::MethodRegistry;
pub use registry::RpcController;
pub use registry::RpcServerContext;
pub use socket::SocketServer;
