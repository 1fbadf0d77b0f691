//! Polyrpc Echo
//!
//! Serves an `EchoService` on the socket transport, calls it once through
//! the load-balanced client as a smoke check, then runs until Ctrl-C.
//!
//! Settings come from the `POLYRPC_*` environment variables.

use std::sync::Arc;

use anyhow::Result;
use polyrpc::ClientContext;
use polyrpc::ClientFactory;
use polyrpc::ClientSpec;
use polyrpc::Controller;
use polyrpc::MethodMetadata;
use polyrpc::MethodRegistry;
use polyrpc::ParamBinding;
use polyrpc::Protocol;
use polyrpc::RpcController;
use polyrpc::Server;
use polyrpc::ServerGroup;
use polyrpc::ServerSettings;
use polyrpc::StaticDiscovery;
use polyrpc::polywire::values;
use tracing::error;
use tracing::info;

struct Echo;

impl Echo {
    fn echo(&self, text: String) -> Result<String, String> {
        Ok(text)
    }

    fn shout(&self, text: String) -> Result<String, String> {
        if text.is_empty() {
            return Err("nothing to shout".into());
        }
        Ok(text.to_uppercase())
    }

    fn sum(&self, numbers: Vec<i64>) -> Result<i64, String> {
        numbers
            .into_iter()
            .try_fold(0i64, |acc, n| acc.checked_add(n))
            .ok_or_else(|| "sum overflows i64".to_string())
    }
}

fn echo_spec() -> Result<ClientSpec> {
    let method = |name: &str| MethodMetadata::builder("EchoService", name);
    Ok(ClientSpec::new("EchoService", "echo")
        .protocol(Protocol::Socket)
        .method(method("echo").param::<String>(ParamBinding::None).returns::<String>().build()?)
        .method(method("shout").param::<String>(ParamBinding::None).returns::<String>().build()?)
        .method(method("sum").param::<Vec<i64>>(ParamBinding::None).returns::<i64>().build()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("polyrpc=info".parse()?),
        )
        .init();

    let settings = ServerSettings::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        e
    })?;
    info!(
        port = settings.socket_port,
        workers = settings.max_workers,
        overflow = ?settings.overflow,
        "Configuration loaded"
    );

    let controllers: Vec<Box<dyn RpcController>> = vec![Box::new(
        Controller::new("EchoService", Echo)
            .method("echo", Echo::echo)
            .method("shout", Echo::shout)
            .method("sum", Echo::sum),
    )];
    let registry = MethodRegistry::build(&controllers)?;
    let group = ServerGroup::from_registry(&registry, settings);

    let mut bound = None;
    for (protocol, outcome) in group.start_all().await {
        let addr = outcome?;
        info!(%protocol, %addr, "listening");
        if protocol == Protocol::Socket {
            bound = Some(addr);
        }
    }

    if let Some(addr) = bound {
        let discovery = Arc::new(StaticDiscovery::new());
        discovery.register(
            "echo",
            Server::new("127.0.0.1", addr.port()).with_metadata("socket-port", addr.port().to_string()),
        );
        let client = ClientFactory::new(ClientContext::new(discovery)).create(&echo_spec()?)?;
        let reply: String = client.call("shout", values!["polyrpc is up".to_string()]).await?;
        let total: i64 = client.call("sum", values![vec![1i64, 2, 3]]).await?;
        info!(%reply, total, "smoke call succeeded");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    group.stop_all().await;
    info!("Shutdown complete");

    Ok(())
}
