use std::sync::Arc;

use anyhow::Result;
use polyrpc::Controller;
use polyrpc::MethodRegistry;
use polyrpc::Protocol;
use polyrpc::RegistryError;
use polyrpc::RpcController;
use polyrpc::ServerError;
use polyrpc::ServerGroup;
use polyrpc::ServerSettings;
use polyrpc::SocketServer;
use polyrpc::server::Listener;
use polyrpc::server::RpcServerContext;

struct Clock;

impl Clock {
    fn now(&self) -> Result<u64, String> {
        Ok(1_700_000_000)
    }

    fn echo(&self, text: String) -> Result<String, String> {
        Ok(text)
    }
}

fn ephemeral() -> ServerSettings {
    ServerSettings { socket_port: 0, ..ServerSettings::default() }
}

// ============================================================================
//  REGISTRY
// ============================================================================

#[test]
fn test_registry_tables_per_protocol() -> Result<()> {
    let controllers: Vec<Box<dyn RpcController>> = vec![
        Box::new(Controller::new("Clock", Clock).method("now", Clock::now)),
        Box::new(
            Controller::new("Echo", Clock)
                .protocols([Protocol::Dubbo])
                .method("echo", Clock::echo)
                .method_with_protocols("now", [Protocol::Socket, Protocol::Dubbo], Clock::now),
        ),
    ];
    let registry = MethodRegistry::build(&controllers)?;

    let socket = registry.context(Protocol::Socket).expect("socket table");
    let mut keys: Vec<&str> = socket.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["Clock.now", "Echo.now"]);

    let dubbo = registry.context(Protocol::Dubbo).expect("dubbo table");
    assert_eq!(dubbo.len(), 2);
    assert!(dubbo.get("Echo.echo").is_some());
    assert!(registry.context(Protocol::Http).is_none());
    Ok(())
}

#[test]
fn test_registry_rejects_duplicates() {
    let controllers: Vec<Box<dyn RpcController>> = vec![
        Box::new(Controller::new("Clock", Clock).method("now", Clock::now)),
        Box::new(Controller::new("Clock", Clock).method("now", Clock::now)),
    ];
    let err = MethodRegistry::build(&controllers).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateMethod { protocol: Protocol::Socket, key: "Clock.now".into() });
}

// ============================================================================
//  GROUP LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_group_serves_only_socket_tables() -> Result<()> {
    let socket_only: Vec<Box<dyn RpcController>> =
        vec![Box::new(Controller::new("Clock", Clock).method("now", Clock::now))];
    let group = ServerGroup::from_registry(&MethodRegistry::build(&socket_only)?, ephemeral());
    assert_eq!(group.len(), 1);
    assert_eq!(group.listeners()[0].protocol(), Protocol::Socket);

    let dubbo_only: Vec<Box<dyn RpcController>> =
        vec![Box::new(Controller::new("Clock", Clock).protocols([Protocol::Dubbo]).method("now", Clock::now))];
    let group = ServerGroup::from_registry(&MethodRegistry::build(&dubbo_only)?, ephemeral());
    assert!(group.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_group_start_and_stop() -> Result<()> {
    let controllers: Vec<Box<dyn RpcController>> =
        vec![Box::new(Controller::new("Clock", Clock).method("now", Clock::now))];
    let group = ServerGroup::from_registry(&MethodRegistry::build(&controllers)?, ephemeral());
    assert!(!group.is_running());

    let started = group.start_all().await;
    assert_eq!(started.len(), 1);
    let addr = started[0].1.as_ref().map_err(|e| anyhow::anyhow!("{e}"))?.to_owned();
    assert!(group.is_running());

    // Starting again hands back the bound address.
    let again = group.listeners()[0].start().await?;
    assert_eq!(again, addr);

    for (_, outcome) in group.stop_all().await {
        outcome?;
    }
    assert!(!group.is_running());

    // Stopping twice is harmless; restarting is not allowed.
    group.listeners()[0].stop().await?;
    assert!(matches!(group.listeners()[0].start().await, Err(ServerError::Stopped)));
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_is_isolated() -> Result<()> {
    let taken = std::net::TcpListener::bind("0.0.0.0:0")?;
    let port = taken.local_addr()?.port();

    let context = Arc::new(RpcServerContext::empty(Protocol::Socket));
    let mut group = ServerGroup::new();
    group.add(Arc::new(SocketServer::new(
        context.clone(),
        ServerSettings { socket_port: port, ..ServerSettings::default() },
    )));
    group.add(Arc::new(SocketServer::new(context, ephemeral())));

    let outcomes = group.start_all().await;
    assert!(matches!(&outcomes[0].1, Err(ServerError::Bind { port: p, .. }) if *p == port));
    assert!(outcomes[1].1.is_ok());
    assert!(group.is_running());
    assert!(!group.listeners()[0].is_running());

    group.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn test_local_addr_follows_lifecycle() -> Result<()> {
    let server = SocketServer::new(Arc::new(RpcServerContext::empty(Protocol::Socket)), ephemeral());
    assert_eq!(server.local_addr().await, None);

    let addr = server.start().await?;
    assert_ne!(addr.port(), 0);
    assert_eq!(server.local_addr().await, Some(addr));

    server.stop().await?;
    assert_eq!(server.local_addr().await, None);
    assert!(!server.is_running());
    Ok(())
}
