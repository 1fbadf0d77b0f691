use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use polyrpc::CallError;
use polyrpc::ClientContext;
use polyrpc::ClientFactory;
use polyrpc::ClientSpec;
use polyrpc::Controller;
use polyrpc::Invoker;
use polyrpc::MethodMetadata;
use polyrpc::MethodRegistry;
use polyrpc::OverflowPolicy;
use polyrpc::ParamBinding;
use polyrpc::Protocol;
use polyrpc::RpcController;
use polyrpc::Server;
use polyrpc::ServerSettings;
use polyrpc::SocketServer;
use polyrpc::StaticDiscovery;
use polyrpc::polywire::FaultKind;
use polyrpc::polywire::Value;
use polyrpc::polywire::Wire;
use polyrpc::polywire::values;
use polyrpc::server::RpcServerContext;
use polyrpc::server::socket::BUSY_READ_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Wire)]
struct Person {
    name: String,
    age: u32,
    email: Option<String>,
}

struct Echo {
    greeting: String,
}

impl Echo {
    fn greet(&self, name: String) -> Result<String, String> {
        Ok(format!("{}, {name}", self.greeting))
    }

    fn add(&self, a: i64, b: i64) -> Result<i64, String> {
        Ok(a + b)
    }

    fn birthday(&self, mut person: Person) -> Result<Person, String> {
        person.age += 1;
        Ok(person)
    }

    fn refuse(&self, reason: String) -> Result<(), String> {
        Err(format!("refused: {reason}"))
    }

    fn explode(&self) -> Result<(), String> {
        panic!("handler exploded")
    }

    fn slow(&self, millis: u64) -> Result<u64, String> {
        std::thread::sleep(Duration::from_millis(millis));
        Ok(millis)
    }
}

fn echo_controller() -> Box<dyn RpcController> {
    Box::new(
        Controller::new("EchoService", Echo { greeting: "Hello".into() })
            .method("greet", Echo::greet)
            .method("add", Echo::add)
            .method("birthday", Echo::birthday)
            .method("refuse", Echo::refuse)
            .method("explode", Echo::explode)
            .method("slow", Echo::slow),
    )
}

fn settings() -> ServerSettings {
    ServerSettings { socket_port: 0, ..ServerSettings::default() }
}

async fn start(context: Arc<RpcServerContext>, settings: ServerSettings) -> Result<(SocketServer, SocketAddr)> {
    let server = SocketServer::new(context, settings);
    let addr = server.start().await?;
    Ok((server, addr))
}

async fn echo_server(settings: ServerSettings) -> Result<(SocketServer, SocketAddr)> {
    let registry = MethodRegistry::build(&[echo_controller()])?;
    let context = registry.context(Protocol::Socket).ok_or_else(|| anyhow::anyhow!("no socket table"))?;
    start(context, settings).await
}

fn method(name: &str) -> polyrpc::metadata::MethodMetadataBuilder {
    MethodMetadata::builder("EchoService", name)
}

fn echo_spec() -> Result<ClientSpec> {
    Ok(ClientSpec::new("EchoService", "echo-service")
        .protocol(Protocol::Socket)
        .method(method("greet").param::<String>(ParamBinding::None).returns::<String>().build()?)
        .method(
            method("add")
                .param::<i64>(ParamBinding::None)
                .param::<i64>(ParamBinding::None)
                .returns::<i64>()
                .build()?,
        )
        .method(method("birthday").param::<Person>(ParamBinding::None).returns::<Person>().build()?)
        .method(method("refuse").param::<String>(ParamBinding::None).build()?)
        .method(method("explode").build()?)
        .method(method("slow").param::<u64>(ParamBinding::None).returns::<u64>().build()?)
        .method(method("missing").returns::<String>().build()?))
}

fn echo_client(addr: SocketAddr) -> Result<Arc<dyn Invoker>> {
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.register(
        "echo-service",
        Server::new("127.0.0.1", 8080).with_metadata("socket-port", addr.port().to_string()),
    );
    Ok(ClientFactory::new(ClientContext::new(discovery)).create(&echo_spec()?)?)
}

fn remote_fault(err: CallError) -> Result<polyrpc::polywire::Fault> {
    match err {
        CallError::Remote(fault) => Ok(fault),
        other => Err(anyhow::anyhow!("expected remote fault, got {other}")),
    }
}

// ============================================================================
//  CALLS
// ============================================================================

#[tokio::test]
async fn test_greet_through_load_balancer() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let reply: String = client.call("greet", values!["Ada".to_string()]).await?;
    assert_eq!(reply, "Hello, Ada");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_arguments_and_records() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let sum: i64 = client.call("add", values![40i64, 2i64]).await?;
    assert_eq!(sum, 42);

    let ada = Person { name: "Ada".into(), age: 36, email: None };
    let older: Person = client.call("birthday", values![ada.clone()]).await?;
    assert_eq!(older, Person { age: 37, ..ada });

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let calls = (0..16i64).map(|i| {
        let client = client.clone();
        async move { client.call::<i64>("add", values![i, i]).await }
    });
    let results = futures::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result?, 2 * i as i64);
    }

    server.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_methods_keep_their_results() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let tasks: Vec<_> = (0..32i64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    client.invoke("greet", values![format!("caller-{i}")]).await
                } else {
                    client.invoke("add", values![i, 1000i64]).await
                }
            })
        })
        .collect();

    for (i, task) in (0..32i64).zip(tasks) {
        let reply = task.await??;
        let expected =
            if i % 2 == 0 { Value::String(format!("Hello, caller-{i}")) } else { Value::I64(i + 1000) };
        assert_eq!(reply, expected, "call {i}");
    }

    server.stop().await?;
    Ok(())
}

// ============================================================================
//  FAULTS
// ============================================================================

#[tokio::test]
async fn test_unknown_method_is_a_fault() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let err = client.invoke("missing", vec![]).await.unwrap_err();
    let fault = remote_fault(err)?;
    assert_eq!(fault.kind, FaultKind::MethodNotFound);
    assert_eq!(fault.message, "Can not find EchoService.missing in the RPC method mapping!");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_registry_answers_method_not_found() -> Result<()> {
    let registry = MethodRegistry::build(&[])?;
    assert!(registry.is_empty());
    let (server, addr) = start(Arc::new(RpcServerContext::empty(Protocol::Socket)), settings()).await?;
    let client = echo_client(addr)?;

    let fault = remote_fault(client.invoke("greet", values!["Ada".to_string()]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::MethodNotFound);

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_handler_error_and_panic() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let client = echo_client(addr)?;

    let fault = remote_fault(client.invoke("refuse", values!["no".to_string()]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::InvocationFailed);
    assert_eq!(fault.message, "refused: no");

    let fault = remote_fault(client.invoke("explode", vec![]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::InvocationFailed);

    // The server keeps serving after a panic.
    let reply: String = client.call("greet", values!["again".to_string()]).await?;
    assert_eq!(reply, "Hello, again");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_mistyped_arguments_are_rejected() -> Result<()> {
    let (server, addr) = echo_server(settings()).await?;
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.register("echo-service", Server::new("127.0.0.1", 1).with_metadata("socket-port", addr.port().to_string()));
    let spec = ClientSpec::new("EchoService", "echo-service")
        .protocol(Protocol::Socket)
        .method(method("greet").param::<u32>(ParamBinding::None).returns::<String>().build()?);
    let client = ClientFactory::new(ClientContext::new(discovery)).create(&spec)?;

    let fault = remote_fault(client.invoke("greet", vec![Value::U32(7)]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::BadArguments);

    server.stop().await?;
    Ok(())
}

// ============================================================================
//  TRANSPORT FAILURES
// ============================================================================

#[tokio::test]
async fn test_no_server_available() -> Result<()> {
    let client = ClientFactory::new(ClientContext::new(Arc::new(StaticDiscovery::new())))
        .create(&ClientSpec::new("EchoService", "ghost-service").protocol(Protocol::Socket).method(
            method("greet").param::<String>(ParamBinding::None).returns::<String>().build()?,
        ))?;

    match client.invoke("greet", values!["Ada".to_string()]).await {
        Err(CallError::Status { status, reason, .. }) => {
            assert_eq!(status, 502);
            assert_eq!(reason, "Load balancer does not have available server for client: ghost-service");
        }
        other => panic!("expected 502, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_connection_refused_is_a_502() -> Result<()> {
    let free_port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0")?;
        probe.local_addr()?.port()
    };
    let client = echo_client(SocketAddr::from(([127, 0, 0, 1], free_port)))?;

    let err = client.invoke("greet", values!["Ada".to_string()]).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    Ok(())
}

#[tokio::test]
async fn test_reject_policy_answers_server_busy() -> Result<()> {
    let busy = ServerSettings { max_workers: 1, overflow: OverflowPolicy::Reject, ..settings() };
    let (server, addr) = echo_server(busy).await?;
    let client = echo_client(addr)?;

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<u64>("slow", values![400u64]).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fault = remote_fault(client.invoke("greet", values!["Ada".to_string()]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::ServerBusy);
    assert_eq!(slow.await??, 400);

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_busy_replies_are_capped() -> Result<()> {
    let busy = ServerSettings { max_workers: 1, overflow: OverflowPolicy::Reject, ..settings() };
    let (server, addr) = echo_server(busy).await?;
    let client = echo_client(addr)?;

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<u64>("slow", values![2000u64]).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A silent peer holds the only busy reply until its read gives up.
    let silent = tokio::net::TcpStream::connect(("127.0.0.1", addr.port())).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = client.invoke("greet", values!["Ada".to_string()]).await.unwrap_err();
    assert_eq!(err.status(), Some(502));

    tokio::time::sleep(BUSY_READ_TIMEOUT).await;
    let fault = remote_fault(client.invoke("greet", values!["Ada".to_string()]).await.unwrap_err())?;
    assert_eq!(fault.kind, FaultKind::ServerBusy);

    assert_eq!(slow.await??, 2000);
    drop(silent);
    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_block_policy_queues_connections() -> Result<()> {
    let queued = ServerSettings { max_workers: 1, overflow: OverflowPolicy::Block, ..settings() };
    let (server, addr) = echo_server(queued).await?;
    let client = echo_client(addr)?;

    let calls = (0..3u64).map(|i| {
        let client = client.clone();
        async move { client.call::<u64>("slow", values![50 + i]).await }
    });
    let results = futures::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result?, 50 + i as u64);
    }

    server.stop().await?;
    Ok(())
}
