use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use polyrpc::AddressError;
use polyrpc::CallError;
use polyrpc::Client;
use polyrpc::ClientContext;
use polyrpc::ClientFactory;
use polyrpc::ClientSpec;
use polyrpc::FactoryError;
use polyrpc::HttpMethod;
use polyrpc::MethodMetadata;
use polyrpc::Options;
use polyrpc::ParamBinding;
use polyrpc::Protocol;
use polyrpc::Request;
use polyrpc::Response;
use polyrpc::RetryPolicy;
use polyrpc::Server;
use polyrpc::StaticDiscovery;
use polyrpc::factory::Fallback;
use polyrpc::factory::FallbackTargeter;
use polyrpc::polywire::Headers;
use polyrpc::polywire::Value;
use polyrpc::polywire::values;

/// Records every request and answers from a queue, `200 "ok"` once empty.
#[derive(Default)]
struct Recorder {
    requests: Mutex<Vec<(Request, Options)>>,
    replies: Mutex<VecDeque<Response>>,
}

impl Recorder {
    fn replying(replies: impl IntoIterator<Item = Response>) -> Arc<Self> {
        Arc::new(Self { requests: Mutex::default(), replies: Mutex::new(replies.into_iter().collect()) })
    }

    fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(r, _)| r.url.clone()).collect()
    }

    fn last(&self) -> (Request, Options) {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

#[async_trait::async_trait]
impl Client for Recorder {
    async fn execute(&self, request: Request, options: &Options) -> Result<Response, AddressError> {
        self.requests.lock().unwrap().push((request, *options));
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| text(200, "ok")))
    }
}

fn text(status: u16, body: &str) -> Response {
    Response { status, reason: String::new(), headers: Headers::new(), body: Some(body.as_bytes().to_vec()) }
}

fn user_api() -> Result<Vec<MethodMetadata>> {
    Ok(vec![
        MethodMetadata::builder("UserApi", "find")
            .get("/users/{id}")
            .param::<u64>(ParamBinding::Path("id".into()))
            .param::<Option<String>>(ParamBinding::Query("expand".into()))
            .param::<String>(ParamBinding::Header("X-Trace".into()))
            .returns::<String>()
            .build()?,
        MethodMetadata::builder("UserApi", "rename")
            .post("/users/{id}/name")
            .param::<u64>(ParamBinding::Path("id".into()))
            .param::<String>(ParamBinding::Body)
            .returns::<String>()
            .build()?,
    ])
}

fn http_factory(recorder: Arc<Recorder>, discovery: Arc<StaticDiscovery>) -> ClientFactory {
    ClientFactory::new(ClientContext::new(discovery).with_http(recorder))
}

// ============================================================================
//  DIRECT URLS
// ============================================================================

#[tokio::test]
async fn test_direct_url_expands_path_query_and_headers() -> Result<()> {
    let recorder = Recorder::replying([text(200, "Ada")]);
    let mut spec = ClientSpec::new("UserApi", "users").url("localhost:8080").path("api/");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder.clone(), Arc::new(StaticDiscovery::new())).create(&spec)?;

    let name: String = client
        .call("find", values![7u64, Some("roles".to_string()), "t-1".to_string()])
        .await?;
    assert_eq!(name, "Ada");

    let (request, options) = recorder.last();
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.url, "http://localhost:8080/api/users/7?expand=roles");
    assert_eq!(request.headers.first("X-Trace"), Some("t-1"));
    assert!(options.is_default());
    Ok(())
}

#[tokio::test]
async fn test_absent_query_value_is_dropped() -> Result<()> {
    let recorder = Recorder::replying([]);
    let mut spec = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder.clone(), Arc::new(StaticDiscovery::new())).create(&spec)?;

    client.invoke("find", vec![Value::U64(7), Value::Option(None), Value::String("t".into())]).await?;
    assert_eq!(recorder.urls(), vec!["http://localhost:8080/users/7".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_body_parameter_is_sent_as_text() -> Result<()> {
    let recorder = Recorder::replying([]);
    let mut spec = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder.clone(), Arc::new(StaticDiscovery::new())).create(&spec)?;

    let reply: String = client.call("rename", values![7u64, "Grace".to_string()]).await?;
    assert_eq!(reply, "ok");

    let (request, _) = recorder.last();
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "http://localhost:8080/users/7/name");
    assert_eq!(request.body.as_deref(), Some(b"Grace".as_slice()));
    Ok(())
}

#[tokio::test]
async fn test_error_status_becomes_call_error() -> Result<()> {
    let mut not_found = text(404, "missing");
    not_found.reason = "Not Found".into();
    let recorder = Recorder::replying([not_found]);
    let mut spec = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder, Arc::new(StaticDiscovery::new())).create(&spec)?;

    match client.invoke("find", values![1u64, None::<String>, "t".to_string()]).await {
        Err(CallError::Status { method, status, reason }) => {
            assert_eq!(method, "UserApi#find(u64,option<string>,string)");
            assert_eq!(status, 404);
            assert_eq!(reason, "Not Found");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_undeclared_method_is_refused() -> Result<()> {
    let recorder = Recorder::replying([]);
    let spec = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    let client = http_factory(recorder.clone(), Arc::new(StaticDiscovery::new())).create(&spec)?;

    let err = client.invoke("delete", vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::UnknownMethod(name) if name == "delete"));
    assert!(recorder.urls().is_empty());
    Ok(())
}

// ============================================================================
//  LOAD BALANCING
// ============================================================================

#[tokio::test]
async fn test_balanced_http_call_rewrites_to_server() -> Result<()> {
    let recorder = Recorder::replying([]);
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.register("users", Server::new("10.0.0.1", 8081));
    discovery.register("users", Server::new("10.0.0.2", 8082));

    let mut spec = ClientSpec::new("UserApi", "users");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder.clone(), discovery).create(&spec)?;

    for id in [1u64, 2] {
        client.invoke("find", values![id, None::<String>, "t".to_string()]).await?;
    }
    assert_eq!(
        recorder.urls(),
        vec!["http://10.0.0.1:8081/users/1".to_string(), "http://10.0.0.2:8082/users/2".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_discovery_options_replace_defaults() -> Result<()> {
    let recorder = Recorder::replying([]);
    let discovery = Arc::new(StaticDiscovery::new());
    let tuned = Options::new(Duration::from_millis(250), Duration::from_secs(2));
    discovery.register("users", Server::new("10.0.0.1", 8081));
    discovery.set_options("USERS", tuned);

    let mut spec = ClientSpec::new("UserApi", "users");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder.clone(), discovery).create(&spec)?;
    client.invoke("find", values![1u64, None::<String>, "t".to_string()]).await?;

    let (_, options) = recorder.last();
    assert_eq!(options, tuned);
    Ok(())
}

#[tokio::test]
async fn test_retry_moves_to_next_server() -> Result<()> {
    let recorder = Recorder::replying([Response::failure("connection refused", Headers::new())]);
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.register("users", Server::new("10.0.0.1", 8081));
    discovery.register("users", Server::new("10.0.0.2", 8082));

    let mut spec = ClientSpec::new("UserApi", "users");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let factory = ClientFactory::new(
        ClientContext::new(discovery).with_http(recorder.clone()).with_retry(RetryPolicy::next_server(1)),
    );
    let client = factory.create(&spec)?;

    let body: String = client.call("find", values![3u64, None::<String>, "t".to_string()]).await?;
    assert_eq!(body, "ok");
    assert_eq!(
        recorder.urls(),
        vec!["http://10.0.0.1:8081/users/3".to_string(), "http://10.0.0.2:8082/users/3".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_post_is_not_retried_by_default_policy() -> Result<()> {
    let recorder = Recorder::replying([Response::failure("connection refused", Headers::new())]);
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.register("users", Server::new("10.0.0.1", 8081));
    discovery.register("users", Server::new("10.0.0.2", 8082));

    let mut spec = ClientSpec::new("UserApi", "users");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let factory = ClientFactory::new(
        ClientContext::new(discovery).with_http(recorder.clone()).with_retry(RetryPolicy::next_server(1)),
    );
    let client = factory.create(&spec)?;

    let err = client.invoke("rename", values![3u64, "x".to_string()]).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(recorder.urls().len(), 1);
    Ok(())
}

// ============================================================================
//  FACTORY
// ============================================================================

#[test]
fn test_protocols_without_transport_are_refused() -> Result<()> {
    let factory = ClientFactory::new(ClientContext::new(Arc::new(StaticDiscovery::new())));

    let dubbo = ClientSpec::new("UserApi", "users").protocol(Protocol::Dubbo);
    assert!(matches!(factory.create(&dubbo), Err(FactoryError::NoClient(Protocol::Dubbo))));

    let http = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    assert!(matches!(factory.create(&http), Err(FactoryError::NoClient(Protocol::Http))));

    let nameless = ClientSpec::new("UserApi", " ");
    assert!(matches!(factory.create(&nameless), Err(FactoryError::Address(_))));
    Ok(())
}

#[test]
fn test_unparseable_targets_fail_at_creation() -> Result<()> {
    let factory = ClientFactory::new(ClientContext::new(Arc::new(StaticDiscovery::new())));

    let spaced = ClientSpec::new("EchoService", "echo").protocol(Protocol::Socket).url("socket://bad host:1");
    assert!(matches!(
        factory.create(&spaced),
        Err(FactoryError::Address(AddressError::InvalidAddress { address, .. })) if address == "socket://bad host:1"
    ));

    let overflow = ClientSpec::new("EchoService", "echo").protocol(Protocol::Socket).url("socket://localhost:99999");
    assert!(matches!(factory.create(&overflow), Err(FactoryError::Address(AddressError::InvalidAddress { .. }))));
    Ok(())
}

struct Cached;

#[async_trait::async_trait]
impl Fallback for Cached {
    async fn fallback(&self, method: &str, _args: Vec<Value>, cause: CallError) -> Result<Value, CallError> {
        match cause.status() {
            Some(status) if status >= 500 => Ok(Value::String(format!("cached {method}"))),
            _ => Err(cause),
        }
    }
}

#[tokio::test]
async fn test_fallback_answers_failed_calls() -> Result<()> {
    let recorder = Recorder::replying([text(503, "down"), text(400, "bad")]);
    let mut spec = ClientSpec::new("UserApi", "users").url("http://localhost:8080");
    for method in user_api()? {
        spec = spec.method(method);
    }
    let client = http_factory(recorder, Arc::new(StaticDiscovery::new()))
        .with_targeter(Arc::new(FallbackTargeter::new(Arc::new(Cached))))
        .create(&spec)?;

    let reply: String = client.call("find", values![1u64, None::<String>, "t".to_string()]).await?;
    assert_eq!(reply, "cached find");

    let err = client.invoke("find", values![1u64, None::<String>, "t".to_string()]).await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    assert_eq!(client.target().to_string(), "Target(type=UserApi, name=users, url=http://localhost:8080)");
    Ok(())
}
