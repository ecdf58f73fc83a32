//! End-to-end calls against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port, then drives the
//! engine through `ServiceClient` and the bundled `UreqTransport` over real
//! HTTP. This checks that built requests are what the server expects and
//! that statuses, timeouts and cancellation surface as documented.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use declhttp::{
    AsyncHandle, ClientConfig, Error, HandleState, LogLevel, LoggingInterceptor, MethodDecl,
    ParamDecl, ServiceClient, ServiceDescriptor, TransportError, ValueKind,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Post {
    key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ServerTime {
    millis: u64,
}

#[derive(Debug, Deserialize)]
struct Upload {
    name: String,
    filename: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Echo {
    query: std::collections::BTreeMap<String, String>,
    headers: std::collections::BTreeMap<String, String>,
}

/// Start the mock server on a random port.
fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn lemon() -> ServiceDescriptor {
    ServiceDescriptor::builder("lemon")
        .base_path("lemon/")
        .method(MethodDecl::get("server_time", "getServerTime").header("X-Token:token123456"))
        .method(MethodDecl::get("server_time_anonymous", "getServerTime"))
        .method(
            MethodDecl::post("query", "post/query")
                .header("X-Token:token123456")
                .param(ParamDecl::field("type", ValueKind::String))
                .param(ParamDecl::field("page", ValueKind::Integer))
                .param(ParamDecl::field("pageSize", ValueKind::Integer)),
        )
        .method(MethodDecl::post("create", "post/body").param(ParamDecl::body()))
        .method(
            MethodDecl::get("get_post", "post/{key}")
                .param(ParamDecl::path("key", ValueKind::String)),
        )
        .method(
            MethodDecl::get("get_post_async", "post/{key}")
                .param(ParamDecl::path("key", ValueKind::String))
                .asynchronous(),
        )
        .method(
            MethodDecl::get("echo", "echo")
                .param(ParamDecl::query_map())
                .param(ParamDecl::header("X-Trace", ValueKind::String)),
        )
        .method(
            MethodDecl::post("upload", "upload")
                .multipart()
                .param(ParamDecl::part("title", ValueKind::String))
                .param(ParamDecl::part("file", ValueKind::Map)),
        )
        .method(MethodDecl::get("slow", "slow").param(ParamDecl::query("ms", ValueKind::Integer)))
        .method(
            MethodDecl::get("slow_async", "slow")
                .param(ParamDecl::query("ms", ValueKind::Integer))
                .asynchronous(),
        )
        .build()
}

fn client(addr: SocketAddr) -> ServiceClient {
    ServiceClient::builder()
        .config(ClientConfig::new(&format!("http://{addr}")))
        .interceptor(Arc::new(LoggingInterceptor::new(LogLevel::Body)))
        .build()
        .unwrap()
}

#[test]
fn form_query_round_trip() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let posts: Vec<Post> = service
        .call("query", &[json!("article"), json!(1), json!(20)])
        .unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| p.kind == "article"));

    // A null page is omitted and the server falls back to page 1.
    let paged: Vec<Post> = service
        .call("query", &[json!("article"), json!(null), json!(1)])
        .unwrap();
    assert_eq!(paged, posts[..1]);
}

#[test]
fn static_header_reaches_server() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let time: ServerTime = service.call("server_time", &[]).unwrap();
    assert!(time.millis > 0);

    let err = service.call::<ServerTime>("server_time_anonymous", &[]).unwrap_err();
    assert!(matches!(err, Error::HttpStatus(ref e) if e.status == 401));
}

#[test]
fn create_then_fetch_async() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let created: Post = service
        .call("create", &[json!({"type": "news", "title": "Fresh"})])
        .unwrap();
    assert_eq!(created.title, "Fresh");

    let handle: AsyncHandle<Post> = service
        .call_async("get_post_async", &[json!(created.key)])
        .unwrap();
    let (tx, rx) = mpsc::channel();
    handle.subscribe(move |outcome| tx.send(outcome).unwrap());
    let fetched = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(fetched, created);
    assert_eq!(handle.state(), HandleState::Delivered);
}

#[test]
fn missing_post_is_not_found_with_payload() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let err = service.call::<Post>("get_post", &[json!("missing")]).unwrap_err();
    match err {
        Error::HttpStatus(status) => {
            assert!(status.is_not_found());
            assert_eq!(status.body, b"no post `missing`");
        }
        other => panic!("expected HTTP status error, got {other:?}"),
    }
}

#[test]
fn query_map_header_and_user_agent_are_sent() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let echo: Echo = service
        .call("echo", &[json!({"q": "a b", "n": 1}), json!("trace-1")])
        .unwrap();
    assert_eq!(echo.query["q"], "a b");
    assert_eq!(echo.query["n"], "1");
    assert_eq!(echo.headers["x-trace"], "trace-1");
    assert!(echo.headers["user-agent"].starts_with("declhttp/"));
}

#[test]
fn multipart_upload_reaches_server() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let parts: Vec<Upload> = service
        .call(
            "upload",
            &[
                json!("Holiday"),
                json!({"filename": "notes.txt", "content_type": "text/plain", "content": "day one"}),
            ],
        )
        .unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "title");
    assert_eq!(parts[0].text, "Holiday");
    assert_eq!(parts[1].filename.as_deref(), Some("notes.txt"));
    assert_eq!(parts[1].text, "day one");
}

#[test]
fn sync_call_times_out() {
    let addr = start_server();
    let client = ServiceClient::builder()
        .config(
            ClientConfig::new(&format!("http://{addr}"))
                .with_timeout(Some(Duration::from_millis(200))),
        )
        .build()
        .unwrap();

    let err = client
        .call::<String>(&lemon(), "slow", &[json!(2_000)])
        .unwrap_err();
    assert!(
        matches!(err, Error::Transport(TransportError::Timeout(_))),
        "expected timeout, got {err:?}"
    );
}

#[test]
fn cancelled_async_call_never_delivers() {
    let addr = start_server();
    let service = client(addr).bind(&lemon()).unwrap();

    let handle: AsyncHandle<String> = service.call_async("slow_async", &[json!(300)]).unwrap();
    let delivered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&delivered);
    handle.subscribe(move |_| flag.store(true, Ordering::SeqCst));

    assert!(handle.cancel());
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(handle.state(), HandleState::Cancelled);
    assert!(!delivered.load(Ordering::SeqCst));
    assert_eq!(handle.wait(), Err(Error::Cancelled));
}

#[test]
fn unreachable_server_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let service = client(addr).bind(&lemon()).unwrap();
    let err = service.call::<Post>("get_post", &[json!("welcome")]).unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}
