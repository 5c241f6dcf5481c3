//! Full client/server round trips over real TCP.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use oncerpc::client::RpcClient;
use oncerpc::common::protocol::{RpcError, ServiceDescriptor};
use oncerpc::server::{Dispatcher, LedgerConfig, MethodFault, RpcServer, Service, ServiceRegistry};

fn descriptor() -> Arc<ServiceDescriptor> {
    ServiceDescriptor::new("Echo")
        .method("echo")
        .method_with_faults("throw_expected", &["FakeFault"])
        .method("throw_unexpected")
        .shared()
}

struct TestServer {
    addr: String,
    echo_executions: Arc<AtomicUsize>,
}

async fn start_server() -> TestServer {
    let echo_executions = Arc::new(AtomicUsize::new(0));
    let counter = echo_executions.clone();

    let service = Service::new(descriptor())
        .handler("echo", move |args| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(args)
            }
        })
        .handler("throw_expected", |_| async move {
            Err(MethodFault::new("FakeFault", "expected failure").with_fields(json!({"code": 42})))
        })
        .handler("throw_unexpected", |_| async move {
            Err(MethodFault::new("SurpriseFault", "unexpected failure"))
        });

    let mut registry = ServiceRegistry::new();
    registry.register(service).unwrap();

    let server = RpcServer::bind("127.0.0.1:0", Dispatcher::new(registry, LedgerConfig::default()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());

    TestServer {
        addr,
        echo_executions,
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let server = start_server().await;
    let stub = RpcClient::new().stub(descriptor(), &server.addr);

    let reply: String = stub.call_as("echo", "hello, world").await.unwrap();
    assert_eq!(reply, "hello, world");
    assert_eq!(server.echo_executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declared_fault_arrives_verbatim_and_connection_survives() {
    let server = start_server().await;
    let stub = RpcClient::new().stub(descriptor(), &server.addr);

    let err = stub.call("throw_expected", json!(null)).await.unwrap_err();
    match err {
        RpcError::Declared(fault) => {
            assert_eq!(fault.type_name, "FakeFault");
            assert_eq!(fault.message, "expected failure");
            assert_eq!(fault.fields, json!({"code": 42}));
        }
        other => panic!("expected a declared fault, got {other:?}"),
    }

    // A fault reply is a normal reply; the same stub keeps working.
    let reply: i64 = stub.call_as("echo", 7).await.unwrap();
    assert_eq!(reply, 7);
}

#[tokio::test]
async fn undeclared_fault_is_wrapped_and_connection_survives() {
    let server = start_server().await;
    let stub = RpcClient::new().stub(descriptor(), &server.addr);

    let err = stub.call("throw_unexpected", json!(null)).await.unwrap_err();
    match err {
        RpcError::Undeclared(message) => {
            assert!(message.contains("SurpriseFault"), "{message}");
        }
        other => panic!("expected an undeclared fault, got {other:?}"),
    }

    let reply: i64 = stub.call_as("echo", 8).await.unwrap();
    assert_eq!(reply, 8);
}

#[tokio::test]
async fn unserializable_arguments_never_reach_the_server() {
    let server = start_server().await;
    let stub = RpcClient::new().stub(descriptor(), &server.addr);

    // Non-string map keys cannot become JSON object keys.
    let mut bad_args = HashMap::new();
    bad_args.insert((1u8, 2u8), "x");

    for _ in 0..50 {
        let err = stub.call("echo", &bad_args).await.unwrap_err();
        assert!(matches!(err, RpcError::Encode(_)), "got {err:?}");
    }
    assert_eq!(server.echo_executions.load(Ordering::SeqCst), 0);

    // The client is fully usable afterwards.
    let reply: String = stub.call_as("echo", "still alive").await.unwrap();
    assert_eq!(reply, "still alive");
    assert_eq!(server.echo_executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn probe_distinguishes_live_from_dead() {
    let server = start_server().await;
    let client = RpcClient::new();

    assert!(client.probe(&server.addr).await);
    assert_eq!(server.echo_executions.load(Ordering::SeqCst), 0);

    // Nothing listens here.
    assert!(!client.probe("127.0.0.1:1").await);
}

#[tokio::test]
async fn probe_works_against_an_empty_registry() {
    let server = RpcServer::bind(
        "127.0.0.1:0",
        Dispatcher::new(ServiceRegistry::new(), LedgerConfig::default()),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());

    assert!(RpcClient::new().probe(&addr).await);
}
