//! Minimal end-to-end demo: an echo service, a server, and a stub call.
//!
//! Run with `cargo run -p oncerpc-server --example echo`.

use oncerpc_client::RpcClient;
use oncerpc_common::protocol::ServiceDescriptor;
use oncerpc_server::{Dispatcher, LedgerConfig, RpcServer, Service, ServiceRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let descriptor = ServiceDescriptor::new("echo").method("echo").shared();

    let mut registry = ServiceRegistry::new();
    registry.register(
        Service::new(descriptor.clone()).handler("echo", |args| async move { Ok(args) }),
    )?;

    let dispatcher = Dispatcher::new(registry, LedgerConfig::default());
    let server = RpcServer::bind("127.0.0.1:0", dispatcher).await?;
    let addr = server.local_addr()?.to_string();
    tokio::spawn(server.run());

    let client = RpcClient::new();
    tracing::info!(reachable = client.probe(&addr).await, %addr, "probed server");

    let stub = client.stub(descriptor, &addr);
    let reply: String = stub.call_as("echo", "hello, world").await?;
    tracing::info!(%reply, "echo returned");

    Ok(())
}
