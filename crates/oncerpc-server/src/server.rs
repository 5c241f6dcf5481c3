//! Built-in TCP host around the dispatcher.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use oncerpc_common::protocol::{Result, RpcError};
use oncerpc_common::transport::frame::{read_frame, write_frame};

use crate::dispatcher::Dispatcher;

/// Accepts connections and drives the dispatcher, one task per connection.
///
/// Connections are keep-alive: each serves any number of request frames until
/// the peer closes. A periodic task sweeps the resend ledger at the interval
/// its config asks for.
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl RpcServer {
    /// Binds to `addr` (use port 0 for an ephemeral port).
    pub async fn bind(addr: &str, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Config(format!("failed to bind {addr}: {e}")))?;

        Ok(RpcServer {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Config(format!("failed to read local addr: {e}")))
    }

    /// Shared handle to the dispatcher, e.g. for in-process hosting or for
    /// inspecting the ledger in tests.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Serves until the listener fails. Run this on its own task.
    pub async fn run(self) -> Result<()> {
        let sweeper = {
            let dispatcher = self.dispatcher.clone();
            let interval = dispatcher.ledger().config().sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    dispatcher.ledger().sweep();
                }
            })
        };

        let result = self.accept_loop().await;
        sweeper.abort();
        result
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| RpcError::Transport(format!("accept failed: {e}")))?;
            tracing::debug!(%peer, "connection established");

            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                match handle_connection(stream, dispatcher).await {
                    Ok(()) => tracing::debug!(%peer, "connection closed"),
                    Err(e) => tracing::debug!(%peer, error = %e, "connection ended with error"),
                }
            });
        }
    }
}

async fn handle_connection(mut stream: TcpStream, dispatcher: Arc<Dispatcher>) -> Result<()> {
    loop {
        let Some(frame) = read_frame(&mut stream).await? else {
            return Ok(());
        };
        let reply = dispatcher.handle(&frame).await;
        write_frame(&mut stream, &reply).await?;
    }
}
