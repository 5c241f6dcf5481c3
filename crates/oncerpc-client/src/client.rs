//! The client runtime: pooled exchange, resend loop, availability probe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oncerpc_common::protocol::{Outcome, RequestId, Result, RpcError, ServiceDescriptor, WireRequest, WireResponse};
use oncerpc_common::transport::frame::{read_frame, write_frame};
use oncerpc_common::transport::JsonCodec;

use crate::config::ClientConfig;
use crate::pool::{ConnectionPool, PoolLimits, PooledConnection};
use crate::stub::ServiceStub;

/// Shared client runtime. Cheap to clone; all clones use one pool, one
/// config, and one set of pending delivery confirmations.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pool: ConnectionPool,
    config: ClientConfig,
    /// Reply ids received but not yet confirmed to each destination. Drained
    /// into the `acks` field of the next outbound call to that destination.
    pending_acks: Mutex<HashMap<String, Vec<RequestId>>>,
}

impl RpcClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        RpcClient {
            inner: Arc::new(ClientInner {
                pool: ConnectionPool::new(PoolLimits::new(), config.acquire_timeout),
                config,
                pending_acks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The pool, e.g. for reconfiguring its ceilings at runtime.
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Creates a stub for `descriptor` hosted at `addr`.
    pub fn stub(&self, descriptor: Arc<ServiceDescriptor>, addr: impl Into<String>) -> ServiceStub {
        ServiceStub::new(self.clone(), descriptor, addr.into())
    }

    /// Tests reachability of `addr` with the reserved no-op request.
    ///
    /// Uses the same pool and transport as ordinary calls but no request id
    /// and no server-side bookkeeping; any failure or timeout reads as
    /// unreachable.
    pub async fn probe(&self, addr: &str) -> bool {
        match self.probe_inner(addr).await {
            Ok(reachable) => reachable,
            Err(e) => {
                tracing::debug!(addr, error = %e, "probe failed");
                false
            }
        }
    }

    async fn probe_inner(&self, addr: &str) -> Result<bool> {
        let bytes = JsonCodec::encode_request(&WireRequest::Ping)?;
        let mut conn = self.inner.pool.acquire(addr).await?;

        let exchange = tokio::time::timeout(self.inner.config.call_timeout, async {
            write_frame(conn.stream_mut(), &bytes).await?;
            let Some(frame) = read_frame(conn.stream_mut()).await? else {
                return Err(RpcError::Transport("connection closed before pong".into()));
            };
            Ok(matches!(
                JsonCodec::decode_response(&frame)?,
                WireResponse::Pong
            ))
        })
        .await;

        match exchange {
            Ok(Ok(reachable)) => {
                self.inner.pool.release(conn);
                Ok(reachable)
            }
            Ok(Err(e)) => {
                self.inner.pool.discard(conn);
                Err(e)
            }
            Err(_) => {
                self.inner.pool.discard(conn);
                Ok(false)
            }
        }
    }

    /// Sends pre-encoded call bytes and returns the outcome for `id`,
    /// re-sending the identical bytes on transport failure.
    ///
    /// Exhausting the retry budget surfaces a transport fault. Encode/decode
    /// failures and pool-wait timeouts are terminal immediately: retrying
    /// cannot fix the former, and the latter is back-pressure, not a lost
    /// reply.
    pub(crate) async fn exchange(&self, addr: &str, bytes: &[u8], id: RequestId) -> Result<Outcome> {
        let retry = self.inner.config.retry;
        let mut backoff = retry.initial_backoff;
        let mut last_failure = RpcError::Transport("no send attempt was made".into());

        for attempt in 1..=retry.max_attempts {
            if attempt > 1 {
                tracing::debug!(
                    id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "resending request after transport failure"
                );
                tokio::time::sleep(backoff).await;
                backoff *= retry.backoff_multiplier;
            }

            let mut conn = match self.inner.pool.acquire(addr).await {
                Ok(conn) => conn,
                Err(e @ RpcError::PoolTimeout(_)) => return Err(e),
                Err(e) if e.is_retryable() => {
                    last_failure = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.attempt(&mut conn, bytes, id).await {
                Ok(outcome) => {
                    self.inner.pool.release(conn);
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() => {
                    self.inner.pool.discard(conn);
                    last_failure = e;
                }
                Err(e) => {
                    self.inner.pool.discard(conn);
                    return Err(e);
                }
            }
        }

        Err(RpcError::Transport(format!(
            "no reply for request {id} after {} attempts: {last_failure}",
            retry.max_attempts
        )))
    }

    /// One send/receive round over one connection, under the call timeout.
    async fn attempt(
        &self,
        conn: &mut PooledConnection,
        bytes: &[u8],
        id: RequestId,
    ) -> Result<Outcome> {
        let call_timeout = self.inner.config.call_timeout;

        let io = async {
            write_frame(conn.stream_mut(), bytes).await?;
            loop {
                let Some(frame) = read_frame(conn.stream_mut()).await? else {
                    return Err(RpcError::Transport("connection closed before reply".into()));
                };
                match JsonCodec::decode_response(&frame)? {
                    WireResponse::Reply { id: reply_id, outcome } if reply_id == id => {
                        return Ok(outcome)
                    }
                    WireResponse::Reply { id: 0, outcome } => {
                        // The server could not decode our frame; id 0 marks
                        // a reply to an unreadable request.
                        let message = match outcome {
                            Outcome::Fault(fault) => fault.message,
                            Outcome::Success(_) => {
                                "server rejected the request as undecodable".into()
                            }
                        };
                        return Err(RpcError::Decode(message));
                    }
                    WireResponse::Reply { id: reply_id, .. } => {
                        tracing::warn!(expected = id, received = reply_id, "ignoring mismatched reply id");
                    }
                    WireResponse::Pong => {}
                }
            }
        };

        tokio::time::timeout(call_timeout, io)
            .await
            .map_err(|_| RpcError::Timeout(call_timeout.as_millis() as u64))?
    }

    pub(crate) fn queue_ack(&self, addr: &str, id: RequestId) {
        self.inner
            .pending_acks
            .lock()
            .unwrap()
            .entry(addr.to_string())
            .or_default()
            .push(id);
    }

    pub(crate) fn drain_acks(&self, addr: &str) -> Vec<RequestId> {
        self.inner
            .pending_acks
            .lock()
            .unwrap()
            .get_mut(addr)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}
