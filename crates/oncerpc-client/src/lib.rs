//! oncerpc client side: pooled transport and the stub invoker.
//!
//! An [`RpcClient`] owns a bounded [`ConnectionPool`] and hands out
//! [`ServiceStub`]s. A stub call encodes once, sends over a pooled
//! connection, and on transport failure re-sends the identical bytes
//! under the same request id until the server answers or retries run out.
//! The server's resend ledger makes those re-sends safe for non-idempotent
//! methods; the caller only ever sees one returned value or one raised fault.

pub mod client;
pub mod config;
pub mod pool;
pub mod stub;

pub use client::RpcClient;
pub use config::{ClientConfig, RetryPolicy};
pub use pool::{ConnectionPool, PoolLimits, PooledConnection};
pub use stub::ServiceStub;
