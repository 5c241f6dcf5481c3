//! oncerpc: at-most-once request/response RPC over pooled TCP connections.
//!
//! A caller invokes methods on a remote service through a [`client::ServiceStub`];
//! the runtime handles wire encoding, connection pooling, and a resend protocol
//! that lets a lost reply be retried without ever executing the remote method
//! twice. See the member crates for the pieces:
//!
//! - [`common`]: protocol types, JSON codec, length-prefixed framing
//! - [`client`]: connection pool, stub invoker, availability probe
//! - [`server`]: service registry, resend ledger, dispatcher, TCP server

pub use oncerpc_client as client;
pub use oncerpc_common as common;
pub use oncerpc_server as server;
