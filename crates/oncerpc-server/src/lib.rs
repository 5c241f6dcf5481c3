//! oncerpc server side: service registration, at-most-once dispatch, TCP hosting.
//!
//! A server is assembled from three pieces:
//!
//! - [`ServiceRegistry`]: immutable dispatch tables built at registration time,
//!   mapping `service.method` to application handlers.
//! - [`ResendLedger`]: the record of executed requests that makes client
//!   resends safe: a request id is executed at most once, later deliveries
//!   replay the cached outcome.
//! - [`Dispatcher`]: the `handle(bytes) -> bytes` seam a hosting container
//!   drives; [`RpcServer`] is the built-in TCP host around it.

pub mod dispatcher;
pub mod ledger;
pub mod registry;
pub mod server;

pub use dispatcher::Dispatcher;
pub use ledger::{Admission, ExecutionTicket, LedgerConfig, ResendLedger};
pub use registry::{MethodFault, MethodHandler, Service, ServiceRegistry};
pub use server::RpcServer;
