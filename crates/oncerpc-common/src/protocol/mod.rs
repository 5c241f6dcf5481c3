pub mod descriptor;
pub mod error;
pub mod faults;
pub mod request_id;
pub mod wire;

#[cfg(test)]
mod tests;

pub use descriptor::{MethodSpec, ServiceDescriptor};
pub use error::{Result, RpcError};
pub use faults::{FaultKind, Outcome, RemoteFault};
pub use request_id::{next_request_id, RequestId};
pub use wire::{WireRequest, WireResponse};
