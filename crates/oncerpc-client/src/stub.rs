//! Typed entry point for remote calls.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use oncerpc_common::protocol::{next_request_id, Outcome, Result, RpcError, ServiceDescriptor, WireRequest};
use oncerpc_common::transport::JsonCodec;

use crate::client::RpcClient;

/// A handle for invoking one service at one destination.
///
/// Stubs are cheap; create one per service/destination pair and clone at
/// will. Each call gets a fresh request id and an encoding that is fixed
/// before the first send, so every resend carries byte-identical data.
#[derive(Clone)]
pub struct ServiceStub {
    client: RpcClient,
    descriptor: Arc<ServiceDescriptor>,
    addr: String,
}

impl ServiceStub {
    pub(crate) fn new(client: RpcClient, descriptor: Arc<ServiceDescriptor>, addr: String) -> Self {
        ServiceStub {
            client,
            descriptor,
            addr,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Invokes `method` remotely and returns its result value.
    ///
    /// Arguments that cannot be serialized fail here, before any network
    /// traffic. A fault the method declares comes back as
    /// [`RpcError::Declared`] with its type and fields intact; anything else
    /// the server raised comes back as [`RpcError::Undeclared`].
    ///
    /// # Arguments
    ///
    /// * `method` - Name of the method to invoke, as declared in the
    ///   service descriptor
    /// * `args` - Call arguments, serialized to JSON before the first send
    ///
    /// # Returns
    ///
    /// The method's result value, or the fault/transport failure that ended
    /// the call.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use oncerpc_client::RpcClient;
    /// use oncerpc_common::protocol::ServiceDescriptor;
    ///
    /// # async fn run() -> oncerpc_common::protocol::Result<()> {
    /// let descriptor = ServiceDescriptor::new("Echo").method("echo").shared();
    /// let stub = RpcClient::new().stub(descriptor, "127.0.0.1:7870");
    ///
    /// let reply = stub.call("echo", "hello").await?;
    /// assert_eq!(reply, serde_json::json!("hello"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, method: &str, args: impl Serialize) -> Result<Value> {
        let args = JsonCodec::encode_args(&args)?;

        let id = next_request_id();
        let acks = self.client.drain_acks(&self.addr);
        let request = WireRequest::Call {
            id,
            service: self.descriptor.service.clone(),
            method: method.to_string(),
            args,
            acks,
        };
        let bytes = JsonCodec::encode_request(&request)?;

        tracing::debug!(id, service = %self.descriptor.service, method, "invoking remote method");
        let outcome = self.client.exchange(&self.addr, &bytes, id).await?;
        self.client.queue_ack(&self.addr, id);

        match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Fault(fault) if fault.is_declared() => Err(RpcError::Declared(fault)),
            Outcome::Fault(fault) => Err(RpcError::Undeclared(fault.to_string())),
        }
    }

    /// Like [`call`](Self::call), deserializing the result into `R`.
    pub async fn call_as<R: DeserializeOwned>(
        &self,
        method: &str,
        args: impl Serialize,
    ) -> Result<R> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::Decode(format!("failed to deserialize result of {method}: {e}")))
    }
}
