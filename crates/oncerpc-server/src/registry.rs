//! Service registration and the method-handler seam.
//!
//! Whatever generates stubs on the client side, the server only needs two
//! things from a service: its [`ServiceDescriptor`] and a handler per method.
//! [`ServiceRegistry::register`] checks the two against each other and builds
//! an immutable dispatch table, so per-call routing is a pair of map lookups
//! with no locking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use oncerpc_common::protocol::{MethodSpec, Result, RpcError, ServiceDescriptor};

/// A fault raised by application code.
///
/// Handlers raise faults by type name; whether that name is in the method's
/// declared contract, and therefore whether the caller sees it verbatim or
/// wrapped, is decided by the dispatcher, not the handler.
#[derive(Debug, Clone)]
pub struct MethodFault {
    pub type_name: String,
    pub message: String,
    pub fields: Value,
}

impl MethodFault {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        MethodFault {
            type_name: type_name.into(),
            message: message.into(),
            fields: Value::Null,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }
}

/// One bound method implementation.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn invoke(&self, args: Value) -> std::result::Result<Value, MethodFault>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = std::result::Result<Value, MethodFault>> + Send + 'static,
{
    async fn invoke(&self, args: Value) -> std::result::Result<Value, MethodFault> {
        (self.0)(args).await
    }
}

/// A descriptor paired with its method implementations, ready to register.
pub struct Service {
    descriptor: Arc<ServiceDescriptor>,
    handlers: HashMap<String, Box<dyn MethodHandler>>,
}

impl Service {
    pub fn new(descriptor: Arc<ServiceDescriptor>) -> Self {
        Service {
            descriptor,
            handlers: HashMap::new(),
        }
    }

    /// Binds an async closure as the implementation of `method`.
    pub fn handler<F, Fut>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, MethodFault>> + Send + 'static,
    {
        self.handlers.insert(method.into(), Box::new(FnHandler(f)));
        self
    }

    /// Binds a pre-boxed handler, for implementations that carry state.
    pub fn boxed_handler(mut self, method: impl Into<String>, h: Box<dyn MethodHandler>) -> Self {
        self.handlers.insert(method.into(), h);
        self
    }
}

struct RegisteredService {
    descriptor: Arc<ServiceDescriptor>,
    handlers: HashMap<String, Box<dyn MethodHandler>>,
}

/// Immutable routing table from `service.method` to handler.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, verifying descriptor and handlers line up.
    ///
    /// Every declared method needs a handler and every handler a declared
    /// method; a mismatch is a wiring mistake caught here, at startup, rather
    /// than at call time.
    ///
    /// # Arguments
    ///
    /// * `service` - A descriptor plus one handler per declared method
    ///
    /// # Returns
    ///
    /// `Ok(())` on success, or [`RpcError::Config`] when the service name is
    /// taken or descriptor and handlers do not match.
    ///
    /// # Example
    ///
    /// ```
    /// use oncerpc_common::protocol::ServiceDescriptor;
    /// use oncerpc_server::{Service, ServiceRegistry};
    ///
    /// # fn main() -> oncerpc_common::protocol::Result<()> {
    /// let descriptor = ServiceDescriptor::new("Echo").method("echo").shared();
    ///
    /// let mut registry = ServiceRegistry::new();
    /// registry.register(
    ///     Service::new(descriptor).handler("echo", |args| async move { Ok(args) }),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn register(&mut self, service: Service) -> Result<()> {
        let name = service.descriptor.service.clone();
        if self.services.contains_key(&name) {
            return Err(RpcError::Config(format!(
                "service '{name}' is already registered"
            )));
        }

        for spec in &service.descriptor.methods {
            if !service.handlers.contains_key(&spec.name) {
                return Err(RpcError::Config(format!(
                    "service '{name}' declares method '{}' but no handler was bound",
                    spec.name
                )));
            }
        }
        for method in service.handlers.keys() {
            if service.descriptor.spec(method).is_none() {
                return Err(RpcError::Config(format!(
                    "service '{name}' binds handler for '{method}' which the descriptor does not declare"
                )));
            }
        }

        self.services.insert(
            name,
            RegisteredService {
                descriptor: service.descriptor,
                handlers: service.handlers,
            },
        );
        Ok(())
    }

    /// Looks up the contract and implementation of one method.
    pub fn resolve(&self, service: &str, method: &str) -> Option<(&MethodSpec, &dyn MethodHandler)> {
        let registered = self.services.get(service)?;
        let spec = registered.descriptor.spec(method)?;
        let handler = registered.handlers.get(method)?;
        Some((spec, handler.as_ref()))
    }

    pub fn descriptor(&self, service: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.services.get(service).map(|s| &s.descriptor)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
