//! Service identity shared between stub generation and dispatch.

use std::sync::Arc;

/// One method of a service contract: its name and the fault types it declares.
///
/// The dispatcher classifies a raised fault as declared iff its type name
/// appears in `declared_faults` for the invoked method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub declared_faults: Vec<String>,
}

/// Identity of a remote interface: service name plus method signatures.
///
/// Built once when a service is registered (or a stub generated), then shared
/// via [`Arc`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: String,
    pub methods: Vec<MethodSpec>,
}

impl ServiceDescriptor {
    pub fn new(service: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: service.into(),
            methods: Vec::new(),
        }
    }

    /// Adds a method without declared faults.
    pub fn method(self, name: impl Into<String>) -> Self {
        self.method_with_faults(name, &[])
    }

    /// Adds a method declaring the given fault type names.
    pub fn method_with_faults(mut self, name: impl Into<String>, faults: &[&str]) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            declared_faults: faults.iter().map(|f| (*f).to_string()).collect(),
        });
        self
    }

    pub fn spec(&self, method: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == method)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_method_name() {
        let descriptor = ServiceDescriptor::new("Echo")
            .method("echo")
            .method_with_faults("throw_expected", &["FakeFault"]);

        assert_eq!(descriptor.spec("echo").unwrap().declared_faults.len(), 0);
        assert_eq!(
            descriptor.spec("throw_expected").unwrap().declared_faults,
            vec!["FakeFault".to_string()]
        );
        assert!(descriptor.spec("missing").is_none());
    }
}
