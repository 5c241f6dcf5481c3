//! Request dispatch: bytes in, bytes out, with at-most-once execution.

use std::sync::Arc;

use serde_json::Value;

use oncerpc_common::protocol::{FaultKind, Outcome, RemoteFault, RequestId, WireRequest, WireResponse};
use oncerpc_common::transport::JsonCodec;

use crate::ledger::{Admission, LedgerConfig, ResendLedger};
use crate::registry::ServiceRegistry;

/// Turns one inbound frame into one reply frame.
///
/// This is the seam a hosting container drives: it owns decode, the
/// availability probe, resend-ledger admission, handler invocation, and
/// fault classification. [`crate::RpcServer`] is the built-in TCP host
/// around it.
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    ledger: Arc<ResendLedger>,
}

impl Dispatcher {
    pub fn new(registry: ServiceRegistry, ledger_config: LedgerConfig) -> Self {
        Dispatcher {
            registry: Arc::new(registry),
            ledger: Arc::new(ResendLedger::new(ledger_config)),
        }
    }

    pub fn ledger(&self) -> &Arc<ResendLedger> {
        &self.ledger
    }

    /// Handles one request frame and returns the encoded reply.
    ///
    /// Malformed bytes are answered with a decode-fault reply (request id 0,
    /// since the id was unreadable) and nothing is executed. `Ping` is
    /// answered directly, touching neither the registry nor the ledger.
    pub async fn handle(&self, bytes: &[u8]) -> Vec<u8> {
        let request = match JsonCodec::decode_request(bytes) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting undecodable request frame");
                return encode_reply(
                    0,
                    Outcome::Fault(RemoteFault::undeclared("DecodeFault", e.to_string())),
                );
            }
        };

        match request {
            WireRequest::Ping => encode_response(&WireResponse::Pong),
            WireRequest::Call {
                id,
                service,
                method,
                args,
                acks,
            } => {
                self.ledger.confirm_delivered(&acks);
                let outcome = self.execute_at_most_once(id, &service, &method, args).await;
                encode_reply(id, outcome)
            }
        }
    }

    /// Serves one delivery of `id`, running the method body only if this is
    /// the first sighting; resends replay or wait, never re-execute.
    ///
    /// The handler runs on its own task: a panic is captured as an
    /// undeclared `HandlerPanicked` fault and completes the ticket, so the
    /// fault is cached and replayed like any other outcome.
    async fn execute_at_most_once(
        &self,
        id: RequestId,
        service: &str,
        method: &str,
        args: Value,
    ) -> Outcome {
        match self.ledger.admit(id) {
            Admission::Replay(outcome) => {
                tracing::debug!(id, "replaying cached outcome for resent request");
                outcome
            }
            Admission::Wait(rx) => {
                tracing::debug!(id, "resend racing an in-flight execution, waiting");
                ResendLedger::await_outcome(rx).await
            }
            Admission::Execute(ticket) => {
                let registry = self.registry.clone();
                let service = service.to_string();
                let method = method.to_string();
                let body =
                    tokio::spawn(async move { invoke(&registry, &service, &method, args).await });

                let outcome = match body.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(id, error = %e, "handler panicked");
                        Outcome::Fault(RemoteFault::undeclared(
                            "HandlerPanicked",
                            format!("handler for request {id} did not complete: {e}"),
                        ))
                    }
                };
                ticket.complete(outcome.clone());
                outcome
            }
        }
    }
}

/// Runs the handler and classifies whatever it raises.
///
/// A raised fault is declared iff its type name is in the invoked
/// method's contract; everything else (including an unknown method) is
/// undeclared.
async fn invoke(registry: &ServiceRegistry, service: &str, method: &str, args: Value) -> Outcome {
    let Some((spec, handler)) = registry.resolve(service, method) else {
        return Outcome::Fault(RemoteFault::undeclared(
            "MethodNotFound",
            format!("no handler registered for {service}.{method}"),
        ));
    };

    match handler.invoke(args).await {
        Ok(value) => Outcome::Success(value),
        Err(fault) => {
            let kind = if spec.declared_faults.iter().any(|t| t == &fault.type_name) {
                FaultKind::Declared
            } else {
                FaultKind::Undeclared
            };
            Outcome::Fault(RemoteFault {
                kind,
                type_name: fault.type_name,
                message: fault.message,
                fields: fault.fields,
            })
        }
    }
}

fn encode_reply(id: RequestId, outcome: Outcome) -> Vec<u8> {
    encode_response(&WireResponse::Reply { id, outcome })
}

fn encode_response(response: &WireResponse) -> Vec<u8> {
    match JsonCodec::encode_response(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Wire responses are plain data and always encode; an empty frame
            // is the least-bad answer if that ever stops holding.
            tracing::error!(error = %e, "failed to encode reply frame");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MethodFault, Service};
    use oncerpc_common::protocol::ServiceDescriptor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = executions.clone();

        let descriptor = ServiceDescriptor::new("Echo")
            .method("echo")
            .method_with_faults("throw_expected", &["FakeFault"])
            .method("throw_unexpected")
            .shared();

        let service = Service::new(descriptor)
            .handler("echo", move |args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(args)
                }
            })
            .handler("throw_expected", |_| async move {
                Err(MethodFault::new("FakeFault", "expected failure"))
            })
            .handler("throw_unexpected", |_| async move {
                Err(MethodFault::new("SurpriseFault", "unexpected failure"))
            });

        let mut registry = ServiceRegistry::new();
        registry.register(service).unwrap();
        (
            Dispatcher::new(registry, LedgerConfig::default()),
            executions,
        )
    }

    fn call_bytes(id: u64, method: &str, args: serde_json::Value, acks: Vec<u64>) -> Vec<u8> {
        JsonCodec::encode_request(&WireRequest::Call {
            id,
            service: "Echo".into(),
            method: method.into(),
            args,
            acks,
        })
        .unwrap()
    }

    fn decode(bytes: &[u8]) -> WireResponse {
        JsonCodec::decode_response(bytes).unwrap()
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (dispatcher, _) = test_dispatcher();

        let reply = dispatcher
            .handle(&call_bytes(1, "echo", json!("hello"), vec![]))
            .await;
        match decode(&reply) {
            WireResponse::Reply { id, outcome } => {
                assert_eq!(id, 1);
                assert_eq!(outcome, Outcome::Success(json!("hello")));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_deliveries_execute_once_and_replay() {
        let (dispatcher, executions) = test_dispatcher();
        let bytes = call_bytes(2, "echo", json!("again"), vec![]);

        let first = dispatcher.handle(&bytes).await;
        let second = dispatcher.handle(&bytes).await;
        let third = dispatcher.handle(&bytes).await;

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn declared_fault_keeps_its_type() {
        let (dispatcher, _) = test_dispatcher();

        let reply = dispatcher
            .handle(&call_bytes(3, "throw_expected", json!(null), vec![]))
            .await;
        match decode(&reply) {
            WireResponse::Reply {
                outcome: Outcome::Fault(fault),
                ..
            } => {
                assert_eq!(fault.kind, FaultKind::Declared);
                assert_eq!(fault.type_name, "FakeFault");
                assert_eq!(fault.message, "expected failure");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn undeclared_fault_is_tagged_undeclared() {
        let (dispatcher, _) = test_dispatcher();

        let reply = dispatcher
            .handle(&call_bytes(4, "throw_unexpected", json!(null), vec![]))
            .await;
        match decode(&reply) {
            WireResponse::Reply {
                outcome: Outcome::Fault(fault),
                ..
            } => {
                assert_eq!(fault.kind, FaultKind::Undeclared);
                assert_eq!(fault.type_name, "SurpriseFault");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_method_is_an_undeclared_fault() {
        let (dispatcher, executions) = test_dispatcher();

        let reply = dispatcher
            .handle(&call_bytes(5, "missing", json!(null), vec![]))
            .await;
        match decode(&reply) {
            WireResponse::Reply {
                outcome: Outcome::Fault(fault),
                ..
            } => {
                assert_eq!(fault.kind, FaultKind::Undeclared);
                assert_eq!(fault.type_name, "MethodNotFound");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn garbage_is_rejected_without_execution() {
        let (dispatcher, executions) = test_dispatcher();

        let reply = dispatcher.handle(b"definitely not json").await;
        match decode(&reply) {
            WireResponse::Reply {
                id,
                outcome: Outcome::Fault(fault),
            } => {
                assert_eq!(id, 0);
                assert_eq!(fault.type_name, "DecodeFault");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert!(dispatcher.ledger().is_empty());
    }

    #[tokio::test]
    async fn ping_answers_without_touching_ledger_or_registry() {
        let (dispatcher, executions) = test_dispatcher();

        let bytes = JsonCodec::encode_request(&WireRequest::Ping).unwrap();
        let reply = dispatcher.handle(&bytes).await;
        assert_eq!(decode(&reply), WireResponse::Pong);
        assert!(dispatcher.ledger().is_empty());
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_handler_is_cached_and_never_reexecuted() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = executions.clone();
        let service = Service::new(ServiceDescriptor::new("Echo").method("explode").shared())
            .handler("explode", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    panic!("handler blew up")
                }
            });
        let mut registry = ServiceRegistry::new();
        registry.register(service).unwrap();
        let dispatcher = Dispatcher::new(registry, LedgerConfig::default());

        let bytes = call_bytes(6, "explode", json!(null), vec![]);
        let first = dispatcher.handle(&bytes).await;
        let second = dispatcher.handle(&bytes).await;
        let third = dispatcher.handle(&bytes).await;

        // The body ran once; redeliveries replay the cached fault.
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second, third);

        match decode(&first) {
            WireResponse::Reply {
                id,
                outcome: Outcome::Fault(fault),
            } => {
                assert_eq!(id, 6);
                assert_eq!(fault.kind, FaultKind::Undeclared);
                assert_eq!(fault.type_name, "HandlerPanicked");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn piggybacked_acks_mark_records_delivered() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = executions.clone();
        let service = Service::new(ServiceDescriptor::new("Echo").method("echo").shared())
            .handler("echo", move |args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(args)
                }
            });
        let mut registry = ServiceRegistry::new();
        registry.register(service).unwrap();
        let dispatcher = Dispatcher::new(
            registry,
            LedgerConfig {
                delivered_grace: Duration::ZERO,
                max_age: Duration::from_secs(3600),
                sweep_interval: Duration::from_secs(5),
            },
        );

        dispatcher
            .handle(&call_bytes(10, "echo", json!("a"), vec![]))
            .await;
        assert_eq!(dispatcher.ledger().len(), 1);

        // The next call confirms receipt of reply 10; after the sweep only
        // the new record remains.
        dispatcher
            .handle(&call_bytes(11, "echo", json!("b"), vec![10]))
            .await;
        dispatcher.ledger().sweep();
        assert_eq!(dispatcher.ledger().len(), 1);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }
}
