use serde_json::json;

use super::*;

#[test]
fn call_frame_round_trip() {
    let request = WireRequest::Call {
        id: 42,
        service: "Echo".into(),
        method: "echo".into(),
        args: json!({"msg": "hello"}),
        acks: vec![7, 9],
    };

    let encoded = serde_json::to_vec(&request).unwrap();
    let decoded: WireRequest = serde_json::from_slice(&encoded).unwrap();
    assert_eq!(request, decoded);
}

#[test]
fn acks_are_optional_on_the_wire() {
    // A frame without acks decodes with an empty list, and serializing an
    // empty list omits the field entirely.
    let raw = r#"{"type":"call","id":1,"service":"S","method":"m","args":null}"#;
    let decoded: WireRequest = serde_json::from_str(raw).unwrap();
    match &decoded {
        WireRequest::Call { acks, .. } => assert!(acks.is_empty()),
        other => panic!("unexpected frame: {other:?}"),
    }

    let reencoded = serde_json::to_string(&decoded).unwrap();
    assert!(!reencoded.contains("acks"));
}

#[test]
fn outcome_preserves_fault_kind() {
    let declared = Outcome::Fault(RemoteFault::declared("FakeFault", "boom"));
    let undeclared = Outcome::Fault(RemoteFault::undeclared("PanicFault", "boom"));

    let declared_back: Outcome =
        serde_json::from_slice(&serde_json::to_vec(&declared).unwrap()).unwrap();
    let undeclared_back: Outcome =
        serde_json::from_slice(&serde_json::to_vec(&undeclared).unwrap()).unwrap();

    assert_eq!(declared, declared_back);
    assert_eq!(undeclared, undeclared_back);
    assert_ne!(declared_back, undeclared_back);
}

#[test]
fn fault_carries_structured_fields() {
    let fault = RemoteFault::declared("OrderRejected", "limit exceeded")
        .with_fields(json!({"order_id": 991, "limit": 5000}));

    let reply = WireResponse::Reply {
        id: 3,
        outcome: Outcome::Fault(fault.clone()),
    };
    let decoded: WireResponse =
        serde_json::from_slice(&serde_json::to_vec(&reply).unwrap()).unwrap();

    match decoded {
        WireResponse::Reply {
            outcome: Outcome::Fault(f),
            ..
        } => {
            assert_eq!(f, fault);
            assert_eq!(f.fields["order_id"], 991);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn ping_pong_frames() {
    let ping = serde_json::to_string(&WireRequest::Ping).unwrap();
    assert_eq!(ping, r#"{"type":"ping"}"#);

    let pong: WireResponse = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
    assert_eq!(pong, WireResponse::Pong);
}

#[test]
fn declared_fault_displays_type_and_message() {
    let fault = RemoteFault::declared("FakeFault", "expected failure");
    assert_eq!(fault.to_string(), "FakeFault: expected failure");

    let err = RpcError::Declared(fault);
    assert_eq!(err.to_string(), "FakeFault: expected failure");
}

#[test]
fn retryability_follows_the_taxonomy() {
    assert!(RpcError::Transport("reset".into()).is_retryable());
    assert!(RpcError::Timeout(100).is_retryable());
    assert!(!RpcError::Encode("bad".into()).is_retryable());
    assert!(!RpcError::Decode("bad".into()).is_retryable());
    assert!(!RpcError::Undeclared("bad".into()).is_retryable());
}
