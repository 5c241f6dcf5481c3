//! Wire message enums.
//!
//! Outbound frames carry `{request id, method identity, argument payload}`
//! plus the piggybacked delivery confirmations; inbound frames carry
//! `{request id, outcome}`. `Ping`/`Pong` is the reserved availability probe:
//! the server answers it without touching application code or the resend
//! ledger.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::faults::Outcome;
use crate::protocol::request_id::RequestId;

/// A client-to-server frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireRequest {
    Call {
        id: RequestId,
        service: String,
        method: String,
        args: Value,
        /// Ids of replies this client has received since its last outbound
        /// frame to this destination. The server marks those ledger records
        /// delivered, which is what eventually lets it reclaim them.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        acks: Vec<RequestId>,
    },
    Ping,
}

/// A server-to-client frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireResponse {
    Reply { id: RequestId, outcome: Outcome },
    Pong,
}
