//! JSON codec for wire messages.
//!
//! Encoding is split by direction so failures classify cleanly: anything that
//! fails while producing outbound bytes is an encode fault, anything that
//! fails while reading inbound bytes is a decode fault. Argument encoding
//! ([`JsonCodec::encode_args`]) runs before a connection is ever acquired, so
//! an unserializable payload can be retried arbitrarily often without leaking
//! pool capacity or reaching the server.

use serde::Serialize;
use serde_json::Value;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::wire::{WireRequest, WireResponse};

pub struct JsonCodec;

impl JsonCodec {
    /// Converts call arguments into their wire representation.
    ///
    /// This is the serialization boundary for application payloads; a type
    /// that cannot be represented (e.g. a map with non-string keys) fails
    /// here, with no network side effects.
    pub fn encode_args<T: Serialize>(args: &T) -> Result<Value> {
        serde_json::to_value(args).map_err(|e| RpcError::Encode(e.to_string()))
    }

    pub fn encode_request(request: &WireRequest) -> Result<Vec<u8>> {
        serde_json::to_vec(request).map_err(|e| RpcError::Encode(e.to_string()))
    }

    pub fn decode_request(data: &[u8]) -> Result<WireRequest> {
        serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))
    }

    pub fn encode_response(response: &WireResponse) -> Result<Vec<u8>> {
        serde_json::to_vec(response).map_err(|e| RpcError::Encode(e.to_string()))
    }

    pub fn decode_response(data: &[u8]) -> Result<WireResponse> {
        serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))
    }
}
