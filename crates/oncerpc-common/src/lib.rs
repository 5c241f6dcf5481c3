//! oncerpc common types and transport plumbing.
//!
//! This crate holds everything both ends of a call agree on:
//!
//! - **Protocol layer**: request identities, the success/fault [`protocol::Outcome`]
//!   model, service descriptors, wire message enums, and the [`protocol::RpcError`]
//!   taxonomy.
//! - **Transport layer**: the JSON codec and the length-prefixed TCP framing
//!   (`[4-byte length, big-endian u32] + [JSON payload]`, 100 MB cap).
//!
//! The wire format assumes both ends run this runtime; there is no
//! cross-language compatibility story.

pub mod protocol;
pub mod transport;

pub use protocol::*;
