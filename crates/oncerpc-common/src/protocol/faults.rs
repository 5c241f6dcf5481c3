//! Captured call outcomes and the fault model crossing the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Whether a fault is part of the method's declared contract.
///
/// Exception *types* cannot cross a process boundary, so the server tags each
/// fault before encoding it: `Declared` means the type name appears in the
/// method's contract and the caller gets it back verbatim; `Undeclared` means
/// anything else, which the caller receives as a generic runtime fault.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    Declared,
    Undeclared,
}

/// A fault captured on the server and reconstructed on the client.
///
/// Carries enough identity, `(kind, type_name, message, fields)`, for the
/// receiving side to rebuild the nearest matching fault locally. A declared
/// fault is never reported as undeclared or vice versa.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFault {
    pub kind: FaultKind,
    /// Declared-type name from the method contract, or whatever the
    /// application attached for an undeclared failure.
    pub type_name: String,
    pub message: String,
    /// Structured payload the application attached to the fault, `Null` if none.
    #[serde(default)]
    pub fields: Value,
}

impl RemoteFault {
    pub fn declared(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteFault {
            kind: FaultKind::Declared,
            type_name: type_name.into(),
            message: message.into(),
            fields: Value::Null,
        }
    }

    pub fn undeclared(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteFault {
            kind: FaultKind::Undeclared,
            type_name: type_name.into(),
            message: message.into(),
            fields: Value::Null,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_declared(&self) -> bool {
        self.kind == FaultKind::Declared
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Result of executing a method body: a value or a captured fault.
///
/// This is what the resend ledger caches; replaying a cached `Outcome` is
/// byte-for-byte identical to the original reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Fault(RemoteFault),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
