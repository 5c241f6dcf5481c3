use thiserror::Error;

use crate::protocol::faults::RemoteFault;

/// Everything that can go wrong with a call, by retry policy.
///
/// `Encode` and `Decode` are local and terminal for the attempt: nothing was
/// (or can be) executed remotely, and retrying cannot help. `Transport` is
/// retried transparently by the resend loop and only surfaces once retries
/// are exhausted. `Declared`/`Undeclared` represent a completed execution and
/// are never retried; the resend ledger, not a retry, is what protects
/// against duplicate side effects.
#[derive(Error, Debug)]
pub enum RpcError {
    /// An argument or result could not be serialized. Raised before anything
    /// touches the network; the remote method is never invoked.
    #[error("encode failure: {0}")]
    Encode(String),

    /// Malformed inbound bytes, rejected before dispatch.
    #[error("decode failure: {0}")]
    Decode(String),

    /// A fault in the method's declared contract, reconstructed verbatim.
    #[error("{0}")]
    Declared(RemoteFault),

    /// Any other application-side failure, wrapped generically so callers
    /// never have to match types they didn't declare.
    #[error("remote call failed: {0}")]
    Undeclared(String),

    /// Connection-level failure; already retried by the resend loop.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No pooled connection became available within the bounded wait.
    #[error("no pooled connection available within {0}ms")]
    PoolTimeout(u64),

    /// The per-attempt reply deadline elapsed.
    #[error("call timed out after {0}ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local setup mistake (registration mismatch, bad bind address).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether the resend loop may retry after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
