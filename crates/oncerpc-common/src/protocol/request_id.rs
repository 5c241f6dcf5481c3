use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Identifier correlating a logical call across resend attempts.
///
/// A resend of the same logical call reuses the id; a new logical call always
/// gets a fresh one. The server keys its resend ledger on this value.
pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocates a process-unique request id.
///
/// Upper 32 bits come from the wall clock, lower 32 from an atomic counter,
/// so ids stay unique across restarts well beyond any ledger retention window.
pub fn next_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
