//! The resend ledger: at-most-once execution bookkeeping.
//!
//! The client may deliver the same request id any number of times (resends
//! after a lost reply). Per id the server walks
//! `Unseen -> Executing -> Completed(delivered=false) ->
//! Completed(delivered=true) -> Reclaimed`:
//!
//! - the first delivery wins an [`ExecutionTicket`] and runs the method body,
//! - a delivery racing the original waits on the ticket's completion,
//! - a delivery after completion replays the cached outcome verbatim.
//!
//! Records are reclaimed once the client has confirmed receipt of the reply
//! (via acks piggybacked on later traffic) plus a grace period. A record that
//! is never confirmed is held until [`LedgerConfig::max_age`] and then
//! reclaimed anyway; a resend arriving after that point would re-execute.
//! That residual window is an accepted bound, not eliminated; shrinking it
//! is a memory/correctness trade the deployment makes through `max_age`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use oncerpc_common::protocol::{Outcome, RemoteFault, RequestId};

/// Retention policy for completed records.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// How long a record is kept after its delivery was confirmed.
    pub delivered_grace: Duration,
    /// Absolute retention bound for records that were never confirmed.
    pub max_age: Duration,
    /// How often the hosting server sweeps the ledger.
    pub sweep_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            delivered_grace: Duration::from_secs(30),
            max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

struct AckRecord {
    outcome: Outcome,
    created: Instant,
    delivered_at: Option<Instant>,
}

enum Slot {
    /// The method body is running; waiters subscribe to the receiver.
    Executing(watch::Receiver<Option<Outcome>>),
    Completed(AckRecord),
}

struct LedgerInner {
    slots: Mutex<HashMap<RequestId, Slot>>,
    config: LedgerConfig,
}

/// How an incoming request id is to be served.
pub enum Admission {
    /// First sighting: run the method, then complete the ticket.
    Execute(ExecutionTicket),
    /// Already completed: reply with the cached outcome, do not re-run.
    Replay(Outcome),
    /// Racing an in-flight original: wait via [`ResendLedger::await_outcome`].
    Wait(watch::Receiver<Option<Outcome>>),
}

/// Exclusive right to execute one request id.
///
/// Must be resolved with [`ExecutionTicket::complete`]; if it is dropped
/// instead (handler future abandoned), the slot is vacated so a later
/// delivery can execute.
pub struct ExecutionTicket {
    id: RequestId,
    tx: watch::Sender<Option<Outcome>>,
    inner: Weak<LedgerInner>,
    completed: bool,
}

impl ExecutionTicket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Records the outcome and wakes every resend waiting on this id.
    pub fn complete(mut self, outcome: Outcome) {
        if let Some(inner) = self.inner.upgrade() {
            let mut slots = inner.slots.lock().unwrap();
            slots.insert(
                self.id,
                Slot::Completed(AckRecord {
                    outcome: outcome.clone(),
                    created: Instant::now(),
                    delivered_at: None,
                }),
            );
        }
        self.completed = true;
        let _ = self.tx.send(Some(outcome));
    }
}

impl Drop for ExecutionTicket {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::warn!(id = self.id, "execution abandoned without an outcome");
        if let Some(inner) = self.inner.upgrade() {
            let mut slots = inner.slots.lock().unwrap();
            if matches!(slots.get(&self.id), Some(Slot::Executing(_))) {
                slots.remove(&self.id);
            }
        }
        // Dropping `tx` wakes waiters, who fall back to an abandoned-execution
        // fault in `await_outcome`.
    }
}

/// Request-id bookkeeping shared by all connections of one server.
///
/// The map lock is only held for pointer-sized bookkeeping, never across an
/// await; waiting for an in-flight execution happens on the per-record watch
/// channel, so records for different ids make progress independently.
pub struct ResendLedger {
    inner: Arc<LedgerInner>,
}

impl ResendLedger {
    pub fn new(config: LedgerConfig) -> Self {
        ResendLedger {
            inner: Arc::new(LedgerInner {
                slots: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    /// Decides how a delivery of `id` must be served.
    pub fn admit(&self, id: RequestId) -> Admission {
        let mut slots = self.inner.slots.lock().unwrap();
        match slots.entry(id) {
            Entry::Occupied(occupied) => match occupied.get() {
                Slot::Executing(rx) => Admission::Wait(rx.clone()),
                Slot::Completed(record) => Admission::Replay(record.outcome.clone()),
            },
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(Slot::Executing(rx));
                Admission::Execute(ExecutionTicket {
                    id,
                    tx,
                    inner: Arc::downgrade(&self.inner),
                    completed: false,
                })
            }
        }
    }

    /// Waits for the original execution of a racing resend to finish.
    pub async fn await_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender gone; one last look in case completion raced the drop.
                if let Some(outcome) = rx.borrow().clone() {
                    return outcome;
                }
                return Outcome::Fault(RemoteFault::undeclared(
                    "ExecutionAbandoned",
                    "the original execution ended without recording an outcome",
                ));
            }
        }
    }

    /// Marks records delivered; called with the ack ids piggybacked on
    /// inbound traffic. Ids that are unknown or still executing are ignored,
    /// so duplicate acks from resent frames are harmless.
    pub fn confirm_delivered(&self, ids: &[RequestId]) {
        if ids.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut slots = self.inner.slots.lock().unwrap();
        for id in ids {
            if let Some(Slot::Completed(record)) = slots.get_mut(id) {
                record.delivered_at.get_or_insert(now);
            }
        }
    }

    /// Reclaims records past their retention window; returns how many.
    ///
    /// Executing slots are never reclaimed. Completed records go once their
    /// confirmed delivery is older than the grace period, or unconditionally
    /// once older than `max_age`.
    pub fn sweep(&self) -> usize {
        let config = self.inner.config;
        let now = Instant::now();
        let mut slots = self.inner.slots.lock().unwrap();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Executing(_) => true,
            Slot::Completed(record) => {
                let delivered_expired = record
                    .delivered_at
                    .is_some_and(|at| now.duration_since(at) >= config.delivered_grace);
                let aged_out = now.duration_since(record.created) >= config.max_age;
                !(delivered_expired || aged_out)
            }
        });
        let removed = before - slots.len();
        if removed > 0 {
            tracing::debug!(removed, retained = slots.len(), "swept resend ledger");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
