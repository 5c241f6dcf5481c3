//! Bounded, reusable connection pool keyed by destination host.
//!
//! Two ceilings bound concurrency: a per-host cap and a global cap, both
//! enforced with FIFO-fair semaphores so blocked acquirers are served in
//! arrival order. Reconfiguring a ceiling takes effect for subsequent
//! acquisitions; shrinking never force-closes anything: excess capacity is
//! reclaimed as in-flight connections are released, so an over-limit pool
//! drains down naturally.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use oncerpc_common::protocol::{Result, RpcError};

const DEFAULT_PER_HOST_MAX: usize = 10;
/// Default global ceiling is this many times the per-host ceiling.
const TOTAL_FACTOR: usize = 10;

/// The two pool ceilings and the rule tying them together.
///
/// `total_max` follows `per_host_max * 10` until it is set explicitly; from
/// then on the explicit value sticks, and later `per_host_max` changes no
/// longer touch it.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    per_host_max: usize,
    total_max: usize,
    total_explicit: bool,
}

impl PoolLimits {
    pub fn new() -> Self {
        PoolLimits {
            per_host_max: DEFAULT_PER_HOST_MAX,
            total_max: DEFAULT_PER_HOST_MAX * TOTAL_FACTOR,
            total_explicit: false,
        }
    }

    pub fn per_host_max(&self) -> usize {
        self.per_host_max
    }

    pub fn total_max(&self) -> usize {
        self.total_max
    }

    fn set_per_host_max(&mut self, n: usize) {
        self.per_host_max = n;
        if !self.total_explicit {
            self.total_max = n * TOTAL_FACTOR;
        }
    }

    fn set_total_max(&mut self, n: usize) {
        self.total_max = n;
        self.total_explicit = true;
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::new()
    }
}

struct HostEntry {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<TcpStream>>,
}

/// A checked-out connection. Holds one per-host and one global permit until
/// it is released or discarded.
#[derive(Debug)]
pub struct PooledConnection {
    stream: TcpStream,
    addr: String,
    _host_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

/// Pool of reusable TCP connections with per-host and global ceilings.
pub struct ConnectionPool {
    limits: Mutex<PoolLimits>,
    global: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, Arc<HostEntry>>>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(limits: PoolLimits, acquire_timeout: Duration) -> Self {
        ConnectionPool {
            global: Arc::new(Semaphore::new(limits.total_max)),
            limits: Mutex::new(limits),
            hosts: Mutex::new(HashMap::new()),
            acquire_timeout,
        }
    }

    pub fn per_host_max(&self) -> usize {
        self.limits.lock().unwrap().per_host_max()
    }

    pub fn total_max(&self) -> usize {
        self.limits.lock().unwrap().total_max()
    }

    /// Sets the per-host ceiling; the global ceiling follows proportionally
    /// unless it has been set explicitly.
    pub fn set_per_host_max(&self, n: usize) {
        // The hosts lock is held across the limits update and the resizes;
        // an entry created concurrently waits and is sized to the new
        // ceiling, never resized a second time.
        let hosts = self.hosts.lock().unwrap();
        let (host_old, total_old, total_new) = {
            let mut limits = self.limits.lock().unwrap();
            let host_old = limits.per_host_max();
            let total_old = limits.total_max();
            limits.set_per_host_max(n);
            (host_old, total_old, limits.total_max())
        };

        resize(&self.global, total_old, total_new);
        for entry in hosts.values() {
            resize(&entry.semaphore, host_old, n);
        }
    }

    /// Sets the global ceiling explicitly; it no longer tracks `per_host_max`.
    pub fn set_total_max(&self, n: usize) {
        let total_old = {
            let mut limits = self.limits.lock().unwrap();
            let old = limits.total_max();
            limits.set_total_max(n);
            old
        };
        resize(&self.global, total_old, n);
    }

    /// Checks out a connection to `addr`, waiting (bounded, FIFO) for
    /// capacity under both ceilings, then reusing an idle connection or
    /// dialing a new one.
    pub async fn acquire(&self, addr: &str) -> Result<PooledConnection> {
        let started = Instant::now();
        let entry = self.host_entry(addr);

        let permits = tokio::time::timeout(self.acquire_timeout, async {
            let host = entry
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| RpcError::Transport("connection pool closed".into()))?;
            let global = self
                .global
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| RpcError::Transport("connection pool closed".into()))?;
            Ok::<_, RpcError>((host, global))
        })
        .await
        .map_err(|_| RpcError::PoolTimeout(self.acquire_timeout.as_millis() as u64))??;

        let idle = entry.idle.lock().unwrap().pop();
        let stream = match idle {
            Some(stream) => stream,
            None => {
                // Dialing consumes whatever is left of the acquire budget,
                // so an unresponsive host cannot hold a call for the OS
                // connect timeout.
                let remaining = self.acquire_timeout.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        return Err(RpcError::Transport(format!(
                            "failed to connect to {addr}: {e}"
                        )))
                    }
                    Err(_) => {
                        return Err(RpcError::Transport(format!("connecting to {addr} timed out")))
                    }
                }
            }
        };

        Ok(PooledConnection {
            stream,
            addr: addr.to_string(),
            _host_permit: permits.0,
            _global_permit: permits.1,
        })
    }

    /// Returns a healthy connection for reuse and frees its capacity.
    pub fn release(&self, conn: PooledConnection) {
        let PooledConnection {
            stream,
            addr,
            _host_permit,
            _global_permit,
        } = conn;

        let entry = self.host_entry(&addr);
        let cap = self.per_host_max();
        let mut idle = entry.idle.lock().unwrap();
        if idle.len() < cap {
            idle.push(stream);
        }
        // permits drop here; the longest-blocked acquirer goes first
    }

    /// Drops a connection that errored mid-use. Its capacity is freed but the
    /// socket is never reused.
    pub fn discard(&self, conn: PooledConnection) {
        tracing::debug!(addr = %conn.addr, "discarding errored connection");
        drop(conn);
    }

    fn host_entry(&self, addr: &str) -> Arc<HostEntry> {
        let mut hosts = self.hosts.lock().unwrap();
        if let Some(entry) = hosts.get(addr) {
            return entry.clone();
        }

        // Lock order is hosts, then limits; reconfiguration takes them the
        // same way.
        let per_host_max = self.limits.lock().unwrap().per_host_max();
        let entry = Arc::new(HostEntry {
            semaphore: Arc::new(Semaphore::new(per_host_max)),
            idle: Mutex::new(Vec::new()),
        });
        hosts.insert(addr.to_string(), entry.clone());
        entry
    }
}

/// Grows a ceiling immediately; shrinks it by swallowing permits as current
/// holders release them, so nothing in flight is interrupted.
///
/// Free permits are reclaimed synchronously, which also makes shrinking work
/// outside a runtime (startup configuration before anything is checked out).
/// Draining permits that are currently held needs a runtime to wait on.
fn resize(semaphore: &Arc<Semaphore>, old: usize, new: usize) {
    use std::cmp::Ordering;
    match new.cmp(&old) {
        Ordering::Greater => semaphore.add_permits(new - old),
        Ordering::Less => {
            let excess = (old - new) as u32;
            match semaphore.clone().try_acquire_many_owned(excess) {
                Ok(permits) => permits.forget(),
                Err(_) => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let semaphore = semaphore.clone();
                        handle.spawn(async move {
                            if let Ok(permits) = semaphore.acquire_many_owned(excess).await {
                                permits.forget();
                            }
                        });
                    }
                    Err(_) => {
                        tracing::warn!(
                            excess,
                            "no runtime available to drain held permits; shrink not applied to capacity currently in use"
                        );
                    }
                },
            }
        }
        Ordering::Equal => {}
    }
}
