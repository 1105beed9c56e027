//! The public surface: `Config`, the `PeerDiscovery` trait, and the
//! `SlickDiscovery`/`SlickEngine` split that lets a `Send + Sync` handle
//! hand operations to a poll-thread-owned driver without locking any of
//! the driver's own state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slick_util::logging::Logger;
use slick_util::NetworkError;

use crate::defer::Defer;
use crate::gossip::engine::GossipEngine;
use crate::gossip::ops::{GossipOp, WatchCallback};
use crate::ids::{next_watch_handle, KeyId, NodeId, WatchHandle};
use crate::location::{Address, NodeLocation};

/// Construction parameters for a swarm member. Everything here has a
/// sensible default except the port, which a caller almost always wants
/// to pick deliberately.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local TCP port to listen on.
    pub port: u16,
    /// Bootstrap addresses tried whenever the node has no live
    /// connections (seed recovery).
    pub seeds: Vec<Address>,
    /// Host advertised in this node's own `NodeLocation`. Never resolved
    /// or guessed — the caller knows its own externally-reachable address
    /// better than this crate does.
    pub advertise_host: String,
    /// TTL applied to items this node originates, in milliseconds.
    pub ttl_ms: u64,
    /// Gossip tick period, in milliseconds.
    pub period_ms: u64,
    /// How long a connection must have been open before it becomes
    /// eligible for random disconnect, in milliseconds.
    pub conn_exp_thresh_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 18888,
            seeds: Vec::new(),
            advertise_host: "127.0.0.1".to_string(),
            ttl_ms: 8 * 60 * 60 * 1000,
            period_ms: 60_000,
            conn_exp_thresh_ms: 10_000,
        }
    }
}

#[derive(Debug)]
pub enum GossipError {
    Network(NetworkError),
    /// Raised by capability stubs (`StaticDiscovery`) for operations they
    /// intentionally don't implement.
    Unsupported,
}

impl fmt::Display for GossipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossipError::Network(e) => write!(f, "{:?}", e),
            GossipError::Unsupported => write!(f, "operation not supported by this PeerDiscovery"),
        }
    }
}

impl std::error::Error for GossipError {}

impl From<NetworkError> for GossipError {
    fn from(e: NetworkError) -> Self {
        GossipError::Network(e)
    }
}

pub type GossipResult<T> = Result<T, GossipError>;

/// The capability surface a caller programs against. `SlickDiscovery` is
/// the real implementation; `StaticDiscovery` is an intentional stub for
/// embedders that want to wire the trait through their own code before a
/// real swarm exists (see the Open Questions on this — its full-mesh
/// semantics are deliberately not implemented here).
pub trait PeerDiscovery: Send + Sync {
    /// This node's identity.
    fn id(&self) -> NodeId;
    /// This node's advertised location.
    fn node(&self) -> NodeLocation;
    /// Publishes `payload` under `key`, replacing any prior publication.
    fn publish(&self, key: &str, payload: Vec<u8>) -> GossipResult<()>;
    /// Withdraws this node's own publication under `key`. Local only — no
    /// multicast retraction is sent; other holders still expire it by TTL.
    fn retract(&self, key: &str) -> GossipResult<()>;
    /// Registers `callback` to be invoked with `(handle, keyId, payload)`
    /// for every live and future holder of `key`. Returns the handle used
    /// to `forget` this subscription later.
    fn discover(&self, key: &str, callback: WatchCallback) -> GossipResult<WatchHandle>;
    /// Cancels a subscription previously returned by `discover`.
    fn forget(&self, key: &str, handle: WatchHandle) -> GossipResult<()>;
    /// Reports that the payload previously delivered for `(key, keyId)` is
    /// no longer usable (e.g. the caller failed to act on it) and the
    /// local copy of that holder item should be dropped. Local only.
    fn lost(&self, key: &str, key_id: KeyId) -> GossipResult<()>;
}

/// `Send + Sync` handle to a running `SlickEngine`. Every method funnels
/// through a bounded `Defer<GossipOp>` queue — none of it touches the
/// engine's own state directly, so cloning and sharing this handle across
/// threads is free of locking and free of contention with the poll
/// thread's own work.
#[derive(Clone)]
pub struct SlickDiscovery {
    ops: Arc<Defer<GossipOp>>,
    node_id: NodeId,
    location: NodeLocation,
}

impl SlickDiscovery {
    /// Builds the `(handle, engine)` pair. The handle may be cloned and
    /// handed to any number of threads; the engine must be driven from
    /// exactly one thread via `SlickEngine::run` or repeated calls to
    /// `SlickEngine::poll`.
    pub fn new(config: Config, log: Logger) -> Result<(SlickDiscovery, SlickEngine), NetworkError> {
        let engine = GossipEngine::new(config, log)?;
        let node_id = engine.node_id();
        let location = engine.location().clone();
        let ops = engine.ops_handle();

        Ok((
            SlickDiscovery { ops, node_id, location },
            SlickEngine { inner: engine },
        ))
    }
}

impl PeerDiscovery for SlickDiscovery {
    fn id(&self) -> NodeId {
        self.node_id
    }

    fn node(&self) -> NodeLocation {
        self.location.clone()
    }

    fn publish(&self, key: &str, payload: Vec<u8>) -> GossipResult<()> {
        self.ops.push_spin(GossipOp::Publish { key: key.to_string(), payload });
        Ok(())
    }

    fn retract(&self, key: &str) -> GossipResult<()> {
        self.ops.push_spin(GossipOp::Retract { key: key.to_string() });
        Ok(())
    }

    fn discover(&self, key: &str, callback: WatchCallback) -> GossipResult<WatchHandle> {
        let handle = next_watch_handle();
        self.ops
            .push_spin(GossipOp::Discover { key: key.to_string(), handle, callback });
        Ok(handle)
    }

    fn forget(&self, key: &str, handle: WatchHandle) -> GossipResult<()> {
        self.ops.push_spin(GossipOp::Forget { key: key.to_string(), handle });
        Ok(())
    }

    fn lost(&self, key: &str, key_id: KeyId) -> GossipResult<()> {
        self.ops.push_spin(GossipOp::Lost { key: key.to_string(), key_id });
        Ok(())
    }
}

impl SlickDiscovery {
    /// Retargets the jittered tick period. Takes effect the next
    /// time the engine reschedules its timer, not on this call.
    pub fn period(&self, ms: u64) {
        self.ops.push_spin(GossipOp::SetPeriod(ms));
    }

    /// Changes the TTL this node stamps on items it originates from now
    /// on. Does not retroactively touch items already published or
    /// forwarded under the old TTL.
    pub fn ttl(&self, ms: u64) {
        self.ops.push_spin(GossipOp::SetTtl(ms));
    }

    /// Changes the minimum connection age before it becomes eligible for
    /// random eviction.
    pub fn conn_exp_thresh(&self, ms: u64) {
        self.ops.push_spin(GossipOp::SetConnExpThresh(ms));
    }

    /// Signals the poll thread to stop. `SlickEngine::run`/`poll` return
    /// once this has been processed; safe to call from any thread,
    /// including one that never touches the engine itself.
    pub fn shutdown(&self) {
        self.ops.push_spin(GossipOp::Shutdown);
    }
}

/// The poll-thread-owned driver. Not `Sync` — there is exactly one of
/// these per swarm member, and it is only ever touched by the thread
/// that calls `run`/`poll`.
pub struct SlickEngine {
    inner: GossipEngine,
}

impl SlickEngine {
    /// Drives the endpoint and gossip tick loop until a `GossipOp::Shutdown`
    /// is observed. Blocks in increments of `max_wait` so a caller sharing
    /// this thread for other work still gets control back periodically.
    pub fn run(&mut self, max_wait: Duration) -> Result<(), NetworkError> {
        loop {
            if self.inner.poll(Some(max_wait))? {
                return Ok(());
            }
        }
    }

    /// Drives one iteration of the endpoint poll and, if due, one gossip
    /// tick. Returns `true` once a shutdown has been processed.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, NetworkError> {
        self.inner.poll(timeout)
    }

    /// The raw fd backing this engine's poll loop, for embedders folding
    /// it into an external event loop.
    #[cfg(unix)]
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.inner.raw_fd()
    }
}

/// Counts calls so tests can assert `StaticDiscovery` really is inert
/// rather than silently succeeding.
#[derive(Default)]
struct StaticCounters {
    calls: AtomicU64,
}

/// An intentionally unimplemented `PeerDiscovery`. The spec's Open
/// Questions leave its semantics (a static full-mesh of a fixed peer
/// list?) undecided, so rather than guess at behavior nobody asked for,
/// every mutating method returns `GossipError::Unsupported`. `id`/`node`
/// still work since they require no swarm participation at all.
pub struct StaticDiscovery {
    node_id: NodeId,
    location: NodeLocation,
    counters: StaticCounters,
}

impl StaticDiscovery {
    pub fn new(node_id: NodeId, location: NodeLocation) -> Self {
        StaticDiscovery { node_id, location, counters: StaticCounters::default() }
    }

    /// Number of mutating calls rejected so far.
    pub fn rejected_calls(&self) -> u64 {
        self.counters.calls.load(Ordering::Relaxed)
    }

    fn reject<T>(&self) -> GossipResult<T> {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        Err(GossipError::Unsupported)
    }
}

impl PeerDiscovery for StaticDiscovery {
    fn id(&self) -> NodeId {
        self.node_id
    }

    fn node(&self) -> NodeLocation {
        self.location.clone()
    }

    fn publish(&self, _key: &str, _payload: Vec<u8>) -> GossipResult<()> {
        self.reject()
    }

    fn retract(&self, _key: &str) -> GossipResult<()> {
        self.reject()
    }

    fn discover(&self, _key: &str, _callback: WatchCallback) -> GossipResult<WatchHandle> {
        self.reject()
    }

    fn forget(&self, _key: &str, _handle: WatchHandle) -> GossipResult<()> {
        self.reject()
    }

    fn lost(&self, _key: &str, _key_id: KeyId) -> GossipResult<()> {
        self.reject()
    }
}
