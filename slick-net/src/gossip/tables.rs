//! The poll-thread-owned tables: membership, per-key holder sets,
//! local publications, watchers, connection metadata and the two FIFO
//! expiration queues. Nothing in here is `Sync` — a `GossipEngine` is the
//! only thing that ever touches a `Tables`, and it only ever does so from
//! the thread driving its `poll` loop.

use std::collections::VecDeque;

use hashbrown::HashMap;
use indexmap::IndexSet;
use rand::Rng;

use crate::endpoint::ConnHandle;
use crate::gossip::message::FetchItem;
use crate::ids::{KeyId, NodeId, WatchHandle};
use crate::item::Item;
use crate::location::NodeLocation;

/// A single local subscriber registered via `discover`.
pub struct Watch {
    pub handle: WatchHandle,
    pub callback: Box<dyn Fn(WatchHandle, KeyId, Vec<u8>) + Send + 'static>,
}

/// Gossip-level metadata for one endpoint connection. Distinct from
/// `endpoint::connection::Connection`, which only knows about bytes and
/// framing — this is the layer that knows what the connection is *for*.
pub struct GossipConn {
    pub peer: Option<NodeId>,
    pub fetch_mode: bool,
    pub handshake_sent: bool,
    pub handshake_received: bool,
    /// `(key, keyId)` pairs this connection was opened to fetch. Non-empty
    /// only for fetch-mode connections we initiated; piggy-backed onto the
    /// handshake frame once the connection is established.
    pub pending_fetch: Vec<FetchItem>,
    pub opened_at_ms: u64,
}

impl GossipConn {
    pub fn new(opened_at_ms: u64) -> Self {
        GossipConn {
            peer: None,
            fetch_mode: false,
            handshake_sent: false,
            handshake_received: false,
            pending_fetch: Vec::new(),
            opened_at_ms,
        }
    }
}

/// An outstanding `Fetch`: where we last asked, and how many times we've
/// retried. `retry_count` feeds the backoff delay multiplier.
pub struct FetchState {
    pub location: NodeLocation,
    pub retry_count: u32,
}

#[derive(Default)]
pub struct Tables {
    pub nodes: HashMap<NodeId, Item<NodeId>>,
    pub keys: HashMap<String, HashMap<KeyId, Item<KeyId>>>,
    pub data: HashMap<String, (KeyId, Vec<u8>)>,
    pub watches: HashMap<String, Vec<Watch>>,
    pub connections: HashMap<ConnHandle, GossipConn>,
    pub connected_nodes: HashMap<NodeId, ConnHandle>,
    pub edges: IndexSet<ConnHandle>,
    pub fetches: HashMap<String, HashMap<KeyId, FetchState>>,
    pub conn_expiration: VecDeque<(ConnHandle, u64)>,
    pub fetch_expiration: VecDeque<(String, KeyId, u64)>,
}

/// Outcome of applying the forward rule to one incoming `Item`.
pub enum Forward {
    /// The item was new to this table; always forwarded.
    Inserted,
    /// The item was already known; its TTL was extended and it crossed its
    /// half-life, so it's forwarded again.
    Revived,
    /// The item was already known and didn't warrant re-forwarding.
    Suppressed,
}

/// Applies the half-life forward rule to a single incoming item
/// against `table[id]`. Inserts on first sight; on a repeat, extends the
/// stored TTL (never shortens it) and reports whether the item has
/// genuinely advanced local knowledge enough to re-forward.
pub fn apply_forward_rule<Id: std::hash::Hash + Eq + Copy>(
    table: &mut HashMap<Id, Item<Id>>,
    id: Id,
    addrs: NodeLocation,
    incoming_ttl_ms: u64,
    ttl_ceiling_ms: u64,
    now_ms: u64,
) -> Forward {
    match table.get_mut(&id) {
        None => {
            table.insert(id, Item::new(id, addrs, incoming_ttl_ms, now_ms));
            Forward::Inserted
        }
        Some(existing) => {
            let stored_ttl = existing.ttl(now_ms);
            existing.set_ttl(incoming_ttl_ms, now_ms);

            // Forward only when the stored TTL was already below half-life
            // and the incoming TTL doesn't itself trail badly behind it —
            // i.e. this message is reviving an item that was about to
            // expire, rather than just echoing stale knowledge back to us.
            if stored_ttl >= ttl_ceiling_ms / 2 {
                return Forward::Suppressed;
            }
            if stored_ttl / 2 > incoming_ttl_ms {
                return Forward::Suppressed;
            }
            Forward::Revived
        }
    }
}

/// Redis-style active expiration: repeatedly sample a random element and
/// remove it if expired, stopping the first time a live element is
/// sampled. Bounds the per-tick cost of expiry without a full table scan,
/// at the cost of occasionally leaving an expired item around for another
/// tick or two — harmless, since `ttl()`/`is_expired()` are checked by
/// every reader anyway.
pub fn expire_one_sampled<Id: std::hash::Hash + Eq + Copy>(
    table: &mut HashMap<Id, Item<Id>>,
    now_ms: u64,
    rng: &mut impl Rng,
) -> Option<Id> {
    loop {
        if table.is_empty() {
            return None;
        }
        let skip = rng.gen_range(0..table.len());
        let Some((&id, _)) = table.iter().nth(skip) else {
            return None;
        };
        let expired = table.get(&id).map(|item| item.is_expired(now_ms)).unwrap_or(false);
        if !expired {
            return None;
        }
        table.remove(&id);
        return Some(id);
    }
}

impl Tables {
    /// `⌈log₂(n)⌉`, floored at 1 — the target overlay degree and the
    /// random-digest size used throughout the overlay maintenance tick.
    /// `n = 0` and `n = 1` both collapse to 1 so a lone or near-empty
    /// swarm still tries to connect.
    pub fn log2_ceil(n: usize) -> usize {
        if n <= 1 {
            return 1;
        }
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }

    /// One uniformly random node, live or not — the caller checks
    /// `is_expired` itself (mirrors sampling the raw table before the TTL
    /// check, same as `expire_one_sampled`).
    pub fn pick_one<'a>(&'a self, rng: &mut impl Rng) -> Option<&'a Item<NodeId>> {
        if self.nodes.is_empty() {
            return None;
        }
        let skip = rng.gen_range(0..self.nodes.len());
        self.nodes.values().nth(skip)
    }

    pub fn picks_random<'a>(
        &'a self,
        n: usize,
        now_ms: u64,
        rng: &mut impl Rng,
        exclude: NodeId,
    ) -> Vec<&'a Item<NodeId>> {
        let live: Vec<&Item<NodeId>> = self
            .nodes
            .values()
            .filter(|item| item.id != exclude && !item.is_expired(now_ms))
            .collect();
        if live.len() <= n {
            return live;
        }
        let mut indices: Vec<usize> = (0..live.len()).collect();
        for i in 0..n.min(indices.len()) {
            let j = rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
        indices[..n].iter().map(|&i| live[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use rand::SeedableRng;

    #[test]
    fn log2_ceil_matches_overlay_degree_target() {
        assert_eq!(Tables::log2_ceil(0), 1);
        assert_eq!(Tables::log2_ceil(1), 1);
        assert_eq!(Tables::log2_ceil(2), 1);
        assert_eq!(Tables::log2_ceil(3), 2);
        assert_eq!(Tables::log2_ceil(4), 2);
        assert_eq!(Tables::log2_ceil(5), 3);
        assert_eq!(Tables::log2_ceil(100), 7);
        assert_eq!(Tables::log2_ceil(128), 7);
        assert_eq!(Tables::log2_ceil(129), 8);
    }

    #[test]
    fn forward_rule_inserts_unseen_items() {
        let mut table: HashMap<NodeId, Item<NodeId>> = HashMap::new();
        let id = NodeId::random();
        let outcome = apply_forward_rule(&mut table, id, NodeLocation::default(), 1_000, 2_000, 0);
        assert!(matches!(outcome, Forward::Inserted));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn forward_rule_suppresses_stale_repeat_above_half_life() {
        let mut table: HashMap<NodeId, Item<NodeId>> = HashMap::new();
        let id = NodeId::random();
        // ttl_ceiling = 2000, so half-life is 1000. Insert with plenty of
        // headroom above that.
        apply_forward_rule(&mut table, id, NodeLocation::default(), 1_800, 2_000, 0);
        // Re-announced immediately: stored TTL (1_800) is still above
        // half-life (1_000), so this carries no new information.
        let outcome = apply_forward_rule(&mut table, id, NodeLocation::default(), 1_800, 2_000, 0);
        assert!(matches!(outcome, Forward::Suppressed));
    }

    #[test]
    fn forward_rule_revives_item_past_half_life() {
        let mut table: HashMap<NodeId, Item<NodeId>> = HashMap::new();
        let id = NodeId::random();
        apply_forward_rule(&mut table, id, NodeLocation::default(), 2_000, 2_000, 0);
        // Advance time so the stored TTL has decayed below half-life
        // (1_000), then re-announce with a large incoming TTL — this is
        // exactly the "reviving a nearly-expired item" case that should
        // forward.
        let outcome = apply_forward_rule(&mut table, id, NodeLocation::default(), 2_000, 2_000, 1_500);
        assert!(matches!(outcome, Forward::Revived));
    }

    #[test]
    fn forward_rule_never_shortens_stored_ttl() {
        let mut table: HashMap<NodeId, Item<NodeId>> = HashMap::new();
        let id = NodeId::random();
        apply_forward_rule(&mut table, id, NodeLocation::default(), 5_000, 10_000, 0);
        let before = table[&id].expiration_ms;
        apply_forward_rule(&mut table, id, NodeLocation::default(), 10, 10_000, 0);
        assert_eq!(table[&id].expiration_ms, before);
    }

    #[test]
    fn expire_one_sampled_only_removes_expired_entries() {
        let mut table: HashMap<NodeId, Item<NodeId>> = HashMap::new();
        let live = NodeId::random();
        let dead = NodeId::random();
        table.insert(live, Item::new(live, NodeLocation::default(), 10_000, 0));
        table.insert(dead, Item::new(dead, NodeLocation::default(), 0, 0));

        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        // Sample repeatedly; only `dead` can ever be reported as expired.
        for _ in 0..50 {
            if let Some(id) = expire_one_sampled(&mut table, 1, &mut rng) {
                assert_eq!(id, dead);
            }
        }
        assert!(!table.contains_key(&dead));
        assert!(table.contains_key(&live));
    }

    #[test]
    fn pick_one_returns_none_on_empty_table() {
        let tables = Tables::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        assert!(tables.pick_one(&mut rng).is_none());
    }

    #[test]
    fn picks_random_excludes_self_and_expired() {
        let mut tables = Tables::default();
        let me = NodeId::random();
        let live = NodeId::random();
        let expired = NodeId::random();
        tables.nodes.insert(me, Item::new(me, NodeLocation::default(), 10_000, 0));
        tables.nodes.insert(live, Item::new(live, NodeLocation::default(), 10_000, 0));
        tables.nodes.insert(expired, Item::new(expired, NodeLocation::default(), 0, 0));

        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let picked = tables.picks_random(10, 1, &mut rng, me);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, live);
    }
}
