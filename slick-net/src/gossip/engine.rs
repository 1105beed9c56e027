//! The poll-thread-owned driver: dispatches `EndpointEvent`s
//! into the gossip protocol, runs the periodic tick (expiry, overlay
//! maintenance, fetch retries), and applies `GossipOp`s handed over from
//! `SlickDiscovery`.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use slick_util::logging::{o, Logger};
use slick_util::wire::{Decode, Encode};
use slick_util::NetworkError;

use crate::defer::Defer;
use crate::endpoint::{ConnHandle, Endpoint, EndpointEvent};
use crate::gossip::message::{DataItem, FetchItem, Handshake, KeyItem, Message, NodeItem};
use crate::gossip::ops::GossipOp;
use crate::gossip::tables::{apply_forward_rule, expire_one_sampled, FetchState, GossipConn, Tables};
use crate::ids::{KeyId, NodeId};
use crate::location::{Address, NodeLocation};
use crate::timer::Timer;

/// Base delay, in milliseconds, for the first fetch retry. Multiplied by
/// `retry_count` and capped by `MAX_FETCH_RETRY_DELAY_MS`.
const BASE_FETCH_RETRY_DELAY_MS: u64 = 500;
const MAX_FETCH_RETRY_DELAY_MS: u64 = 30_000;

fn retry_delay_ms(retry_count: u32) -> u64 {
    BASE_FETCH_RETRY_DELAY_MS.saturating_mul(retry_count as u64).min(MAX_FETCH_RETRY_DELAY_MS)
}

pub struct GossipEngine {
    endpoint: Endpoint,
    tables: Tables,
    node_id: NodeId,
    location: NodeLocation,
    seeds: Vec<Address>,
    ttl_ms: u64,
    conn_exp_thresh_ms: u64,
    timer: Timer,
    ops: Arc<Defer<GossipOp>>,
    rng: StdRng,
    log: Logger,
}

impl GossipEngine {
    pub fn new(config: super::api::Config, log: Logger) -> Result<Self, NetworkError> {
        let log = log.new(o!("component" => "gossip"));
        let mut endpoint = Endpoint::new(log.clone())?;
        endpoint.listen(config.port)?;

        let ops = Arc::new(Defer::new(crate::defer::CONTROL_CAPACITY, endpoint.waker()));
        let node_id = NodeId::random();
        let location = NodeLocation::single(Address::new(config.advertise_host.clone(), config.port));

        Ok(GossipEngine {
            endpoint,
            tables: Tables::default(),
            node_id,
            location,
            seeds: config.seeds,
            ttl_ms: config.ttl_ms,
            conn_exp_thresh_ms: config.conn_exp_thresh_ms,
            timer: Timer::new(config.period_ms),
            ops,
            rng: StdRng::from_entropy(),
            log,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn location(&self) -> &NodeLocation {
        &self.location
    }

    pub fn ops_handle(&self) -> Arc<Defer<GossipOp>> {
        self.ops.clone()
    }

    #[cfg(unix)]
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.endpoint.raw_fd()
    }

    /// Drives one iteration: drains pending ops, polls the endpoint, and
    /// fires a gossip tick if the timer is due. Returns `true` once a
    /// `GossipOp::Shutdown` has been applied.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, NetworkError> {
        let mut shutdown = false;
        let ops = self.ops.clone();
        ops.drain(0, |op| {
            if matches!(op, GossipOp::Shutdown) {
                shutdown = true;
            } else {
                self.apply_op(op);
            }
        });
        if shutdown {
            return Ok(true);
        }

        let wait = match self.timer.timeout() {
            Some(remaining) => match timeout {
                Some(t) => Some(t.min(remaining)),
                None => Some(remaining),
            },
            None => timeout.or(Some(Duration::from_millis(0))),
        };

        let events = self.endpoint.poll(wait)?;
        for event in events {
            self.handle_event(event);
        }

        if self.timer.is_due() {
            self.tick();
            self.timer.fire();
        }

        Ok(false)
    }

    // ---- GossipOp application -------------------------------------------------

    fn apply_op(&mut self, op: GossipOp) {
        match op {
            GossipOp::Publish { key, payload } => self.on_publish(key, payload),
            GossipOp::Retract { key } => {
                self.tables.data.remove(&key);
            }
            GossipOp::Discover { key, handle, callback } => self.on_discover(key, handle, callback),
            GossipOp::Forget { key, handle } => self.on_forget(key, handle),
            GossipOp::Lost { key, key_id } => self.on_lost(key, key_id),
            GossipOp::SetPeriod(period_ms) => self.timer.set_period(period_ms),
            GossipOp::SetTtl(ttl_ms) => self.ttl_ms = ttl_ms,
            GossipOp::SetConnExpThresh(thresh_ms) => self.conn_exp_thresh_ms = thresh_ms,
            GossipOp::Shutdown => unreachable!("handled in poll() before reaching apply_op"),
        }
    }

    fn on_publish(&mut self, key: String, payload: Vec<u8>) {
        let key_id = KeyId::random();
        let now = slick_util::time::wall_ms();
        self.tables.data.insert(key.clone(), (key_id, payload));
        self.tables
            .keys
            .entry(key.clone())
            .or_default()
            .insert(key_id, crate::item::Item::new(key_id, self.location.clone(), self.ttl_ms, now));

        let msg = Message::Keys(vec![KeyItem {
            key,
            key_id,
            location: self.location.clone(),
            ttl_ms: self.ttl_ms,
        }]);
        self.multicast_message(&msg);
    }

    fn on_discover(&mut self, key: String, handle: crate::ids::WatchHandle, callback: crate::gossip::ops::WatchCallback) {
        let is_first_watcher = !self.tables.watches.contains_key(&key);
        self.tables
            .watches
            .entry(key.clone())
            .or_default()
            .push(crate::gossip::tables::Watch { handle, callback });

        if is_first_watcher {
            let msg = Message::Query { sender: self.location.clone(), keys: vec![key.clone()] };
            self.multicast_message(&msg);
        }

        if let Some(bucket) = self.tables.keys.get(&key) {
            let holders: Vec<(KeyId, NodeLocation)> =
                bucket.iter().map(|(id, item)| (*id, item.addrs.clone())).collect();
            for (key_id, location) in holders {
                self.initiate_fetch(key.clone(), key_id, location);
            }
        }
    }

    fn on_forget(&mut self, key: String, handle: crate::ids::WatchHandle) {
        let Some(list) = self.tables.watches.get_mut(&key) else { return };
        list.retain(|w| w.handle != handle);
        if list.is_empty() {
            self.tables.watches.remove(&key);
            self.tables.fetches.remove(&key);
        }
    }

    fn on_lost(&mut self, key: String, key_id: KeyId) {
        if let Some(bucket) = self.tables.keys.get_mut(&key) {
            bucket.remove(&key_id);
            if bucket.is_empty() {
                self.tables.keys.remove(&key);
            }
        }
    }

    // ---- EndpointEvent dispatch -------------------------------------------------

    fn handle_event(&mut self, event: EndpointEvent) {
        match event {
            EndpointEvent::NewConnection { conn, .. } => self.on_new_connection(conn),
            EndpointEvent::LostConnection { conn } => self.on_lost_connection(conn),
            EndpointEvent::Payload { conn, payload } => self.on_payload(conn, payload),
            EndpointEvent::DroppedPayload { conn } => {
                slick_util::logging::debug!(self.log, "dropped payload"; "conn" => ?conn);
            }
        }
    }

    fn on_new_connection(&mut self, conn: ConnHandle) {
        let gconn = self.tables.connections.entry(conn).or_insert_with(|| GossipConn::new(slick_util::time::wall_ms()));

        let mut buf = Vec::new();
        Handshake { node_id: self.node_id }.encode(&mut buf);

        if gconn.fetch_mode && !gconn.pending_fetch.is_empty() {
            Message::Fetch(gconn.pending_fetch.clone()).encode(&mut buf);
        }
        gconn.handshake_sent = true;

        self.endpoint.send(conn, buf);
    }

    fn on_lost_connection(&mut self, conn: ConnHandle) {
        let Some(gconn) = self.tables.connections.remove(&conn) else { return };

        if let Some(peer) = gconn.peer {
            if self.tables.connected_nodes.get(&peer) == Some(&conn) {
                self.tables.connected_nodes.remove(&peer);
            }
        }
        self.tables.edges.shift_remove(&conn);

        if gconn.fetch_mode && !gconn.pending_fetch.is_empty() {
            for FetchItem { key, key_id } in gconn.pending_fetch {
                if let Some(state) = self.tables.fetches.get(&key).and_then(|b| b.get(&key_id)) {
                    let location = state.location.clone();
                    let retry_count = state.retry_count;
                    self.schedule_fetch_retry(key, key_id, location, retry_count);
                }
            }
        }
    }

    fn on_payload(&mut self, conn: ConnHandle, payload: Vec<u8>) {
        let handshake_received = match self.tables.connections.get(&conn) {
            Some(gconn) => gconn.handshake_received,
            None => return,
        };

        if !handshake_received {
            self.on_handshake_payload(conn, &payload);
            return;
        }

        let mut cursor: &[u8] = &payload;
        match Message::decode(&mut cursor) {
            Ok(Message::Keys(items)) => self.on_keys(items),
            Ok(Message::Query { sender: _, keys }) => self.on_query(conn, keys),
            Ok(Message::Nodes(items)) => self.on_nodes(items),
            Ok(Message::Fetch(items)) => self.reply_fetch(conn, &items),
            Ok(Message::Data(items)) => self.on_data(conn, items),
            Err(_) => self.endpoint.disconnect(conn),
        }
    }

    fn on_handshake_payload(&mut self, conn: ConnHandle, payload: &[u8]) {
        let mut cursor: &[u8] = payload;
        let hs = match Handshake::decode(&mut cursor) {
            Ok(hs) => hs,
            Err(_) => {
                self.endpoint.disconnect(conn);
                return;
            }
        };

        if let Some(gconn) = self.tables.connections.get_mut(&conn) {
            gconn.handshake_received = true;
        }

        // A piggy-backed message is only ever sent as a `Fetch` appended to
        // the handshake frame by a fetch-initiating connect — a
        // plain gossip handshake is always its own frame. If we see one,
        // this connection never joins `edges`/`connected_nodes`; we just
        // answer the fetch and leave it at that.
        if !cursor.is_empty() {
            if let Ok(Message::Fetch(items)) = Message::decode(&mut cursor) {
                if let Some(gconn) = self.tables.connections.get_mut(&conn) {
                    gconn.fetch_mode = true;
                }
                self.reply_fetch(conn, &items);
                return;
            }
        }

        // A connection *we* opened via `open_fetch` is already marked
        // `fetch_mode` before its handshake ever goes out — the
        // piggy-backed `Fetch` rides on *our* outbound frame, not the
        // peer's. The peer answers with a plain handshake (it has no
        // reason to know this is a fetch socket), so the piggy-back check
        // above never fires on the initiator side. Such a connection stays
        // in `AWAIT_DATA`: never join `edges`/`connected_nodes`, never send
        // the gossip bundle, just wait for the `Data` reply.
        if self.tables.connections.get(&conn).map_or(false, |g| g.fetch_mode) {
            return;
        }

        self.classify_gossip(conn, hs.node_id);
    }

    /// Confirms `conn` as a gossip-mode edge: dedupes against any existing
    /// connection to the same peer, joins `edges`/`connected_nodes`, and
    /// sends the per-connection Query/Keys/Nodes bundle.
    fn classify_gossip(&mut self, conn: ConnHandle, peer_id: NodeId) {
        // A connection opened via `random_connect` pre-registers the peer id
        // we expected to find at that address. If the handshake reveals a
        // different id (the nodes-table entry was stale and something else
        // now answers there), drop the stale `connected_nodes` mapping
        // rather than leave it pointing at a connection that turned out to
        // belong to someone else.
        if let Some(expected) = self.tables.connections.get(&conn).and_then(|g| g.peer) {
            if expected != peer_id && self.tables.connected_nodes.get(&expected) == Some(&conn) {
                self.tables.connected_nodes.remove(&expected);
            }
        }

        match self.tables.connected_nodes.get(&peer_id) {
            Some(&existing) if existing != conn => {
                self.endpoint.disconnect(conn);
                return;
            }
            Some(_) => {}
            None => {
                self.tables.connected_nodes.insert(peer_id, conn);
            }
        }

        if let Some(gconn) = self.tables.connections.get_mut(&conn) {
            gconn.peer = Some(peer_id);
        }
        if self.tables.edges.insert(conn) {
            self.tables.conn_expiration.push_back((conn, slick_util::time::wall_ms()));
        }

        self.send_gossip_bundle(conn);
    }

    fn send_gossip_bundle(&mut self, conn: ConnHandle) {
        if !self.tables.watches.is_empty() {
            let keys: Vec<String> = self.tables.watches.keys().cloned().collect();
            let msg = Message::Query { sender: self.location.clone(), keys };
            let mut buf = Vec::new();
            msg.encode(&mut buf);
            self.endpoint.send(conn, buf);
        }

        if !self.tables.data.is_empty() {
            let items: Vec<KeyItem> = self
                .tables
                .data
                .iter()
                .map(|(key, (key_id, _))| KeyItem {
                    key: key.clone(),
                    key_id: *key_id,
                    location: self.location.clone(),
                    ttl_ms: self.ttl_ms,
                })
                .collect();
            let msg = Message::Keys(items);
            let mut buf = Vec::new();
            msg.encode(&mut buf);
            self.endpoint.send(conn, buf);
        }

        let now = slick_util::time::wall_ms();
        let digest_size = Tables::log2_ceil(self.tables.nodes.len());
        let mut items = vec![NodeItem { node_id: self.node_id, location: self.location.clone(), ttl_ms: self.ttl_ms }];
        for item in self.tables.picks_random(digest_size, now, &mut self.rng, self.node_id) {
            items.push(NodeItem { node_id: item.id, location: item.addrs.clone(), ttl_ms: item.ttl(now) });
        }
        let msg = Message::Nodes(items);
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        self.endpoint.send(conn, buf);
    }

    fn on_keys(&mut self, items: Vec<KeyItem>) {
        let now = slick_util::time::wall_ms();
        let mut to_forward = Vec::new();

        for item in items {
            let KeyItem { key, key_id, location, ttl_ms } = item;
            let bucket = self.tables.keys.entry(key.clone()).or_default();
            let is_new = !bucket.contains_key(&key_id);

            match apply_forward_rule(bucket, key_id, location.clone(), ttl_ms, self.ttl_ms, now) {
                crate::gossip::tables::Forward::Suppressed => {}
                _ => to_forward.push(KeyItem { key: key.clone(), key_id, location: location.clone(), ttl_ms }),
            }

            if is_new && self.tables.watches.contains_key(&key) && location != self.location {
                self.initiate_fetch(key, key_id, location);
            }
        }

        if !to_forward.is_empty() {
            self.multicast_message(&Message::Keys(to_forward));
        }
    }

    fn on_query(&mut self, conn: ConnHandle, keys: Vec<String>) {
        let now = slick_util::time::wall_ms();
        let mut reply = Vec::new();
        for key in keys {
            let Some(bucket) = self.tables.keys.get(&key) else { continue };
            for (key_id, item) in bucket.iter() {
                let ttl = item.ttl(now);
                if ttl == 0 {
                    continue;
                }
                reply.push(KeyItem { key: key.clone(), key_id: *key_id, location: item.addrs.clone(), ttl_ms: ttl });
            }
        }
        if !reply.is_empty() {
            let msg = Message::Keys(reply);
            let mut buf = Vec::new();
            msg.encode(&mut buf);
            self.endpoint.send(conn, buf);
        }
    }

    fn on_nodes(&mut self, items: Vec<NodeItem>) {
        let now = slick_util::time::wall_ms();
        let mut to_forward = Vec::new();

        for item in items {
            if item.node_id == self.node_id {
                continue;
            }
            match apply_forward_rule(&mut self.tables.nodes, item.node_id, item.location.clone(), item.ttl_ms, self.ttl_ms, now) {
                crate::gossip::tables::Forward::Suppressed => {}
                _ => to_forward.push(NodeItem { node_id: item.node_id, location: item.location, ttl_ms: item.ttl_ms }),
            }
        }

        if !to_forward.is_empty() {
            self.multicast_message(&Message::Nodes(to_forward));
        }
    }

    fn reply_fetch(&mut self, conn: ConnHandle, items: &[FetchItem]) {
        let data_items: Vec<DataItem> = items
            .iter()
            .map(|item| {
                let payload = match self.tables.data.get(&item.key) {
                    Some((stored_id, payload)) if *stored_id == item.key_id => payload.clone(),
                    _ => Vec::new(),
                };
                DataItem { key: item.key.clone(), key_id: item.key_id, payload: slick_util::Bytes(payload) }
            })
            .collect();

        let msg = Message::Data(data_items);
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        self.endpoint.send(conn, buf);
    }

    fn on_data(&mut self, conn: ConnHandle, items: Vec<DataItem>) {
        for item in items {
            let DataItem { key, key_id, payload } = item;

            let prior = self.tables.fetches.get(&key).and_then(|b| b.get(&key_id)).map(|s| (s.location.clone(), s.retry_count));
            if let Some(bucket) = self.tables.fetches.get_mut(&key) {
                bucket.remove(&key_id);
                if bucket.is_empty() {
                    self.tables.fetches.remove(&key);
                }
            }
            if let Some(gconn) = self.tables.connections.get_mut(&conn) {
                gconn.pending_fetch.retain(|f| !(f.key == key && f.key_id == key_id));
            }

            if payload.0.is_empty() {
                if let Some((location, retry_count)) = prior {
                    self.schedule_fetch_retry(key, key_id, location, retry_count);
                }
                continue;
            }

            if let Some(watchers) = self.tables.watches.get(&key) {
                for watch in watchers {
                    (watch.callback)(watch.handle, key_id, payload.0.clone());
                }
            }
        }
        self.endpoint.disconnect(conn);
    }

    // ---- fetch path -------------------------------------------------

    fn initiate_fetch(&mut self, key: String, key_id: KeyId, location: NodeLocation) {
        if self.tables.fetches.get(&key).map_or(false, |b| b.contains_key(&key_id)) {
            return;
        }
        self.tables
            .fetches
            .entry(key.clone())
            .or_default()
            .insert(key_id, FetchState { location: location.clone(), retry_count: 0 });
        self.open_fetch(key, key_id, location);
    }

    fn open_fetch(&mut self, key: String, key_id: KeyId, location: NodeLocation) {
        let Some(addr) = location.first() else { return };
        let Ok(socket_addr) = addr.to_socket_addr() else { return };

        match self.endpoint.connect(socket_addr, true) {
            Some(handle) => {
                let mut gconn = GossipConn::new(slick_util::time::wall_ms());
                gconn.fetch_mode = true;
                gconn.pending_fetch.push(FetchItem { key, key_id });
                self.tables.connections.insert(handle, gconn);
            }
            // Connect failed synchronously (e.g. connection refused against
            // a loopback holder that already went away) — schedule a retry
            // rather than leaving the fetch silently stuck.
            None => self.schedule_fetch_retry(key, key_id, location, 0),
        }
    }

    fn schedule_fetch_retry(&mut self, key: String, key_id: KeyId, location: NodeLocation, prev_retry_count: u32) {
        let retry_count = prev_retry_count + 1;
        let now = slick_util::time::wall_ms();
        let deadline = now + retry_delay_ms(retry_count);
        self.tables
            .fetches
            .entry(key.clone())
            .or_default()
            .insert(key_id, FetchState { location, retry_count });
        self.tables.fetch_expiration.push_back((key, key_id, deadline));
    }

    fn process_fetch_retries(&mut self) {
        let now = slick_util::time::wall_ms();
        loop {
            match self.tables.fetch_expiration.front() {
                Some(&(_, _, deadline)) if deadline <= now => {}
                _ => break,
            }
            let (key, key_id, _) = self.tables.fetch_expiration.pop_front().unwrap();
            let Some(state) = self.tables.fetches.get(&key).and_then(|b| b.get(&key_id)) else { continue };
            let location = state.location.clone();
            self.open_fetch(key, key_id, location);
        }
    }

    // ---- periodic tick -------------------------------------------------

    fn tick(&mut self) {
        self.expire_nodes();
        self.expire_keys();
        self.process_fetch_retries();
        self.random_disconnect();
        self.random_connect();
        self.seed_recovery();
    }

    fn expire_nodes(&mut self) {
        let now = slick_util::time::wall_ms();
        while expire_one_sampled(&mut self.tables.nodes, now, &mut self.rng).is_some() {}
    }

    /// One random key bucket per tick, not every bucket — mirrors the
    /// bounded-per-tick-cost intent of `expire_one_sampled` one level up.
    fn expire_keys(&mut self) {
        if self.tables.keys.is_empty() {
            return;
        }
        let now = slick_util::time::wall_ms();
        let keys: Vec<String> = self.tables.keys.keys().cloned().collect();
        let key = &keys[self.rng.gen_range(0..keys.len())];

        let Some(bucket) = self.tables.keys.get_mut(key) else { return };
        let Some(expired_id) = expire_one_sampled(bucket, now, &mut self.rng) else { return };
        if bucket.is_empty() {
            self.tables.keys.remove(key);
        }
        if let Some(fbucket) = self.tables.fetches.get_mut(key) {
            fbucket.remove(&expired_id);
            if fbucket.is_empty() {
                self.tables.fetches.remove(key);
            }
        }
    }

    /// Baseline churn every tick (`min(⌈log₂(target)⌉, |connections|)`), not
    /// just a reaction to being over the target degree — this is what keeps
    /// the overlay rotating at steady state rather than freezing once it
    /// first reaches `target`. Bumped to the excess when `|connections|`
    /// actually exceeds `target`. Gauged against total `connections.len()`,
    /// the same count `random_connect` targets, not just `edges.len()`
    /// (fetch-mode sockets are never in `conn_expiration` to begin with, so
    /// they're never picked as victims regardless).
    fn random_disconnect(&mut self) {
        if self.tables.connections.is_empty() {
            return;
        }
        let target = Tables::log2_ceil(self.tables.nodes.len());
        let mut to_cut = Tables::log2_ceil(target).min(self.tables.connections.len());
        if self.tables.connections.len() > target {
            to_cut = to_cut.max(self.tables.connections.len() - target);
        }
        if to_cut == 0 {
            return;
        }
        let now = slick_util::time::wall_ms();
        let mut victims = Vec::new();

        while to_cut > 0 {
            let Some(&(handle, opened_at)) = self.tables.conn_expiration.front() else { break };
            if opened_at + self.conn_exp_thresh_ms >= now {
                break;
            }
            self.tables.conn_expiration.pop_front();
            // `ConnHandle` carries the `ConnId` minted at open time, so a
            // stale entry (the slot since reused by a different connection)
            // simply fails this lookup rather than needing an explicit
            // generation check.
            if self.tables.connections.contains_key(&handle) {
                victims.push(handle);
                to_cut -= 1;
            }
        }

        for handle in victims {
            self.endpoint.disconnect(handle);
        }
    }

    fn random_connect(&mut self) {
        let target = Tables::log2_ceil(self.tables.nodes.len());
        if self.tables.connections.len() >= target {
            return;
        }
        let mut needed = target - self.tables.connections.len();
        let now = slick_util::time::wall_ms();
        let mut attempts = self.tables.nodes.len().saturating_mul(2).max(4);

        while needed > 0 && attempts > 0 {
            attempts -= 1;
            let Some(node) = self.tables.pick_one(&mut self.rng) else { break };
            if node.is_expired(now) {
                continue;
            }
            let node_id = node.id;
            if self.tables.connected_nodes.contains_key(&node_id) {
                continue;
            }
            let Some(addr) = node.addrs.first() else { continue };
            let Ok(socket_addr) = addr.to_socket_addr() else { continue };
            needed -= 1;

            if let Some(handle) = self.endpoint.connect(socket_addr, false) {
                let mut gconn = GossipConn::new(now);
                gconn.peer = Some(node_id);
                self.tables.connections.insert(handle, gconn);
                self.tables.connected_nodes.insert(node_id, handle);
                self.tables.edges.insert(handle);
                self.tables.conn_expiration.push_back((handle, now));
            }
        }
    }

    fn seed_recovery(&mut self) {
        if !self.tables.connections.is_empty() {
            return;
        }
        let seeds = self.seeds.clone();
        for addr in seeds {
            let Ok(socket_addr) = addr.to_socket_addr() else { continue };
            if let Some(handle) = self.endpoint.connect(socket_addr, false) {
                self.tables.connections.insert(handle, GossipConn::new(slick_util::time::wall_ms()));
            }
        }
    }

    fn multicast_message(&mut self, msg: &Message) {
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        let edges: Vec<ConnHandle> = self.tables.edges.iter().copied().collect();
        self.endpoint.multicast(&edges, &buf);
    }
}
