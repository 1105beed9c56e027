//! Integration tests driving real loopback TCP between two or more
//! in-process `SlickDiscovery` instances, covering the numbered
//! end-to-end scenarios a standalone multi-host driver would exercise.
//! These tests just run multiple engines in one test process, each on
//! its own poll thread, which is enough to observe the same behavior.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use slick_net::{Address, Config, KeyId, PeerDiscovery, SlickDiscovery, StaticDiscovery, WatchHandle};

/// Spawns one swarm member listening on `port`, seeded on `seeds`, with a
/// fast jittered tick so tests don't need to wait out a production-sized
/// gossip period. Returns the thread-safe handle and the join handle for
/// its dedicated poll thread; callers should `discovery.shutdown()` then
/// `join()` at the end of the test.
fn spawn_node(port: u16, seeds: Vec<Address>) -> (SlickDiscovery, thread::JoinHandle<()>) {
    spawn_node_with_ttl(port, seeds, 60_000)
}

fn spawn_node_with_ttl(port: u16, seeds: Vec<Address>, ttl_ms: u64) -> (SlickDiscovery, thread::JoinHandle<()>) {
    let config = Config {
        port,
        seeds,
        advertise_host: "127.0.0.1".to_string(),
        ttl_ms,
        period_ms: 10,
        conn_exp_thresh_ms: 60_000,
    };
    let log = slick_util::logging::discard();
    let (discovery, mut engine) = SlickDiscovery::new(config, log).expect("engine construction");
    let join = thread::spawn(move || {
        engine.run(Duration::from_millis(20)).expect("engine run");
    });
    (discovery, join)
}

fn shutdown(discovery: SlickDiscovery, join: thread::JoinHandle<()>) {
    discovery.shutdown();
    join.join().expect("poll thread panicked");
}

type Delivery = (WatchHandle, KeyId, Vec<u8>);

fn capturing_callback() -> (Box<dyn Fn(WatchHandle, KeyId, Vec<u8>) + Send + 'static>, mpsc::Receiver<Delivery>) {
    let (tx, rx) = mpsc::channel::<Delivery>();
    let cb = move |handle: WatchHandle, key_id: KeyId, payload: Vec<u8>| {
        let _ = tx.send((handle, key_id, payload));
    };
    (Box::new(cb), rx)
}

/// Scenario 1: discover-before-publish. A watches "k0" before B ever
/// publishes it; once B publishes, A's watcher should fire exactly once
/// with the payload.
#[test]
fn discover_before_publish() {
    let (a, a_join) = spawn_node(18930, Vec::new());
    let (b, b_join) = spawn_node(18931, vec![Address::new("127.0.0.1", 18930)]);

    let (cb, rx) = capturing_callback();
    a.discover("k0", cb).unwrap();

    b.publish("k0", vec![1, 2, 3]).unwrap();

    let (_, _, payload) = rx.recv_timeout(Duration::from_secs(5)).expect("watcher fired");
    assert_eq!(payload, vec![1, 2, 3]);
    assert!(rx.try_recv().is_err(), "watcher should fire exactly once");

    shutdown(a, a_join);
    shutdown(b, b_join);
}

/// Scenario 2: publish-before-discover. A publishes "k1" first; B's later
/// `discover` call should still resolve it via the `Query`/`Keys`
/// exchange that happens when the gossip edge forms.
#[test]
fn publish_before_discover() {
    let (a, a_join) = spawn_node(18932, Vec::new());
    let (b, b_join) = spawn_node(18933, vec![Address::new("127.0.0.1", 18932)]);

    a.publish("k1", vec![4, 5, 6, 7]).unwrap();

    // give the edge a moment to form and the initial Keys bundle to land
    thread::sleep(Duration::from_millis(200));

    let (cb, rx) = capturing_callback();
    b.discover("k1", cb).unwrap();

    let (_, _, payload) = rx.recv_timeout(Duration::from_secs(5)).expect("watcher fired");
    assert_eq!(payload, vec![4, 5, 6, 7]);

    shutdown(a, a_join);
    shutdown(b, b_join);
}

/// Republishing the same key mints a fresh KeyId and delivers the new
/// payload to a watcher that was already subscribed — the idempotence
/// property restated for the common "update" case.
#[test]
fn republish_delivers_new_payload_with_new_key_id() {
    let (a, a_join) = spawn_node(18934, Vec::new());
    let (b, b_join) = spawn_node(18935, vec![Address::new("127.0.0.1", 18934)]);

    let (cb, rx) = capturing_callback();
    b.discover("k2", cb).unwrap();

    a.publish("k2", vec![1]).unwrap();
    let (_, first_id, first_payload) = rx.recv_timeout(Duration::from_secs(5)).expect("first publish delivered");
    assert_eq!(first_payload, vec![1]);

    a.publish("k2", vec![2]).unwrap();
    let (_, second_id, second_payload) = rx.recv_timeout(Duration::from_secs(5)).expect("second publish delivered");
    assert_eq!(second_payload, vec![2]);
    assert_ne!(first_id, second_id, "republish must mint a fresh KeyId");

    shutdown(a, a_join);
    shutdown(b, b_join);
}

/// `forget` stops further deliveries to a watcher without disturbing
/// others still registered on the same key.
#[test]
fn forget_stops_delivery_to_that_watcher_only() {
    let (a, a_join) = spawn_node(18936, Vec::new());
    let (b, b_join) = spawn_node(18937, vec![Address::new("127.0.0.1", 18936)]);

    let (cb1, rx1) = capturing_callback();
    let (cb2, rx2) = capturing_callback();
    let h1 = b.discover("k3", cb1).unwrap();
    b.discover("k3", cb2).unwrap();

    a.publish("k3", vec![9]).unwrap();
    rx1.recv_timeout(Duration::from_secs(5)).expect("watcher 1 got first publish");
    rx2.recv_timeout(Duration::from_secs(5)).expect("watcher 2 got first publish");

    b.forget("k3", h1).unwrap();

    a.publish("k3", vec![10]).unwrap();
    rx2.recv_timeout(Duration::from_secs(5)).expect("watcher 2 still subscribed");
    assert!(
        rx1.recv_timeout(Duration::from_millis(500)).is_err(),
        "forgotten watcher must not receive further deliveries"
    );

    shutdown(a, a_join);
    shutdown(b, b_join);
}

/// Tuning setters are fire-and-forget deferred ops; this just confirms
/// they don't panic or wedge the poll thread when called from off-thread.
#[test]
fn tuning_setters_do_not_disturb_the_poll_loop() {
    let (a, a_join) = spawn_node(18938, Vec::new());

    a.period(25);
    a.ttl(120_000);
    a.conn_exp_thresh(5_000);

    // The engine should still be alive and able to service a publish
    // after the tuning ops have been applied.
    a.publish("k4", vec![42]).unwrap();
    thread::sleep(Duration::from_millis(100));

    shutdown(a, a_join);
}

/// `StaticDiscovery` is an intentional stub: every mutating method must
/// reject rather than silently no-op or panic.
#[test]
fn static_discovery_rejects_all_mutating_calls() {
    let node_id = slick_net::NodeId::random();
    let location = slick_net::NodeLocation::single(Address::new("127.0.0.1", 0));
    let stub = StaticDiscovery::new(node_id, location.clone());

    assert_eq!(stub.id(), node_id);
    assert_eq!(stub.node(), location);

    assert!(stub.publish("k", vec![1]).is_err());
    assert!(stub.retract("k").is_err());
    let (cb, _rx) = capturing_callback();
    assert!(stub.discover("k", cb).is_err());
    assert!(stub.forget("k", WatchHandle(1)).is_err());
    assert!(stub.lost("k", KeyId::random()).is_err());

    assert_eq!(stub.rejected_calls(), 5);
}

/// Scenario 3: seed recovery. B is killed, then restarted on the same port
/// still seeded on A; its own seed-recovery tick (it starts with zero
/// connections) reconnects it to A without any help from A having tracked
/// the old B. Once the edge re-forms, a fresh discover/publish round trip
/// confirms the swarm is actually usable again, not just reconnected at
/// the socket level.
#[test]
fn seed_recovery_reconnects_after_restart() {
    let (a, a_join) = spawn_node(18944, Vec::new());
    let (b, b_join) = spawn_node(18945, vec![Address::new("127.0.0.1", 18944)]);

    // let the initial edge form
    thread::sleep(Duration::from_millis(200));
    shutdown(b, b_join);
    // let a observe the lost connection and fall back to zero peers
    thread::sleep(Duration::from_millis(200));

    let (b2, b2_join) = spawn_node(18945, vec![Address::new("127.0.0.1", 18944)]);

    let (cb, rx) = capturing_callback();
    b2.discover("k6", cb).unwrap();
    a.publish("k6", vec![42]).unwrap();

    let (_, _, payload) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("seed recovery should re-establish a usable edge to A");
    assert_eq!(payload, vec![42]);

    shutdown(a, a_join);
    shutdown(b2, b2_join);
}

/// Scenario 4: TTL expiry. A publishes "k5" with a short TTL and goes
/// quiet; once enough wall time has passed, B's own `keys["k5"]` bucket
/// should be empty — a later `discover` finds nothing to fetch and never
/// gets a delivery.
#[test]
fn expired_key_is_absent_from_peer_tables() {
    let (a, a_join) = spawn_node_with_ttl(18940, Vec::new(), 50);
    let (b, b_join) = spawn_node(18941, vec![Address::new("127.0.0.1", 18940)]);

    a.publish("k5", vec![7]).unwrap();

    // Long enough for the edge to form, the publication to propagate to
    // B, and for both A's and B's sampled expiry to have caught up with
    // the 50ms TTL several times over.
    thread::sleep(Duration::from_millis(700));

    let (cb, rx) = capturing_callback();
    b.discover("k5", cb).unwrap();

    assert!(
        rx.recv_timeout(Duration::from_millis(500)).is_err(),
        "an expired key must not still be fetchable from a peer's table"
    );

    shutdown(a, a_join);
    shutdown(b, b_join);
}
