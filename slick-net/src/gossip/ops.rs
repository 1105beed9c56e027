//! The operations funneled from any thread, through a `Defer<GossipOp>`,
//! onto the poll thread, generalized from the endpoint's send/connect
//! ops to the gossip-level public API.

use crate::ids::{KeyId, WatchHandle};

pub type WatchCallback = Box<dyn Fn(WatchHandle, KeyId, Vec<u8>) + Send + 'static>;

pub enum GossipOp {
    Publish { key: String, payload: Vec<u8> },
    Retract { key: String },
    Discover { key: String, handle: WatchHandle, callback: WatchCallback },
    Forget { key: String, handle: WatchHandle },
    Lost { key: String, key_id: KeyId },
    SetPeriod(u64),
    SetTtl(u64),
    SetConnExpThresh(u64),
    Shutdown,
}
