//! The gossip/membership protocol and the pull-based fetch path: bounded
//! fan-out broadcast of key/node advertisements with
//! TTL-based expiry, randomized connect/disconnect to approximate a
//! logarithmic-degree overlay, and one-shot fetch connections that resolve
//! a watched key to its payload.

pub mod api;
pub mod engine;
pub mod message;
pub mod ops;
pub mod tables;

pub use api::{Config, GossipError, GossipResult, PeerDiscovery, SlickDiscovery, SlickEngine, StaticDiscovery};
