//! `slick-net`: the peer-to-peer service-discovery substrate built on top
//! of `slick-util`'s wire/time/crypto/logging primitives.
//!
//! [`endpoint`] is the framed, multiplexed transport; [`gossip`] is the
//! membership/fetch protocol built on top of it and the public API
//! surface embedders actually construct.

pub mod buffer;
pub mod defer;
pub mod endpoint;
pub mod gossip;
pub mod ids;
pub mod item;
pub mod location;
pub mod timer;

pub use gossip::api::{
    Config, GossipError, GossipResult, PeerDiscovery, SlickDiscovery, SlickEngine, StaticDiscovery,
};
pub use ids::{ConnId, KeyId, NodeId, WatchHandle};
pub use location::{Address, NodeLocation};
