//! Shared plumbing for the `slick` peer discovery stack: time sources,
//! id-grade randomness, logging setup, the network error type and the
//! wire serialization primitives. Everything here is deliberately inert —
//! no sockets, no event loop, no gossip state — so that `slick-net` and
//! anything built on top of it can depend on a small, stable base.

pub mod crypto;
pub mod error;
pub mod logging;
pub mod time;
pub mod wire;

pub use error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use wire::{Bytes, Decode, Encode};
