//! Identifier types and the two process-wide atomic counters the gossip
//! engine needs: `WatchHandle` (handed back from `discover` so a caller can
//! later `forget`) and `ConnId` (paired with the OS descriptor to
//! disambiguate descriptor reuse after a socket closes and a new one gets
//! the same fd).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use slick_util::crypto::random_bytes;
use slick_util::wire::{Decode, Encode};
use slick_util::NetworkResult;

/// 128-bit identifier for a node, drawn once at startup from the crypto
/// random source.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u128);

/// 128-bit identifier for a published key version. A fresh `KeyId` is
/// minted on every `publish`, including republication of the same key
/// string — this is what lets peers tell two versions of a key apart.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct KeyId(pub u128);

macro_rules! impl_random_id {
    ($ty:ident) => {
        impl $ty {
            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                random_bytes(&mut bytes);
                $ty(u128::from_be_bytes(bytes))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl Encode for $ty {
            #[inline]
            fn encode(&self, out: &mut Vec<u8>) {
                self.0.encode(out)
            }
        }

        impl Decode for $ty {
            #[inline]
            fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
                Ok($ty(u128::decode(input)?))
            }
        }
    };
}

impl_random_id!(NodeId);
impl_random_id!(KeyId);

/// Returned by `discover`, kept by the caller to later `forget` a watch.
/// Unique within the process, never reused.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchHandle(pub u64);

/// Pairs an OS descriptor with a monotonic id so a stale reference to a
/// closed connection can be told apart from whatever new connection the
/// kernel hands out the same descriptor number next.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConnId(pub u64);

static NEXT_WATCH_HANDLE: AtomicU64 = AtomicU64::new(1);
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_watch_handle() -> WatchHandle {
    WatchHandle(NEXT_WATCH_HANDLE.fetch_add(1, Ordering::Relaxed))
}

pub fn next_conn_id() -> ConnId {
    ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_random_and_distinct() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn counters_are_monotonic_and_never_repeat() {
        let a = next_watch_handle();
        let b = next_watch_handle();
        assert!(b.0 > a.0);

        let c = next_conn_id();
        let d = next_conn_id();
        assert!(d.0 > c.0);
    }

    #[test]
    fn id_encoding_roundtrips() {
        use slick_util::wire::encode_to_vec;

        let id = NodeId::random();
        let bytes = encode_to_vec(&id);
        let mut cursor = &bytes[..];
        assert_eq!(id, NodeId::decode(&mut cursor).unwrap());
    }
}
