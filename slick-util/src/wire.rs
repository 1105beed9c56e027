//! Manual, no-reflection serialization of the primitive alphabet the wire
//! protocol is built from: fixed-width integers, null-terminated strings,
//! length-prefixed opaque payloads, pairs/tuples and variable-length
//! sequences. Modeled on `flux::shared`'s hand-rolled `Serialize`/
//! `Deserialize` traits, generalized from single-message batches to the
//! full message grammar used by the gossip engine.
//!
//! All multi-byte integers are big-endian ("network byte order"). This is
//! deliberately distinct from the 2-byte little-endian length prefix used
//! to frame messages on the wire (see `slick_net::endpoint::frame`) — that
//! prefix belongs to the transport, not to this encoding.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{ErrorType, NetworkError, NetworkResult};

/// Appends the wire representation of `self` to `out`.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);
}

/// Parses a value off the front of `input`, advancing it past the bytes
/// consumed. Returns `NetworkError::Fatal(ErrorType::UnexpectedEnd)` if
/// `input` doesn't contain enough bytes for a complete value — this is
/// always a fatal protocol error, never a `Wait`: by the time a `Decode`
/// call is made the full frame has already been buffered by the endpoint,
/// so a short read here means the frame itself is malformed.
pub trait Decode: Sized {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self>;
}

#[inline]
fn take<'a>(input: &mut &'a [u8], n: usize) -> NetworkResult<&'a [u8]> {
    if input.len() < n {
        return Err(NetworkError::Fatal(ErrorType::UnexpectedEnd));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

macro_rules! impl_int {
    ($ty:ty, $width:expr, $read:ident, $write:ident) => {
        impl Encode for $ty {
            #[inline]
            fn encode(&self, out: &mut Vec<u8>) {
                let mut buf = [0u8; $width];
                BigEndian::$write(&mut buf, *self);
                out.extend_from_slice(&buf);
            }
        }

        impl Decode for $ty {
            #[inline]
            fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
                let bytes = take(input, $width)?;
                Ok(BigEndian::$read(bytes))
            }
        }
    };
}

impl_int!(u16, 2, read_u16, write_u16);
impl_int!(u32, 4, read_u32, write_u32);
impl_int!(u64, 8, read_u64, write_u64);
impl_int!(u128, 16, read_u128, write_u128);

impl Encode for u8 {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl Decode for u8 {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(take(input, 1)?[0])
    }
}

impl Encode for bool {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        (*self as u8).encode(out);
    }
}

impl Decode for bool {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(u8::decode(input)? != 0)
    }
}

/// A fixed-size byte array, encoded as raw bytes with no length prefix —
/// the length is part of the type, not the wire. Used for `NodeId`/`KeyId`.
impl<const N: usize> Encode for [u8; N] {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let bytes = take(input, N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }
}

/// Null-terminated string. Keys and hostnames in this system are never
/// expected to contain embedded NUL bytes; a string that does will decode
/// short, which shows up as a protocol error further up the stack rather
/// than silent corruption.
impl Encode for String {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
        out.push(0);
    }
}

impl Decode for String {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let end = input
            .iter()
            .position(|&b| b == 0)
            .ok_or(NetworkError::Fatal(ErrorType::InvalidString))?;
        let bytes = take(input, end)?;
        let s = String::from_utf8(bytes.to_vec())
            .map_err(|_| NetworkError::Fatal(ErrorType::InvalidString))?;
        // consume the terminator
        take(input, 1)?;
        Ok(s)
    }
}

/// An opaque, `u32`-length-prefixed byte blob — the application payload
/// carried inside `Keys`/`Data` messages. Distinct from `Vec<T>`'s
/// per-element sequence encoding: this is a single raw byte run, not a
/// sequence of one-byte elements.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Bytes(pub Vec<u8>);

impl Encode for Bytes {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        (self.0.len() as u32).encode(out);
        out.extend_from_slice(&self.0);
    }
}

impl Decode for Bytes {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let len = u32::decode(input)? as usize;
        let bytes = take(input, len)?;
        Ok(Bytes(bytes.to_vec()))
    }
}

/// Variable-length sequence: a `u32` element count followed by each
/// element encoded in order.
impl<T: Encode> Encode for Vec<T> {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    #[inline]
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let count = u32::decode(input)? as usize;
        let mut items = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            items.push(T::decode(input)?);
        }
        Ok(items)
    }
}

macro_rules! impl_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[inline]
            fn encode(&self, out: &mut Vec<u8>) {
                $(self.$idx.encode(out);)+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            #[inline]
            fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
                Ok(($($name::decode(input)?,)+))
            }
        }
    };
}

impl_tuple!(A: 0, B: 1);
impl_tuple!(A: 0, B: 1, C: 2);
impl_tuple!(A: 0, B: 1, C: 2, D: 3);

/// Encodes a complete value into a freshly allocated buffer. Convenience
/// wrapper around `Encode::encode` for call sites that don't already have
/// an output buffer to append to (e.g. building a full message).
pub fn encode_to_vec<T: Encode>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode(&mut out);
    out
}
