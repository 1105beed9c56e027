//! The wire's outermost layer: every payload is framed with a 2-byte
//! little-endian length prefix. This is deliberately separate from and
//! narrower than `slick_util::wire`'s big-endian content encoding — the
//! frame prefix belongs to the transport, not to any message a connection
//! carries.

use slick_util::error::{ErrorType, NetworkError};
use slick_util::NetworkResult;

/// 65,535 bytes: the largest payload a 2-byte length prefix can address.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Wraps `payload` in its 2-byte length prefix. Fails if the payload
/// can't fit the prefix's range — callers must reject oversize payloads
/// before attempting to queue them for send.
pub fn frame(payload: &[u8]) -> NetworkResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
    }

    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Attempts to pull one complete frame off the front of `buf`. Returns
/// `None` if `buf` doesn't yet hold a complete frame — the caller should
/// leave the bytes in place and wait for more to arrive. On success,
/// returns the payload slice and the total number of bytes (prefix
/// included) the caller should advance past.
pub fn try_decode(buf: &[u8]) -> Option<(&[u8], usize)> {
    if buf.len() < 2 {
        return None;
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    let total = 2 + len;
    if buf.len() < total {
        return None;
    }
    Some((&buf[2..total], total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_decode_roundtrip() {
        let payload = b"hello gossip";
        let framed = frame(payload).unwrap();
        let (decoded, total) = try_decode(&framed).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(total, framed.len());
    }

    #[test]
    fn partial_frame_is_not_decoded() {
        let framed = frame(b"0123456789").unwrap();
        assert!(try_decode(&framed[..3]).is_none());
        assert!(try_decode(&framed[..1]).is_none());
        assert!(try_decode(&[]).is_none());
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let huge = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(frame(&huge).is_err());
    }

    #[test]
    fn decode_leaves_trailing_bytes_in_place() {
        let mut framed = frame(b"one").unwrap();
        framed.extend(frame(b"two").unwrap());
        let (first, total) = try_decode(&framed).unwrap();
        assert_eq!(first, b"one");
        let (second, _) = try_decode(&framed[total..]).unwrap();
        assert_eq!(second, b"two");
    }
}
