use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::Token;

use slick_util::error::NetworkError;
use slick_util::NetworkResult;

use crate::buffer::Buffer;
use crate::ids::ConnId;

/// Bound on the per-connection send queue. Overflow drops the new
/// payload rather than growing unbounded.
pub const MAX_SEND_QUEUE: usize = 256;

/// Size of the receive-side ring. Reads are pulled into this buffer a
/// syscall at a time until the kernel reports `WouldBlock` or the peer
/// closes; frames are decoded out of it between reads. Two increments
/// (not one): a maximal frame is `2 + MAX_FRAME_LEN` = 65,537 bytes, one
/// byte over a single 65,536-byte increment, so a single increment would
/// make the largest legal frame always trip `Buffer`'s overrun error
/// before it fully arrived.
const RECV_BUFFER_SIZE: usize = 2 * 65536;

pub(crate) struct Connection {
    pub id: ConnId,
    pub token: Token,
    pub stream: TcpStream,
    pub peer_addr: Option<SocketAddr>,
    pub fetch_mode: bool,
    /// True once the kernel last accepted a write; cleared on `WouldBlock`
    /// and restored by the next writable-readiness event.
    pub writable: bool,
    send_queue: VecDeque<(Vec<u8>, usize)>,
    recv_buf: Buffer,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl Connection {
    pub fn new(id: ConnId, token: Token, stream: TcpStream, fetch_mode: bool) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Connection {
            id,
            token,
            stream,
            peer_addr,
            fetch_mode,
            writable: true,
            send_queue: VecDeque::new(),
            recv_buf: Buffer::new(RECV_BUFFER_SIZE),
            bytes_sent: 0,
            bytes_recv: 0,
        }
    }

    /// Queues an already-framed payload for sending. Returns `false`
    /// (caller drops and notifies) when the queue is at capacity.
    pub fn queue_send(&mut self, framed: Vec<u8>) -> bool {
        if self.send_queue.len() >= MAX_SEND_QUEUE {
            return false;
        }
        self.send_queue.push_back((framed, 0));
        true
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// Attempts to drain the send queue. `Ok(true)` means fully flushed;
    /// `Ok(false)` means the socket blocked with bytes still queued;
    /// `Err` is a fatal condition the caller should treat as a disconnect.
    pub fn flush(&mut self) -> NetworkResult<bool> {
        if !self.writable {
            return Ok(false);
        }

        while let Some((payload, mut offset)) = self.send_queue.pop_front() {
            loop {
                match self.stream.write(&payload[offset..]) {
                    Ok(0) => {
                        return Err(NetworkError::from(io::Error::from(
                            io::ErrorKind::WriteZero,
                        )));
                    }
                    Ok(n) => {
                        offset += n;
                        self.bytes_sent += n as u64;
                        if offset >= payload.len() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        self.writable = false;
                        self.send_queue.push_front((payload, offset));
                        return Ok(false);
                    }
                    Err(e) => return Err(NetworkError::from(e)),
                }
            }
        }

        Ok(true)
    }

    /// Reads and decodes as many complete frames as are currently
    /// available. The second element of the result is `true` if the peer
    /// performed a graceful close during this call — any frames decoded
    /// before the close are still returned and should be dispatched
    /// first.
    pub fn read_frames(&mut self) -> NetworkResult<(Vec<Vec<u8>>, bool)> {
        let mut frames = Vec::new();
        loop {
            match self.recv_buf.ingress(&mut self.stream) {
                Ok(n) => {
                    // `Buffer::ingress` only returns `Ok` on a zero-length
                    // terminal read; `n` counts whatever made it in before
                    // the close was observed.
                    self.bytes_recv += n as u64;
                    self.drain_frames(&mut frames);
                    return Ok((frames, true));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.drain_frames(&mut frames);
                    return Ok((frames, false));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::from(e)),
            }
        }
    }

    fn drain_frames(&mut self, out: &mut Vec<Vec<u8>>) {
        loop {
            let slice = self.recv_buf.read_slice();
            match crate::endpoint::frame::try_decode(slice) {
                Some((payload, total)) => {
                    out.push(payload.to_vec());
                    self.recv_buf.move_head(total);
                }
                None => break,
            }
        }
    }
}
