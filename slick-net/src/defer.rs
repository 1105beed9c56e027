//! Cross-thread defer queues: a fixed-capacity MPSC ring coupled to a
//! `mio::Waker` so that a push from any thread wakes the poll thread out
//! of its readiness wait. `push` is lock-protected among producers; only
//! the poll thread ever calls `drain`.
//!
//! Control operations (`connect`/`disconnect`/`discover`/`forget`/`lost`)
//! get a capacity-16 queue and spin-retry on a full queue — they carry no
//! payload to drop. Payload-bearing operations (`send`/`broadcast`/
//! `publish`) get a capacity-64 queue and drop on overflow, surfacing the
//! drop through `onDroppedPayload` rather than spinning.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use mio::Waker;

pub const CONTROL_CAPACITY: usize = 16;
pub const PAYLOAD_CAPACITY: usize = 64;

pub struct Defer<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    waker: Arc<Waker>,
}

impl<T> Defer<T> {
    pub fn new(capacity: usize, waker: Arc<Waker>) -> Self {
        Defer {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            waker,
        }
    }

    /// Tries to enqueue once. On a full queue, returns the value back to
    /// the caller instead of blocking or dropping it.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            return Err(value);
        }
        queue.push_back(value);
        drop(queue);
        // Waking is best-effort: if the poll thread is already awake and
        // about to drain, a failed wake is harmless.
        let _ = self.waker.wake();
        Ok(())
    }

    /// Spin-retries `try_push` until it succeeds. Used by control ops
    /// that must never be silently dropped.
    pub fn push_spin(&self, value: T) {
        let mut value = value;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(v) => {
                    value = v;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Tries to enqueue once; returns `false` on overflow without
    /// retrying. Used by payload-bearing ops, where the caller maps a
    /// `false` into a dropped-payload notification.
    pub fn try_push_or_drop(&self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// Drains at most `max` entries (or all of them, if `max == 0`),
    /// invoking `f` for each. Items are collected under the lock and the
    /// lock released before any callback runs, so a callback that
    /// re-enters this defer (a handler calling `publish` inline, say)
    /// doesn't deadlock against itself.
    pub fn drain(&self, max: usize, mut f: impl FnMut(T)) -> usize {
        let items: Vec<T> = {
            let mut queue = self.queue.lock().unwrap();
            let limit = if max == 0 { queue.len() } else { max.min(queue.len()) };
            queue.drain(..limit).collect()
        };
        let count = items.len();
        for item in items {
            f(item);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
