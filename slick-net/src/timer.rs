//! Periodic tick source for the gossip engine. The period is re-jittered
//! to a random value in `[base/2, base/2 + base]` on construction and
//! after every tick, so that nodes started around the same time don't
//! settle into lockstep ticking.

use std::time::{Duration, Instant};

use rand::Rng;

pub struct Timer {
    base_ms: u64,
    next_deadline: Instant,
}

impl Timer {
    pub fn new(base_ms: u64) -> Self {
        let mut timer = Timer {
            base_ms,
            next_deadline: Instant::now(),
        };
        timer.reschedule();
        timer
    }

    /// Changes the nominal period; takes effect on the next reschedule
    /// (i.e. after the currently pending tick fires).
    pub fn set_period(&mut self, base_ms: u64) {
        self.base_ms = base_ms;
    }

    pub fn period(&self) -> u64 {
        self.base_ms
    }

    fn reschedule(&mut self) {
        let jittered = jittered_period_ms(self.base_ms);
        self.next_deadline = Instant::now() + Duration::from_millis(jittered);
    }

    /// Duration until the next tick, for use as the `Poll::poll` timeout.
    /// `None` means the tick is already due and `poll` should not block.
    pub fn timeout(&self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.next_deadline {
            None
        } else {
            Some(self.next_deadline - now)
        }
    }

    pub fn is_due(&self) -> bool {
        Instant::now() >= self.next_deadline
    }

    /// Call once the tick has been handled; arms the next, freshly
    /// jittered deadline.
    pub fn fire(&mut self) {
        self.reschedule();
    }
}

/// `min = max(1, base/2)`, `max = min + base`, uniform in `[min, max]`.
pub fn jittered_period_ms(base_ms: u64) -> u64 {
    let min = (base_ms / 2).max(1);
    let max = min + base_ms;
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}
