use std::time::SystemTime;

/// Returns the current unix timestamp in whole milliseconds elapsed since
/// 1970-01-01. Used for `Item` expiration deadlines, which are always
/// expressed as an absolute wall-clock millisecond count rather than a
/// `Duration`, so that two nodes comparing TTLs over the wire agree on what
/// "now" means without needing to synchronize clocks on every tick.
#[inline]
pub fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Closed timelike curve, reality compromised")
        .as_millis() as u64
}

/// Unix timestamp in whole seconds. Kept separate from `wall_ms` because a
/// handful of callers (log timestamps, coarse housekeeping checks) only
/// ever want second resolution and shouldn't have to divide.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Closed timelike curve, reality compromised")
        .as_secs()
}
