use ctor::ctor;

/// Initialize the sodium infrastructure. Every process linking this crate
/// gets exactly one init, regardless of how many `random_bytes` calls are
/// made or from how many threads.
#[ctor]
fn init_sodium() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("Cryptography initialization failed")
        }
    }
}

/// Fills the provided buffer with cryptographically secure random bytes.
/// Used exclusively to mint `NodeId`/`KeyId` values; the core has no other
/// use for cryptographic randomness since it does not authenticate peers
/// or encrypt the wire (see Non-goals).
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut std::ffi::c_void, out.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_buffer_and_varies() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        random_bytes(&mut a);
        random_bytes(&mut b);
        assert_ne!(a, [0u8; 16]);
        assert_ne!(a, b);
    }
}
