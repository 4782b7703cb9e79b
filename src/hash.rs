//! 32-bit key hashing for the storage engine.

/// Hash of a key's raw bytes. The table masks the result down to its current
/// bucket-count width, so the low bits should be well mixed.
pub trait BytesHash {
    fn hash32(&self, bytes: &[u8]) -> u32;
}

impl<F> BytesHash for F
where
    F: Fn(&[u8]) -> u32,
{
    fn hash32(&self, bytes: &[u8]) -> u32 {
        self(bytes)
    }
}

/// Bob Jenkins' one-at-a-time hash: cheap, avalanching, not cryptographic.
#[derive(Debug, Default, Copy, Clone)]
pub struct OneAtATime;

impl BytesHash for OneAtATime {
    #[inline]
    fn hash32(&self, bytes: &[u8]) -> u32 {
        default_bytes_hash32(bytes)
    }
}

/// The default hash used by [`Storage`](crate::Storage).
pub fn default_bytes_hash32(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in bytes {
        h = h.wrapping_add(u32::from(b));
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}
