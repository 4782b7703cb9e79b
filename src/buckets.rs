//! Bucket array backed by a runtime [`Block`].
//!
//! Each bucket is one little-endian `u64` holding the FFI form of the chain
//! head's arena key, or 0 for an empty chain. Arena keys always carry a
//! non-zero version in their upper half, so 0 never collides with a real key.

use crate::error::{Error, Result};
use crate::runtime::{Block, Runtime};
use slotmap::{Key, KeyData};

const SLOT_BYTES: usize = 8;

pub(crate) struct Buckets {
    block: Block,
    exponent: u32,
}

impl Buckets {
    /// `2^exponent` empty buckets from the runtime's allocator.
    pub(crate) fn allocate(rt: &Runtime, exponent: u32) -> Result<Buckets> {
        let size = 1usize
            .checked_shl(exponent)
            .and_then(|n| n.checked_mul(SLOT_BYTES))
            .ok_or(Error::OutOfMemory)?;
        let block = rt.allocate(size)?;
        Ok(Buckets { block, exponent })
    }

    pub(crate) fn exponent(&self) -> u32 {
        self.exponent
    }

    pub(crate) fn len(&self) -> usize {
        1usize << self.exponent
    }

    /// Bucket for a 32-bit hash: the low `exponent` bits.
    #[inline]
    pub(crate) fn index(&self, hash: u32) -> usize {
        (hash as usize) & (self.len() - 1)
    }

    pub(crate) fn head<K: Key>(&self, i: usize) -> Option<K> {
        let off = i * SLOT_BYTES;
        let mut raw = [0u8; SLOT_BYTES];
        raw.copy_from_slice(&self.block.as_slice()[off..off + SLOT_BYTES]);
        match u64::from_le_bytes(raw) {
            0 => None,
            ffi => Some(KeyData::from_ffi(ffi).into()),
        }
    }

    pub(crate) fn set_head<K: Key>(&mut self, i: usize, head: Option<K>) {
        let off = i * SLOT_BYTES;
        let ffi = head.map_or(0, |k| k.data().as_ffi());
        self.block.as_mut_slice()[off..off + SLOT_BYTES].copy_from_slice(&ffi.to_le_bytes());
    }

    pub(crate) fn into_block(self) -> Block {
        self.block
    }
}
