//! Storage: chained hash table from `Bytes` keys to `Bytes` values.
//!
//! Layout
//! - Entries live in a `slotmap` arena; each owns one share of its key and
//!   one share of its value, and links to the next entry of its chain.
//! - The bucket array is a runtime block of chain heads, so its memory comes
//!   from the injected allocator and a failing allocator can veto a resize.
//!
//! Resizing
//! - Grow one level when a new key arrives and `count > grow_load * buckets`.
//! - Shrink `shrink_step` levels after a delete leaves
//!   `count * shrink_divisor < buckets`, never below `min_exponent`.
//! - A resize allocates the new array, relinks every entry node into it by
//!   recomputed bucket index, then frees the old array. Entries are moved,
//!   not copied, so no allocation happens mid-rebuild and thresholds are
//!   never re-checked during one. If the new array cannot be allocated the
//!   table keeps its current array and nothing is lost.

use crate::buckets::Buckets;
use crate::bytes::Bytes;
use crate::config::{StorageConfig, MAX_EXPONENT};
use crate::error::{Error, Result};
use crate::hash::{BytesHash, OneAtATime};
use crate::reentrancy::Reentrancy;
use crate::runtime::Runtime;
use core::fmt;
use core::mem::{self, ManuallyDrop};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    struct EntryKey;
}

struct Entry {
    key: Bytes,
    value: Bytes,
    next: Option<EntryKey>,
}

/// Where a key sits, or would sit, in its chain.
struct Location {
    bucket: usize,
    prev: Option<EntryKey>,
    found: Option<EntryKey>,
}

struct Table<H> {
    hasher: H,
    config: StorageConfig,
    buckets: ManuallyDrop<Buckets>,
    entries: SlotMap<EntryKey, Entry>,
    count: usize,
}

impl<H: BytesHash> Table<H> {
    fn bucket_of(&self, key: &Bytes) -> usize {
        let hash = self.hasher.hash32(&key.bytes());
        self.buckets.index(hash)
    }

    fn locate(&self, key: &Bytes) -> Location {
        let bucket = self.bucket_of(key);
        let mut prev = None;
        let mut cur = self.buckets.head(bucket);
        while let Some(k) = cur {
            let Some(entry) = self.entries.get(k) else {
                break;
            };
            if entry.key.content_eq(key) {
                return Location {
                    bucket,
                    prev,
                    found: Some(k),
                };
            }
            prev = Some(k);
            cur = entry.next;
        }
        Location {
            bucket,
            prev,
            found: None,
        }
    }

    fn set(&mut self, rt: &Runtime, re: &Reentrancy, key: &Bytes, value: &Bytes) -> Result<()> {
        key.live()?;
        value.live()?;
        let loc = self.locate(key);

        if let Some(entry) = loc.found.and_then(|k| self.entries.get_mut(k)) {
            let fresh = value.share()?;
            let old = mem::replace(&mut entry.value, fresh);
            if let Err(error) = old.release_inner(rt) {
                tracing::warn!(%error, "replaced value could not be released");
            }
            return Ok(());
        }

        let mut bucket = loc.bucket;
        let exponent = self.buckets.exponent();
        if self.count > self.config.grow_load.saturating_mul(self.buckets.len())
            && exponent < MAX_EXPONENT
            && self.resize(rt, re, exponent + 1)
        {
            bucket = self.bucket_of(key);
        }

        let key_share = key.share()?;
        let value_share = match value.share() {
            Ok(v) => v,
            Err(e) => {
                let _ = key_share.release_inner(rt);
                return Err(e);
            }
        };
        let next = self.buckets.head(bucket);
        let k = self.entries.insert(Entry {
            key: key_share,
            value: value_share,
            next,
        });
        self.buckets.set_head(bucket, Some(k));
        self.count += 1;
        Ok(())
    }

    fn get(&self, key: &Bytes) -> Result<Bytes> {
        key.live()?;
        match self.locate(key).found.and_then(|k| self.entries.get(k)) {
            Some(entry) => entry.value.share(),
            None => Err(Error::NotFound),
        }
    }

    fn delete(&mut self, rt: &Runtime, re: &Reentrancy, key: &Bytes) -> Result<bool> {
        key.live()?;
        let loc = self.locate(key);
        let Some(entry) = loc.found.and_then(|k| self.entries.remove(k)) else {
            return Ok(false);
        };
        match loc.prev.and_then(|p| self.entries.get_mut(p)) {
            Some(prev) => prev.next = entry.next,
            None => self.buckets.set_head(loc.bucket, entry.next),
        }
        self.count -= 1;
        // The entry is gone either way; a share that cannot be given back
        // stays with its payload.
        if let Err(error) = entry.key.release_inner(rt).and(entry.value.release_inner(rt)) {
            tracing::warn!(%error, "deleted entry could not release its buffers");
        }

        let exponent = self.buckets.exponent();
        if exponent > self.config.min_exponent
            && self.count.saturating_mul(self.config.shrink_divisor) < self.buckets.len()
        {
            let target = exponent
                .saturating_sub(self.config.shrink_step)
                .max(self.config.min_exponent);
            self.resize(rt, re, target);
        }
        Ok(true)
    }

    /// Rebuild at `2^exponent` buckets. Returns false, leaving the table as it
    /// was, if another resize is running or the new array cannot be allocated.
    fn resize(&mut self, rt: &Runtime, re: &Reentrancy, exponent: u32) -> bool {
        let Some(_g) = re.try_resize() else {
            return false;
        };
        let old_exponent = self.buckets.exponent();
        let fresh = match Buckets::allocate(rt, exponent) {
            Ok(b) => b,
            Err(error) => {
                tracing::warn!(
                    old_exponent,
                    new_exponent = exponent,
                    count = self.count,
                    %error,
                    "resize abandoned; keeping current bucket array"
                );
                return false;
            }
        };
        let old = mem::replace(&mut *self.buckets, fresh);

        let mut relinked = 0usize;
        for i in 0..old.len() {
            let mut cur = old.head::<EntryKey>(i);
            while let Some(k) = cur {
                let (next, bucket) = match self.entries.get(k) {
                    Some(e) => (e.next, self.bucket_of(&e.key)),
                    None => break,
                };
                if let Some(e) = self.entries.get_mut(k) {
                    e.next = self.buckets.head(bucket);
                }
                self.buckets.set_head(bucket, Some(k));
                relinked += 1;
                cur = next;
            }
        }
        debug_assert_eq!(relinked, self.count);
        self.count = relinked;

        if rt.free(Some(old.into_block())).is_err() {
            tracing::warn!("allocator rejected the old bucket array");
        }
        tracing::debug!(
            old_exponent,
            new_exponent = exponent,
            count = self.count,
            "storage resized"
        );
        true
    }
}

/// In-memory key-value table bound to a [`Runtime`].
///
/// `set` and `delete` copy-share their arguments as needed; callers keep, and
/// must still release, the handles they pass in. `get` returns a fresh share
/// the caller owns. Dropping the table releases every stored key and value
/// and returns the bucket array to the runtime.
pub struct Storage<'rt, H = OneAtATime> {
    rt: &'rt Runtime,
    table: Table<H>,
    reentrancy: Reentrancy,
}

impl<'rt> Storage<'rt> {
    /// Empty table with the default hash and sizing policy (16 buckets).
    pub fn new(rt: &'rt Runtime) -> Result<Self> {
        Self::with_hasher(rt, OneAtATime)
    }
}

impl<'rt, H: BytesHash> Storage<'rt, H> {
    pub fn with_hasher(rt: &'rt Runtime, hasher: H) -> Result<Self> {
        Self::with_config(rt, hasher, StorageConfig::default())
    }

    pub fn with_config(rt: &'rt Runtime, hasher: H, config: StorageConfig) -> Result<Self> {
        let res = config
            .validate()
            .and_then(|()| Buckets::allocate(rt, config.initial_exponent))
            .map(|buckets| Storage {
                rt,
                table: Table {
                    hasher,
                    config,
                    buckets: ManuallyDrop::new(buckets),
                    entries: SlotMap::with_key(),
                    count: 0,
                },
                reentrancy: Reentrancy::new(),
            });
        rt.track(res)
    }

    /// Map `key` to `value`, replacing any previous value. On failure the
    /// table is unchanged.
    pub fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<()> {
        let _g = self.reentrancy.enter();
        let res = self.table.set(self.rt, &self.reentrancy, key, value);
        self.rt.track(res)
    }

    /// A new share of the value stored for `key`, or `NotFound`.
    pub fn get(&self, key: &Bytes) -> Result<Bytes> {
        let _g = self.reentrancy.enter();
        let res = self.table.get(key);
        self.rt.track(res)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &Bytes) -> Result<bool> {
        let _g = self.reentrancy.enter();
        let res = self.table.delete(self.rt, &self.reentrancy, key);
        self.rt.track(res)
    }

    pub fn contains(&self, key: &Bytes) -> Result<bool> {
        let _g = self.reentrancy.enter();
        let res = key.live().map(|()| self.table.locate(key).found.is_some());
        self.rt.track(res)
    }

    /// Live entries.
    pub fn count(&self) -> usize {
        self.rt.set_last_error(None);
        self.table.count
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Current number of buckets.
    pub fn capacity(&self) -> usize {
        self.rt.set_last_error(None);
        self.table.buckets.len()
    }

    /// Current bucket-count exponent.
    pub fn exponent(&self) -> u32 {
        self.rt.set_last_error(None);
        self.table.buckets.exponent()
    }

    pub fn config(&self) -> &StorageConfig {
        self.rt.set_last_error(None);
        &self.table.config
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.rt.set_last_error(None);
        self.rt
    }
}

impl<H> Drop for Storage<'_, H> {
    fn drop(&mut self) {
        let rt = self.rt;
        for (_, entry) in self.table.entries.drain() {
            let _ = entry.key.release_inner(rt);
            let _ = entry.value.release_inner(rt);
        }
        // SAFETY: the bucket array is not touched again after this point.
        let buckets = unsafe { ManuallyDrop::take(&mut self.table.buckets) };
        let res = rt.free(Some(buckets.into_block()));
        rt.set_last_error(res.err());
    }
}

impl<H> fmt::Debug for Storage<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("count", &self.table.count)
            .field("exponent", &self.table.buckets.exponent())
            .finish_non_exhaustive()
    }
}
