//! Immutable, reference-counted byte buffers.
//!
//! A `Bytes` is a handle to a shared payload. `copy` is O(1): it bumps the
//! payload's count and hands back another handle to the same memory. Every
//! handle obtained from `new` or `copy` must be given back with `release`;
//! the payload's block returns to the runtime's allocator when the last one
//! is released. Each handle carries its own share, so releasing the same
//! handle twice is `InvalidArgument` even while other handles keep the
//! payload alive. Handles that are dropped without a release keep the block
//! out of the allocator, which its accounting reports as a leak.
//!
//! Payloads are never written after creation, which is what makes sharing
//! them between handles sound.

use crate::error::{Error, Result};
use crate::refcount::RefCount;
use crate::runtime::{Block, Runtime};
use core::cell::{Cell, Ref, RefCell};
use core::fmt;
use std::rc::Rc;

struct Payload {
    refs: RefCount,
    len: usize,
    // `None` for empty payloads and once the last holder released.
    block: RefCell<Option<Block>>,
}

/// Handle to a shared, immutable byte payload.
pub struct Bytes {
    inner: Rc<Payload>,
    // Set once this handle's share has been given back.
    released: Cell<bool>,
}

impl Bytes {
    /// Copy `data` into a new payload owned by the returned handle. Empty
    /// payloads take no memory from the allocator.
    pub fn new(rt: &Runtime, data: &[u8]) -> Result<Bytes> {
        let res = Self::alloc(rt, data);
        rt.track(res)
    }

    /// Build from an optional source and a signed size. A negative size is
    /// `InvalidArgument`; a missing source yields an empty buffer whatever the
    /// size says. `size` may not exceed the source.
    pub fn from_raw_parts(rt: &Runtime, src: Option<&[u8]>, size: isize) -> Result<Bytes> {
        let res = usize::try_from(size)
            .map_err(|_| Error::InvalidArgument)
            .and_then(|size| match src {
                None => Ok(&[][..]),
                Some(s) => s.get(..size).ok_or(Error::InvalidArgument),
            })
            .and_then(|data| Self::alloc(rt, data));
        rt.track(res)
    }

    fn alloc(rt: &Runtime, data: &[u8]) -> Result<Bytes> {
        let block = if data.is_empty() {
            None
        } else {
            let mut b = rt.allocate(data.len())?;
            b.as_mut_slice().copy_from_slice(data);
            Some(b)
        };
        Ok(Bytes {
            inner: Rc::new(Payload {
                refs: RefCount::one(),
                len: data.len(),
                block: RefCell::new(block),
            }),
            released: Cell::new(false),
        })
    }

    /// Another handle to the same payload. Must be released like any other.
    pub fn copy(&self, rt: &Runtime) -> Result<Bytes> {
        let res = self.share();
        rt.track(res)
    }

    pub(crate) fn share(&self) -> Result<Bytes> {
        self.live()?;
        self.inner.refs.acquire()?;
        Ok(Bytes {
            inner: Rc::clone(&self.inner),
            released: Cell::new(false),
        })
    }

    pub fn length(&self, rt: &Runtime) -> Result<usize> {
        let res = self.live().map(|()| self.inner.len);
        rt.track(res)
    }

    /// Read-only view of the payload. Other handles may be reading the same
    /// memory.
    pub fn view(&self, rt: &Runtime) -> Result<Ref<'_, [u8]>> {
        let res = self.live().map(|()| self.bytes());
        rt.track(res)
    }

    /// Content equality with an identity fast path. Two absent buffers are
    /// equal; an absent and a present one are not. Released handles are
    /// `InvalidArgument`.
    pub fn equal(rt: &Runtime, a: Option<&Bytes>, b: Option<&Bytes>) -> Result<bool> {
        let res = match (a, b) {
            (None, None) => Ok(true),
            (Some(a), None) | (None, Some(a)) => a.live().map(|()| false),
            (Some(a), Some(b)) => a.live().and(b.live()).map(|()| a.content_eq(b)),
        };
        rt.track(res)
    }

    /// Give this handle's share back. The block is freed with the last share.
    /// Releasing the same handle again is `InvalidArgument` and leaves every
    /// other share untouched.
    pub fn release(&self, rt: &Runtime) -> Result<()> {
        let res = self.release_inner(rt);
        rt.track(res)
    }

    pub(crate) fn release_inner(&self, rt: &Runtime) -> Result<()> {
        self.live()?;
        let p = &self.inner;
        if p.refs.get() != 1 {
            p.refs.release()?;
            self.released.set(true);
            return Ok(());
        }
        // Last holder: the block cannot be taken while someone still views it.
        let block = {
            let mut slot = p.block.try_borrow_mut().map_err(|_| Error::InvalidArgument)?;
            p.refs.release()?;
            self.released.set(true);
            slot.take()
        };
        rt.free(block)
    }

    /// Shares currently held on this payload.
    pub fn ref_count(&self, rt: &Runtime) -> usize {
        rt.set_last_error(None);
        self.inner.refs.get()
    }

    /// Whether both handles refer to the same payload memory.
    pub fn shares_payload(&self, rt: &Runtime, other: &Bytes) -> bool {
        rt.set_last_error(None);
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn live(&self) -> Result<()> {
        if !self.released.get() && self.inner.refs.is_live() {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    pub(crate) fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.inner.block.borrow(), |b| {
            b.as_ref().map_or(&[][..], Block::as_slice)
        })
    }

    pub(crate) fn content_eq(&self, other: &Bytes) -> bool {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.inner.len == other.inner.len && *self.bytes() == *other.bytes()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytes")
            .field("len", &self.inner.len)
            .field("refs", &self.inner.refs.get())
            .field("released", &self.released.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackingAllocator;

    fn runtime() -> (Runtime, TrackingAllocator) {
        let alloc = TrackingAllocator::new();
        (Runtime::new(alloc.clone()).unwrap(), alloc)
    }

    #[test]
    fn empty_payload_takes_no_block() {
        let (rt, alloc) = runtime();
        let base = alloc.live_blocks();
        let e = Bytes::new(&rt, b"").unwrap();
        assert_eq!(alloc.live_blocks(), base);
        assert_eq!(e.length(&rt).unwrap(), 0);
        assert!(e.view(&rt).unwrap().is_empty());
        e.release(&rt).unwrap();
    }

    #[test]
    fn raw_parts_contract() {
        let (rt, _alloc) = runtime();
        assert_eq!(
            Bytes::from_raw_parts(&rt, Some(b"abc"), -1).unwrap_err(),
            Error::InvalidArgument
        );
        assert_eq!(rt.last_error(), Some(Error::InvalidArgument));

        let b = Bytes::from_raw_parts(&rt, None, 100).unwrap();
        assert_eq!(rt.last_error(), None);
        assert_eq!(b.length(&rt).unwrap(), 0);
        b.release(&rt).unwrap();

        let b = Bytes::from_raw_parts(&rt, Some(b"abcdef"), 3).unwrap();
        assert_eq!(&*b.view(&rt).unwrap(), b"abc");
        b.release(&rt).unwrap();

        assert_eq!(
            Bytes::from_raw_parts(&rt, Some(b"ab"), 3).unwrap_err(),
            Error::InvalidArgument
        );
    }

    #[test]
    fn release_while_viewed_is_refused() {
        let (rt, alloc) = runtime();
        let base = alloc.bytes_allocated();
        let b = Bytes::new(&rt, b"held").unwrap();
        {
            let _v = b.bytes();
            assert_eq!(b.release_inner(&rt).unwrap_err(), Error::InvalidArgument);
            assert_eq!(b.ref_count(&rt), 1);
        }
        b.release(&rt).unwrap();
        assert_eq!(alloc.bytes_allocated(), base);
    }

    #[test]
    fn released_handle_rejects_reads() {
        let (rt, _alloc) = runtime();
        let b = Bytes::new(&rt, b"gone").unwrap();
        b.release(&rt).unwrap();
        assert_eq!(b.length(&rt).unwrap_err(), Error::InvalidArgument);
        assert!(b.view(&rt).is_err());
        assert_eq!(b.copy(&rt).unwrap_err(), Error::InvalidArgument);
        let other = Bytes::new(&rt, b"gone").unwrap();
        assert_eq!(
            Bytes::equal(&rt, Some(&b), Some(&other)).unwrap_err(),
            Error::InvalidArgument
        );
        other.release(&rt).unwrap();
    }

    #[test]
    fn allocation_failure_surfaces_as_out_of_memory() {
        let (rt, alloc) = runtime();
        alloc.fail_after(0);
        assert_eq!(Bytes::new(&rt, b"x").unwrap_err(), Error::OutOfMemory);
        assert_eq!(rt.last_error(), Some(Error::OutOfMemory));
    }
}
