//! Reentrancy tracking for the storage engine.
//!
//! Two independent guards:
//! - operation sections (`enter`), tracked by a depth counter: public table
//!   operations. Nesting one inside another means user code (a hash
//!   function) called back into the table mid-operation; that panics in
//!   debug builds.
//! - resize sections (`try_resize`), tracked by a flag: a rebuild of the
//!   bucket array. A resize is refused while another one is running, in
//!   every build. Rebuilds relink entries without going back through
//!   `set`/`delete`, so only a guard already held by the caller trips it.

use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct Reentrancy {
    depth: Cell<u32>,
    resizing: Cell<bool>,
    // Keep !Send + !Sync in line with single-threaded design.
    _nosend: PhantomData<*mut ()>,
}

impl Reentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            depth: Cell::new(0),
            resizing: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Enter a public operation. Debug builds panic on nesting.
    #[inline]
    pub(crate) fn enter(&self) -> OpGuard<'_> {
        let d = self.depth.get();
        debug_assert!(d == 0, "reentrancy detected: nested entry into storage");
        self.depth.set(d + 1);
        OpGuard { owner: self }
    }

    /// Claim the resize slot, or `None` if a resize is already running.
    #[inline]
    pub(crate) fn try_resize(&self) -> Option<ResizeGuard<'_>> {
        if self.resizing.replace(true) {
            return None;
        }
        Some(ResizeGuard { owner: self })
    }

    #[cfg(test)]
    pub(crate) fn is_resizing(&self) -> bool {
        self.resizing.get()
    }
}

impl Default for Reentrancy {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct OpGuard<'a> {
    owner: &'a Reentrancy,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let d = self.owner.depth.get();
        debug_assert!(d > 0);
        self.owner.depth.set(d.saturating_sub(1));
    }
}

pub(crate) struct ResizeGuard<'a> {
    owner: &'a Reentrancy,
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.owner.resizing.set(false);
    }
}
