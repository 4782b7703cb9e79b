//! Runtime: the allocation context every other object routes memory through.
//!
//! A `Runtime` wraps an injected [`Allocator`] strategy and a per-instance
//! last-error cell. It holds no business data. Buffers and tables take the
//! runtime by reference, so their lifetimes are bounded by it.

use crate::error::{Error, Result};
use core::cell::Cell;
use core::fmt;
use std::mem;
use thiserror::Error as ThisError;

/// An owned, zero-filled, non-empty region of memory handed out by an
/// [`Allocator`].
///
/// Blocks are never `Clone`: the only ways to get rid of one are to give it
/// back to the allocator that produced it or to let it drop, which the
/// allocator's accounting will see as a leak.
pub struct Block {
    mem: Box<[u8]>,
}

impl Block {
    /// Allocate `size` zeroed bytes on the global heap, reporting exhaustion
    /// as `OutOfMemory` instead of aborting.
    pub fn try_zeroed(size: usize) -> Result<Block> {
        let mut v: Vec<u8> = Vec::new();
        v.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        v.resize(size, 0);
        Ok(Block {
            mem: v.into_boxed_slice(),
        })
    }

    /// Grow or shrink in place where possible. New bytes are zeroed. On
    /// failure the original block comes back untouched.
    pub fn try_resize(self, size: usize) -> core::result::Result<Block, (Block, Error)> {
        let len = self.mem.len();
        let mut v = self.mem.into_vec();
        if size > len && v.try_reserve_exact(size - len).is_err() {
            return Err((
                Block {
                    mem: v.into_boxed_slice(),
                },
                Error::OutOfMemory,
            ));
        }
        v.resize(size, 0);
        Ok(Block {
            mem: v.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Address of the first byte; stable for the life of the block and unique
    /// among live blocks.
    pub fn addr(&self) -> usize {
        self.mem.as_ptr() as usize
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .finish()
    }
}

/// Failed reallocation. The caller keeps ownership of the original block.
#[derive(Debug, ThisError)]
#[error("reallocation failed: {error}")]
pub struct ReallocError {
    pub block: Option<Block>,
    pub error: Error,
}

/// Memory strategy injected into a [`Runtime`].
///
/// Implementations are single-threaded and use interior mutability for any
/// bookkeeping they keep.
pub trait Allocator {
    /// Return a fresh block of exactly `size` bytes (`size > 0`).
    fn allocate(&self, size: usize) -> Result<Block>;

    /// Take back a block previously returned by `allocate`/`reallocate`.
    fn free(&self, block: Block) -> Result<()>;

    /// Resize `block` to `size` bytes, or allocate when `block` is `None`.
    /// On failure the original block must be handed back in the error.
    fn reallocate(
        &self,
        block: Option<Block>,
        size: usize,
    ) -> core::result::Result<Block, ReallocError>;
}

/// Global-heap strategy.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<Block> {
        Block::try_zeroed(size)
    }

    fn free(&self, block: Block) -> Result<()> {
        drop(block);
        Ok(())
    }

    fn reallocate(
        &self,
        block: Option<Block>,
        size: usize,
    ) -> core::result::Result<Block, ReallocError> {
        match block {
            None => Block::try_zeroed(size).map_err(|error| ReallocError { block: None, error }),
            Some(b) => b.try_resize(size).map_err(|(b, error)| ReallocError {
                block: Some(b),
                error,
            }),
        }
    }
}

pub type AllocateFn<C> = Box<dyn Fn(&C, usize) -> Result<Block>>;
pub type FreeFn<C> = Box<dyn Fn(&C, Block) -> Result<()>>;
pub type ReallocateFn<C> =
    Box<dyn Fn(&C, Option<Block>, usize) -> core::result::Result<Block, ReallocError>>;

/// Three-function strategy carrying an opaque user context that is handed to
/// each call.
pub struct FnAllocator<C> {
    allocate: AllocateFn<C>,
    free: FreeFn<C>,
    reallocate: ReallocateFn<C>,
    context: C,
}

impl<C> FnAllocator<C> {
    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C> Allocator for FnAllocator<C> {
    fn allocate(&self, size: usize) -> Result<Block> {
        (self.allocate)(&self.context, size)
    }

    fn free(&self, block: Block) -> Result<()> {
        (self.free)(&self.context, block)
    }

    fn reallocate(
        &self,
        block: Option<Block>,
        size: usize,
    ) -> core::result::Result<Block, ReallocError> {
        (self.reallocate)(&self.context, block, size)
    }
}

/// Builder for a runtime over three injected functions.
pub struct RuntimeBuilder<C> {
    allocate: Option<AllocateFn<C>>,
    free: Option<FreeFn<C>>,
    reallocate: Option<ReallocateFn<C>>,
    context: C,
}

impl<C: 'static> RuntimeBuilder<C> {
    pub fn allocate<F>(mut self, f: F) -> Self
    where
        F: Fn(&C, usize) -> Result<Block> + 'static,
    {
        self.allocate = Some(Box::new(f));
        self
    }

    pub fn free<F>(mut self, f: F) -> Self
    where
        F: Fn(&C, Block) -> Result<()> + 'static,
    {
        self.free = Some(Box::new(f));
        self
    }

    pub fn reallocate<F>(mut self, f: F) -> Self
    where
        F: Fn(&C, Option<Block>, usize) -> core::result::Result<Block, ReallocError> + 'static,
    {
        self.reallocate = Some(Box::new(f));
        self
    }

    /// Fails with `InvalidArgument` unless all three functions were supplied.
    pub fn build(self) -> Result<Runtime> {
        match (self.allocate, self.free, self.reallocate) {
            (Some(allocate), Some(free), Some(reallocate)) => Runtime::new(FnAllocator {
                allocate,
                free,
                reallocate,
                context: self.context,
            }),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Allocation context: the injected allocator plus the last-error cell.
pub struct Runtime {
    allocator: Box<dyn Allocator>,
    last_error: Cell<Option<Error>>,
    // The runtime's own footprint, taken from the allocator it wraps. Private
    // and uniquely owned, so it can never reach `free`.
    header: Option<Block>,
}

impl Runtime {
    /// Wrap `allocator`. The runtime's header is allocated through it, so an
    /// allocator that cannot serve that request yields `OutOfMemory`.
    pub fn new<A>(allocator: A) -> Result<Runtime>
    where
        A: Allocator + 'static,
    {
        let header = allocator.allocate(mem::size_of::<Runtime>())?;
        tracing::trace!(addr = header.addr(), "runtime started");
        Ok(Runtime {
            allocator: Box::new(allocator),
            last_error: Cell::new(None),
            header: Some(header),
        })
    }

    /// Start a runtime on the global heap.
    pub fn system() -> Result<Runtime> {
        Runtime::new(SystemAllocator)
    }

    /// Start assembling a runtime from three functions and a user context.
    pub fn builder<C: 'static>(context: C) -> RuntimeBuilder<C> {
        RuntimeBuilder {
            allocate: None,
            free: None,
            reallocate: None,
            context,
        }
    }

    /// Tear the runtime down. Buffers still holding blocks from it are leaked
    /// as far as the allocator's accounting is concerned.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Allocate `size` bytes. `size` must be positive.
    pub fn allocate(&self, size: usize) -> Result<Block> {
        if size == 0 {
            return self.track(Err(Error::InvalidArgument));
        }
        let res = self.allocator.allocate(size);
        tracing::trace!(size, ok = res.is_ok(), "allocate");
        self.track(res)
    }

    /// Return a block to the allocator. `None` is a successful no-op.
    pub fn free(&self, block: Option<Block>) -> Result<()> {
        let res = match block {
            None => Ok(()),
            Some(b) => {
                tracing::trace!(addr = b.addr(), size = b.len(), "free");
                self.allocator.free(b)
            }
        };
        self.track(res)
    }

    /// Resize `block`, or allocate when it is `None`. On failure the original
    /// block is returned inside the error.
    pub fn reallocate(
        &self,
        block: Option<Block>,
        size: usize,
    ) -> core::result::Result<Block, ReallocError> {
        let res = if size == 0 {
            Err(ReallocError {
                block,
                error: Error::InvalidArgument,
            })
        } else {
            self.allocator.reallocate(block, size)
        };
        tracing::trace!(size, ok = res.is_ok(), "reallocate");
        self.last_error.set(res.as_ref().err().map(|e| e.error));
        res
    }

    /// Outcome of the most recent operation on this runtime; `None` is OK.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error.get()
    }

    pub fn set_last_error(&self, err: Option<Error>) {
        self.last_error.set(err);
    }

    /// Record `res` in the last-error cell and pass it through.
    pub(crate) fn track<T>(&self, res: Result<T>) -> Result<T> {
        self.last_error.set(res.as_ref().err().copied());
        res
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(header) = self.header.take() {
            if self.allocator.free(header).is_err() {
                tracing::warn!("allocator rejected the runtime header on shutdown");
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("last_error", &self.last_error.get())
            .finish_non_exhaustive()
    }
}
