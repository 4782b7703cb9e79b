//! Accounting allocator for leak checks and failure injection.
//!
//! `TrackingAllocator` keeps a registry of every live block it handed out,
//! keyed by block address, and the running byte total. Clones share the same
//! books, so a test can keep one clone for inspection and give the other to a
//! [`Runtime`](crate::Runtime).

use crate::error::{Error, Result};
use crate::runtime::{Allocator, Block, ReallocError};
use core::cell::RefCell;
use hashbrown::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Books {
    live: HashMap<usize, usize>,
    bytes: usize,
    // Successful allocations plus reallocations, ever.
    served: usize,
    // Fail the attempt once this many more have succeeded.
    fail_after: Option<usize>,
    // Fail every request for exactly this many bytes.
    fail_size: Option<usize>,
}

impl Books {
    /// Decide whether the next request of `size` bytes must fail.
    fn should_fail(&mut self, size: usize) -> bool {
        if self.fail_size == Some(size) {
            return true;
        }
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                true
            }
            Some(n) => {
                self.fail_after = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn record(&mut self, block: &Block) {
        self.live.insert(block.addr(), block.len());
        self.bytes += block.len();
        self.served += 1;
    }
}

/// Allocator that counts bytes, remembers live blocks, rejects frees of blocks
/// it does not know, and can be told to fail.
#[derive(Debug, Default, Clone)]
pub struct TrackingAllocator {
    books: Rc<RefCell<Books>>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently handed out.
    pub fn bytes_allocated(&self) -> usize {
        self.books.borrow().bytes
    }

    /// Blocks currently handed out.
    pub fn live_blocks(&self) -> usize {
        self.books.borrow().live.len()
    }

    /// Allocations and reallocations served so far.
    pub fn served(&self) -> usize {
        self.books.borrow().served
    }

    /// Let `n` more requests succeed, then fail the next one.
    pub fn fail_after(&self, n: usize) {
        self.books.borrow_mut().fail_after = Some(n);
    }

    /// Fail every request for exactly `size` bytes until cleared.
    pub fn fail_size(&self, size: usize) {
        self.books.borrow_mut().fail_size = Some(size);
    }

    pub fn clear_failures(&self) {
        let mut books = self.books.borrow_mut();
        books.fail_after = None;
        books.fail_size = None;
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, size: usize) -> Result<Block> {
        if size == 0 {
            return Err(Error::InvalidArgument);
        }
        let mut books = self.books.borrow_mut();
        if books.should_fail(size) {
            return Err(Error::OutOfMemory);
        }
        let block = Block::try_zeroed(size)?;
        books.record(&block);
        Ok(block)
    }

    fn free(&self, block: Block) -> Result<()> {
        let mut books = self.books.borrow_mut();
        match books.live.remove(&block.addr()) {
            Some(size) => {
                books.bytes -= size;
                Ok(())
            }
            None => Err(Error::InvalidArgument),
        }
    }

    fn reallocate(
        &self,
        block: Option<Block>,
        size: usize,
    ) -> core::result::Result<Block, ReallocError> {
        let Some(block) = block else {
            return self
                .allocate(size)
                .map_err(|error| ReallocError { block: None, error });
        };
        let mut books = self.books.borrow_mut();
        if size == 0 || !books.live.contains_key(&block.addr()) {
            return Err(ReallocError {
                block: Some(block),
                error: Error::InvalidArgument,
            });
        }
        if books.should_fail(size) {
            return Err(ReallocError {
                block: Some(block),
                error: Error::OutOfMemory,
            });
        }
        let old_addr = block.addr();
        match block.try_resize(size) {
            Ok(resized) => {
                let old_size = books.live.remove(&old_addr).unwrap_or(0);
                books.bytes -= old_size;
                books.record(&resized);
                Ok(resized)
            }
            Err((original, error)) => Err(ReallocError {
                block: Some(original),
                error,
            }),
        }
    }
}
