// Runtime (allocation context) tests.
//
// Invariants exercised:
// - The last-error cell starts cleared and is overwritten by every call,
//   success included.
// - Allocation traffic is fully visible to the injected allocator: what is
//   allocated and freed through the runtime nets out to zero.
// - Reallocation failure hands the original block back intact.
use bytestore::{Block, Error, ReallocError, Runtime, TrackingAllocator};

// Test: the allocate/reallocate/free walk over a tracking allocator.
// Verifies: byte totals after each step; last error is cleared by each success.
#[test]
fn allocation_traffic_is_accounted() {
    let alloc = TrackingAllocator::new();
    let rt = Runtime::new(alloc.clone()).unwrap();
    assert_eq!(rt.last_error(), None);
    let x = alloc.bytes_allocated();

    // zero-sized request fails without touching the allocator
    assert_eq!(rt.allocate(0).unwrap_err(), Error::InvalidArgument);
    assert_eq!(rt.last_error(), Some(Error::InvalidArgument));
    assert_eq!(alloc.bytes_allocated(), x);

    // writable memory, returned in full
    let mut p0 = rt.allocate(4).unwrap();
    p0.as_mut_slice().copy_from_slice(&999u32.to_le_bytes());
    rt.free(Some(p0)).unwrap();
    assert_eq!(alloc.bytes_allocated(), x);

    // reallocate keeps content and accounting straight
    let mut p0 = rt.allocate(1).unwrap();
    p0.as_mut_slice()[0] = 7;
    let p0 = rt.reallocate(Some(p0), 4).unwrap();
    assert_eq!(p0.as_slice(), &[7, 0, 0, 0]);
    rt.free(Some(p0)).unwrap();
    assert_eq!(alloc.bytes_allocated(), x);

    let p1 = rt.allocate(17).unwrap();
    assert_eq!(rt.last_error(), None);
    assert_eq!(alloc.bytes_allocated(), x + 17);

    rt.set_last_error(Some(Error::OutOfMemory));
    assert_eq!(rt.last_error(), Some(Error::OutOfMemory));

    let p2 = rt.allocate(2).unwrap();
    assert_eq!(rt.last_error(), None);
    assert_eq!(alloc.bytes_allocated(), x + 17 + 2);
    assert_ne!(p1.addr(), p2.addr());

    let p1 = rt.reallocate(Some(p1), 16).unwrap();
    assert_eq!(alloc.bytes_allocated(), x + 16 + 2);
    let p2 = rt.reallocate(Some(p2), 113).unwrap();
    assert_eq!(alloc.bytes_allocated(), x + 16 + 113);

    rt.set_last_error(Some(Error::OutOfMemory));
    rt.free(Some(p1)).unwrap();
    assert_eq!(rt.last_error(), None);
    assert_eq!(alloc.bytes_allocated(), x + 113);

    rt.set_last_error(Some(Error::OutOfMemory));
    rt.free(Some(p2)).unwrap();
    assert_eq!(rt.last_error(), None);
    assert_eq!(alloc.bytes_allocated(), x);

    // freeing nothing succeeds
    rt.set_last_error(Some(Error::OutOfMemory));
    rt.free(None).unwrap();
    assert_eq!(rt.last_error(), None);

    rt.shutdown();
    assert_eq!(alloc.bytes_allocated(), 0);
}

// Test: reallocate(None, n) behaves like allocate(n).
#[test]
fn reallocate_from_nothing_allocates() {
    let alloc = TrackingAllocator::new();
    let rt = Runtime::new(alloc.clone()).unwrap();
    let x = alloc.bytes_allocated();
    let b = rt.reallocate(None, 9).unwrap();
    assert_eq!(b.len(), 9);
    assert_eq!(alloc.bytes_allocated(), x + 9);
    rt.free(Some(b)).unwrap();
}

// Test: failed reallocation.
// Verifies: OutOfMemory is recorded; the caller gets the original block back
// with its content; accounting is unchanged.
#[test]
fn failed_reallocation_keeps_original() {
    let alloc = TrackingAllocator::new();
    let rt = Runtime::new(alloc.clone()).unwrap();
    let mut b = rt.allocate(3).unwrap();
    b.as_mut_slice().copy_from_slice(b"xyz");
    let x = alloc.bytes_allocated();

    alloc.fail_after(0);
    let ReallocError { block, error } = rt.reallocate(Some(b), 300).unwrap_err();
    assert_eq!(error, Error::OutOfMemory);
    assert_eq!(rt.last_error(), Some(Error::OutOfMemory));
    let b = block.expect("original block handed back");
    assert_eq!(b.as_slice(), b"xyz");
    assert_eq!(alloc.bytes_allocated(), x);
    rt.free(Some(b)).unwrap();
}

// Test: allocation failure is reported, not fatal.
#[test]
fn failed_allocation_is_out_of_memory() {
    let alloc = TrackingAllocator::new();
    let rt = Runtime::new(alloc.clone()).unwrap();
    alloc.fail_size(64);
    assert_eq!(rt.allocate(64).unwrap_err(), Error::OutOfMemory);
    assert_eq!(rt.last_error(), Some(Error::OutOfMemory));
    let ok = rt.allocate(65).unwrap();
    assert_eq!(rt.last_error(), None);
    rt.free(Some(ok)).unwrap();
}

// Test: a block from another allocator is refused by the tracking allocator.
#[test]
fn foreign_block_is_invalid_argument() {
    let rt = Runtime::new(TrackingAllocator::new()).unwrap();
    let other = Runtime::new(TrackingAllocator::new()).unwrap();
    let b = other.allocate(8).unwrap();
    assert_eq!(rt.free(Some(b)).unwrap_err(), Error::InvalidArgument);
    assert_eq!(rt.last_error(), Some(Error::InvalidArgument));
}

// Test: the three-function form of injection.
// Verifies: construction fails unless all three functions are present.
#[test]
fn function_injection_requires_all_slots() {
    let missing_free = Runtime::builder(())
        .allocate(|_, size| Block::try_zeroed(size))
        .reallocate(|_, _, size| {
            Block::try_zeroed(size).map_err(|error| ReallocError { block: None, error })
        })
        .build();
    assert_eq!(missing_free.unwrap_err(), Error::InvalidArgument);

    let rt = Runtime::builder(())
        .allocate(|_, size| Block::try_zeroed(size))
        .free(|_, block| {
            drop(block);
            Ok(())
        })
        .reallocate(|_, block, size| match block {
            None => Block::try_zeroed(size).map_err(|error| ReallocError { block: None, error }),
            Some(b) => b
                .try_resize(size)
                .map_err(|(b, error)| ReallocError { block: Some(b), error }),
        })
        .build()
        .unwrap();
    assert_eq!(rt.last_error(), None);
    let b = rt.allocate(10).unwrap();
    rt.free(Some(b)).unwrap();
}
