//! Single-threaded shared-ownership counter for byte payloads.
//!
//! Unlike `Rc`, releasing is an explicit, fallible call: a release against a
//! count that already reached zero is reported instead of wrapping around.

use crate::error::{Error, Result};
use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct RefCount {
    count: Cell<usize>,
    // !Send + !Sync like Rc
    _nosend: PhantomData<*mut ()>,
}

impl RefCount {
    /// A counter owned by its first holder.
    pub(crate) fn one() -> Self {
        Self {
            count: Cell::new(1),
            _nosend: PhantomData,
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.count.get()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.count.get() > 0
    }

    /// Add one holder. Fails if every holder already released.
    #[inline]
    pub(crate) fn acquire(&self) -> Result<()> {
        let c = self.count.get();
        if c == 0 {
            return Err(Error::InvalidArgument);
        }
        let n = c.wrapping_add(1);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        self.count.set(n);
        Ok(())
    }

    /// Drop one holder. Returns true if that was the last one.
    #[inline]
    pub(crate) fn release(&self) -> Result<bool> {
        let c = self.count.get();
        if c == 0 {
            return Err(Error::InvalidArgument);
        }
        self.count.set(c - 1);
        Ok(c == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_balance() {
        let rc = RefCount::one();
        rc.acquire().unwrap();
        rc.acquire().unwrap();
        assert_eq!(rc.get(), 3);
        assert!(!rc.release().unwrap());
        assert!(!rc.release().unwrap());
        assert!(rc.release().unwrap());
        assert!(!rc.is_live());
    }

    #[test]
    fn underflow_and_revival_are_rejected() {
        let rc = RefCount::one();
        assert!(rc.release().unwrap());
        assert_eq!(rc.release().unwrap_err(), Error::InvalidArgument);
        assert_eq!(rc.acquire().unwrap_err(), Error::InvalidArgument);
        assert_eq!(rc.get(), 0);
    }
}
