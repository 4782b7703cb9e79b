//! Error kinds shared by every component.
//!
//! Errors travel two ways: as the `Err` side of each operation's `Result`, and
//! through the runtime's last-error cell, which every public operation
//! overwrites before returning.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Error {
    /// Bad input: negative sizes, zero-sized allocations, releasing a buffer
    /// whose count is already zero, freeing the runtime's own block, or a
    /// block the allocator never handed out.
    #[error("invalid argument")]
    InvalidArgument,

    /// The injected allocator refused an allocation or reallocation.
    #[error("out of memory")]
    OutOfMemory,

    /// Lookup of a key that has no entry.
    #[error("key not found")]
    NotFound,
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
