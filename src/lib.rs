//! bytestore: a minimal embeddable key-value store over reference-counted
//! byte buffers, with every byte of memory drawn from an injected allocator.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: an in-process hash table whose keys and values are shared,
//!   immutable byte buffers, and whose memory traffic can be observed and
//!   vetoed by the embedding application.
//! - Layers (leaves first):
//!   - Runtime: wraps an `Allocator` strategy and a per-instance last-error
//!     cell. Holds no business data.
//!   - Bytes: immutable, length-known payloads shared by explicit `copy` and
//!     given back by explicit `release`; the block returns to the allocator
//!     with the last release.
//!   - Storage: chained hash table of (key, value) `Bytes` pairs with
//!     power-of-two bucket counts and threshold-triggered rehashing.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (no atomics, no locks).
//! - Every public operation records its outcome in the runtime's last-error
//!   cell, success included, as well as returning a `Result`.
//! - A failed allocation never leaves a structure half-mutated: a failed
//!   resize keeps the old bucket array, a failed value share keeps the old
//!   value, a failed insert inserts nothing.
//!
//! Ownership contract
//! - `Bytes::new`/`Bytes::copy` each hand out one share; each share needs one
//!   `release`. Fewer releases leak (visible to the allocator), one more is
//!   `InvalidArgument`.
//! - `Storage::set` takes its own shares of key and value; the caller's
//!   handles are untouched. `Storage::get` hands the caller a new share.
//!
//! Reentrancy policy
//! - Storage only calls user code through `BytesHash`. Public operations
//!   carry a debug-only guard against nested entry, and resizes are refused
//!   while one is already running. Rehashing relinks entry nodes directly
//!   into the new array and never re-checks growth thresholds mid-pass.
//!
//! Notes and non-goals
//! - No persistence, no concurrent access, no transactions, no iteration, no
//!   key ordering.
//! - Reference-count overflow aborts, matching `Rc`.

mod buckets;
pub mod bytes;
pub mod config;
pub mod error;
pub mod hash;
mod refcount;
mod reentrancy;
pub mod runtime;
pub mod storage;
pub mod tracking;

// Public surface
pub use bytes::Bytes;
pub use config::{StorageConfig, StorageConfigBuilder};
pub use error::{Error, Result};
pub use hash::{default_bytes_hash32, BytesHash, OneAtATime};
pub use runtime::{Allocator, Block, FnAllocator, ReallocError, Runtime, RuntimeBuilder, SystemAllocator};
pub use storage::Storage;
pub use tracking::TrackingAllocator;
