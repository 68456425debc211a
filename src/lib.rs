#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Pluggable equality and hashing for table keys.
///
/// This module provides the [`KeyComparator`] abstraction used by every
/// bucket operation, covering natural hashing, ordering/hash-provider
/// composition, and unified equivalence objects.
pub mod comparator;

/// Version-checked cursors over a table's live entries.
pub mod cursor;

/// Error types shared across the crate.
pub mod error;

/// Prime capacity sizing for the bucket array.
pub mod primes;

/// A coarse-lock synchronized wrapper around [`Hashtable`].
#[cfg(feature = "std")]
pub mod sync;

/// The double-hashing bucket table and its versioned read/write protocol.
pub mod table;

pub use comparator::Equivalence;
pub use comparator::KeyComparator;
pub use cursor::EntryCursor;
pub use cursor::KeyCursor;
pub use cursor::ValueCursor;
pub use error::TableError;
#[cfg(feature = "std")]
pub use sync::SyncTable;
pub use table::Hashtable;
