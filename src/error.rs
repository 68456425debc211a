use thiserror::Error;

/// Convenience alias for fallible table operations.
pub type Result<T> = core::result::Result<T, TableError>;

/// Errors surfaced by table construction, mutation, and enumeration.
///
/// Every failure is reported at the point of detection and leaves the table
/// with no partially applied mutation; none are retried or swallowed
/// internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    /// A uniqueness-checked insert found an equal key already present.
    #[error("an entry with an equal key already exists")]
    DuplicateKey,

    /// A load factor outside the supported `[0.1, 1.0]` range was requested
    /// at construction.
    #[error("load factor {0} is outside the supported range [0.1, 1.0]")]
    LoadFactorOutOfRange(f32),

    /// Sizing arithmetic exceeded the largest supported bucket array.
    #[error("requested capacity {0} exceeds the largest supported bucket array")]
    CapacityOverflow(usize),

    /// The table was mutated after the cursor captured its version.
    #[error("table was modified during enumeration")]
    Invalidated,

    /// A cursor's current entry was read before the first `move_next` or
    /// after the cursor ended.
    #[error("cursor is not positioned on a live entry")]
    InvalidPosition,

    /// An ordering or hash-provider function was combined with a unified
    /// equivalence comparer on the same comparator.
    #[error("cannot combine ordering or hash-provider functions with a unified equivalence comparer")]
    MixedComparison,
}
