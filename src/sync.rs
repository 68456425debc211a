use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use core::hash::Hash;

use crate::error::Result;
use crate::table::Hashtable;

/// A whole-table lock around a [`Hashtable`].
///
/// Every operation, reads included, serializes on one mutex, trading the
/// inner table's validated-read path for strict linearizability. This is
/// the wrapper for callers that need multiple writers: the bare table only
/// supports one writer at a time, and probe chains span arbitrary buckets,
/// so there is no finer-grained lock that could cover a mutation.
///
/// # Examples
///
/// ```rust
/// use std::thread;
///
/// use double_hash::Hashtable;
/// use double_hash::SyncTable;
///
/// let table = SyncTable::new(Hashtable::new());
/// thread::scope(|scope| {
///     for worker in 0..4u64 {
///         let table = &table;
///         scope.spawn(move || {
///             for key in 0..100u64 {
///                 table.insert(worker * 100 + key, key).unwrap();
///             }
///         });
///     }
/// });
/// assert_eq!(table.len(), 400);
/// ```
pub struct SyncTable<K, V> {
    inner: Mutex<Hashtable<K, V>>,
}

impl<K, V> SyncTable<K, V>
where
    K: Hash + Eq,
{
    /// Wraps `table` behind a fresh lock.
    pub fn new(table: Hashtable<K, V>) -> Self {
        SyncTable {
            inner: Mutex::new(table),
        }
    }

    /// Unwraps the inner table, discarding the lock.
    pub fn into_inner(self) -> Hashtable<K, V> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Poisoning is absorbed: mutations on the inner table are atomic, so a
    // panicking thread cannot leave it structurally torn.
    fn lock(&self) -> MutexGuard<'_, Hashtable<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `key -> value`, overwriting any existing entry.
    ///
    /// See [`Hashtable::insert`].
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>> {
        self.lock().insert(key, value)
    }

    /// Inserts `key -> value`, failing on an equal existing key.
    ///
    /// See [`Hashtable::try_insert`].
    pub fn try_insert(&self, key: K, value: V) -> Result<()> {
        self.lock().try_insert(key, value)
    }

    /// Returns a clone of the value stored for `key`.
    ///
    /// The value is cloned out because the reference cannot outlive the
    /// lock.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.lock().get(key).cloned()
    }

    /// Returns whether an entry with an equal key exists.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Removes the entry for `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the current bucket array length.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Returns the inner table's mutation version.
    pub fn version(&self) -> u64 {
        self.lock().version()
    }

    /// Returns an independent snapshot of the inner table.
    ///
    /// The snapshot is a plain [`Hashtable`], suitable for enumeration or
    /// serialization without holding the lock.
    pub fn snapshot(&self) -> Hashtable<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.lock().clone()
    }
}

impl<K, V> Clone for SyncTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Clones the inner table under the lock and wraps the copy behind a
    /// new, unshared lock.
    fn clone(&self) -> Self {
        SyncTable::new(self.lock().clone())
    }
}

impl<K, V> From<Hashtable<K, V>> for SyncTable<K, V>
where
    K: Hash + Eq,
{
    fn from(table: Hashtable<K, V>) -> Self {
        SyncTable::new(table)
    }
}
