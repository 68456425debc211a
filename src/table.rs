use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

use crate::comparator::KeyComparator;
use crate::error::Result;
use crate::error::TableError;
use crate::primes;

/// Low 31 bits of a bucket's `hash_coll`: the stored hash code.
pub(crate) const HASH_MASK: u32 = 0x7FFF_FFFF;

/// High bit of a bucket's `hash_coll`: some other key's probe sequence
/// passed through this slot.
pub(crate) const COLLISION_BIT: u32 = 0x8000_0000;

/// User-supplied load factors are scaled by this before use so probe
/// chains stay short even when the caller asks for a completely full table.
const LOAD_FACTOR_SCALE: f32 = 0.72;

/// The tombstone-purging in-place rehash only fires on tables holding more
/// live entries than this.
const CHURN_REHASH_MIN_COUNT: usize = 100;

/// One slot of the bucket array.
///
/// A `Tombstone` is a deleted slot retained because at least one other
/// key's probe sequence passes through it; its bucket always carries
/// [`COLLISION_BIT`].
#[derive(Clone)]
pub(crate) enum Slot<K, V> {
    Empty,
    Tombstone,
    Occupied { key: K, value: V },
}

#[derive(Clone)]
pub(crate) struct Bucket<K, V> {
    pub(crate) slot: Slot<K, V>,
    pub(crate) hash_coll: u32,
}

impl<K, V> Bucket<K, V> {
    fn empty() -> Self {
        Bucket {
            slot: Slot::Empty,
            hash_coll: 0,
        }
    }
}

fn allocate_buckets<K, V>(capacity: usize) -> Box<[Bucket<K, V>]> {
    let mut buckets = Vec::with_capacity(capacity);
    buckets.resize_with(capacity, Bucket::empty);
    buckets.into_boxed_slice()
}

/// Probe start slot and stride for `hash` over `capacity` buckets.
///
/// The stride is `1 + (hash * HASH_PRIME) mod (capacity - 1)` with a
/// wrapping 32-bit multiply. Capacities from [`primes`] are prime, so any
/// stride in `1..capacity` is coprime with the capacity and the sequence
/// `start + i * stride (mod capacity)` visits every slot once per cycle.
pub(crate) fn probe_params(hash: u32, capacity: usize) -> (usize, usize) {
    debug_assert!(capacity > 1);
    let stride = 1 + (hash.wrapping_mul(primes::HASH_PRIME) % (capacity as u32 - 1)) as usize;
    (hash as usize % capacity, stride)
}

fn reader_backoff(spins: &mut u32) {
    *spins = spins.saturating_add(1);
    cfg_if::cfg_if! {
        if #[cfg(feature = "std")] {
            const SPIN_LIMIT: u32 = 16;
            if *spins > SPIN_LIMIT {
                std::thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        } else {
            core::hint::spin_loop();
        }
    }
}

enum ProbeHit<'a, V> {
    Found(&'a V),
    Absent,
    Chain,
}

/// An open-addressing hash table using double hashing.
///
/// Collisions are resolved by probing with a stride derived from the key's
/// hash; deleted slots become tombstones that keep probe chains intact and
/// are reused by later inserts. The table grows to the next qualifying
/// prime capacity when `count` reaches the load-factor threshold, and
/// purges accumulated tombstones with a same-capacity rehash when churn
/// makes them dominate.
///
/// Every mutation increments a version counter inside a
/// writer-in-progress window, and the read path (`get`, `contains_key`)
/// validates both around each bucket inspection instead of taking a lock.
/// Many concurrent readers may overlap one writer; concurrent writers are
/// not supported; wrap the table in [`SyncTable`](crate::sync::SyncTable)
/// when mutations must be serialized across threads.
///
/// Equality and hashing are pluggable per table via [`KeyComparator`].
///
/// # Examples
///
/// ```rust
/// use double_hash::Hashtable;
///
/// # fn main() -> Result<(), double_hash::TableError> {
/// let mut table = Hashtable::new();
/// table.insert("alpha", 1)?;
/// table.insert("beta", 2)?;
///
/// assert_eq!(table.get(&"alpha"), Some(&1));
/// assert_eq!(table.remove(&"beta"), Some(2));
/// assert_eq!(table.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Hashtable<K, V> {
    buckets: Box<[Bucket<K, V>]>,
    count: usize,
    occupancy: usize,
    loadsize: usize,
    load_factor: f32,
    version: AtomicU64,
    writer_in_progress: AtomicBool,
    comparator: KeyComparator<K>,
}

impl<K, V> Hashtable<K, V> {
    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the current bucket array length.
    ///
    /// Always a prime satisfying the double-hashing stride condition, and
    /// always strictly greater than the growth threshold so probe
    /// sequences terminate.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the effective load factor.
    ///
    /// This is the constructor's load factor scaled down to the internal
    /// threshold actually applied to the bucket array (`0.72` for the
    /// default of `1.0`).
    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Returns the table's mutation version.
    ///
    /// The version increments on every completed mutation, including
    /// same-key value overwrites and rehashes. Cursors capture it at
    /// creation and fail with [`TableError::Invalidated`] once it moves;
    /// external serializers can use it to detect a table changing under
    /// them.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns an iterator over the live entries in bucket order.
    ///
    /// The order is an artifact of bucket indices and changes across
    /// rehashes; it is not part of the API contract. The iterator borrows
    /// the table, so it cannot be invalidated; use the cursor views for
    /// enumeration that tolerates (and detects) interleaved mutation.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
        }
    }

    /// Returns the comparator this table hashes and compares keys with.
    ///
    /// An external serializer reconstructing the table by replaying
    /// inserts needs the same comparator to end up with an equivalent
    /// layout.
    pub fn comparator(&self) -> &KeyComparator<K> {
        &self.comparator
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn is_live(&self, index: usize) -> bool {
        matches!(
            self.buckets.get(index),
            Some(Bucket {
                slot: Slot::Occupied { .. },
                ..
            })
        )
    }

    pub(crate) fn bucket_entry(&self, index: usize) -> Option<(&K, &V)> {
        match self.buckets.get(index) {
            Some(Bucket {
                slot: Slot::Occupied { key, value },
                ..
            }) => Some((key, value)),
            _ => None,
        }
    }

    fn begin_mutation(&self) {
        self.writer_in_progress.store(true, Ordering::SeqCst);
    }

    fn commit_mutation(&self) {
        self.version.fetch_add(1, Ordering::Release);
        self.writer_in_progress.store(false, Ordering::Release);
    }

    /// Samples the version once no writer is mid-mutation.
    fn begin_read(&self, spins: &mut u32) -> u64 {
        loop {
            let version = self.version.load(Ordering::Acquire);
            if !self.writer_in_progress.load(Ordering::Acquire) {
                return version;
            }
            reader_backoff(spins);
        }
    }

    fn read_valid(&self, version: u64) -> bool {
        !self.writer_in_progress.load(Ordering::Acquire)
            && self.version.load(Ordering::Acquire) == version
    }
}

impl<K, V> Hashtable<K, V>
where
    K: Hash + Eq,
{
    /// Creates an empty table with natural equality and hashing.
    #[cfg(feature = "foldhash")]
    pub fn new() -> Self {
        Self::with_comparator(KeyComparator::natural())
    }

    /// Creates a table sized to hold `capacity` entries before growing.
    ///
    /// Fails with [`TableError::CapacityOverflow`] if the sized bucket
    /// array would exceed the supported maximum.
    #[cfg(feature = "foldhash")]
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_settings(capacity, 1.0, KeyComparator::natural())
    }

    /// Creates a table with an explicit load factor in `[0.1, 1.0]`.
    ///
    /// The given factor scales the internal threshold; `1.0` yields the
    /// default effective factor of `0.72`. Out-of-range values fail with
    /// [`TableError::LoadFactorOutOfRange`].
    #[cfg(feature = "foldhash")]
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f32) -> Result<Self> {
        Self::with_settings(capacity, load_factor, KeyComparator::natural())
    }

    /// Creates an empty table using the given comparator.
    pub fn with_comparator(comparator: KeyComparator<K>) -> Self {
        Self::raw(3, LOAD_FACTOR_SCALE, comparator)
    }

    /// Creates a table from a capacity hint, load factor, and comparator.
    pub fn with_settings(
        capacity: usize,
        load_factor: f32,
        comparator: KeyComparator<K>,
    ) -> Result<Self> {
        if !(0.1..=1.0).contains(&load_factor) {
            return Err(TableError::LoadFactorOutOfRange(load_factor));
        }
        let effective = load_factor * LOAD_FACTOR_SCALE;
        let rawsize = (capacity as f64 / effective as f64) as usize;
        let hashsize = if rawsize > 3 {
            primes::next_prime_at_least(rawsize)?
        } else {
            3
        };
        Ok(Self::raw(hashsize, effective, comparator))
    }

    fn raw(capacity: usize, effective_load_factor: f32, comparator: KeyComparator<K>) -> Self {
        let mut loadsize = (effective_load_factor * capacity as f32) as usize;
        if loadsize >= capacity {
            loadsize = capacity - 1;
        }
        Hashtable {
            buckets: allocate_buckets(capacity),
            count: 0,
            occupancy: 0,
            loadsize,
            load_factor: effective_load_factor,
            version: AtomicU64::new(0),
            writer_in_progress: AtomicBool::new(false),
            comparator,
        }
    }

    /// Inserts `key -> value`, overwriting any existing entry for an equal
    /// key.
    ///
    /// Returns the previous value when the key was already present. The
    /// only failure is [`TableError::CapacityOverflow`] from growth at the
    /// supported maximum.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use double_hash::Hashtable;
    ///
    /// # fn main() -> Result<(), double_hash::TableError> {
    /// let mut table = Hashtable::new();
    /// assert_eq!(table.insert("a", 1)?, None);
    /// assert_eq!(table.insert("a", 2)?, Some(1));
    /// assert_eq!(table.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.insert_impl(key, value, false)
    }

    /// Inserts `key -> value`, failing with [`TableError::DuplicateKey`]
    /// when an equal key is already present.
    ///
    /// On failure the existing entry is untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use double_hash::Hashtable;
    /// use double_hash::TableError;
    ///
    /// # fn main() -> Result<(), double_hash::TableError> {
    /// let mut table = Hashtable::new();
    /// table.try_insert("a", 1)?;
    /// assert_eq!(table.try_insert("a", 2), Err(TableError::DuplicateKey));
    /// assert_eq!(table.get(&"a"), Some(&1));
    /// # Ok(())
    /// # }
    /// ```
    pub fn try_insert(&mut self, key: K, value: V) -> Result<()> {
        self.insert_impl(key, value, true).map(|_| ())
    }

    fn insert_impl(&mut self, key: K, value: V, fail_if_exists: bool) -> Result<Option<V>> {
        if self.count >= self.loadsize {
            self.expand()?;
        } else if self.occupancy > self.loadsize && self.count > CHURN_REHASH_MIN_COUNT {
            self.rehash(self.buckets.len(), false);
        }

        let hash = self.comparator.hash(&key) & HASH_MASK;
        let capacity = self.buckets.len();
        let (mut index, stride) = probe_params(hash, capacity);
        let mut reusable_tombstone: Option<usize> = None;

        for _ in 0..capacity {
            if reusable_tombstone.is_none() && matches!(self.buckets[index].slot, Slot::Tombstone)
            {
                reusable_tombstone = Some(index);
            }

            if matches!(self.buckets[index].slot, Slot::Empty) {
                let target = reusable_tombstone.unwrap_or(index);
                self.place(target, key, value, hash);
                return Ok(None);
            }

            let slot_hash = self.buckets[index].hash_coll & HASH_MASK;
            if let Slot::Occupied { key: existing, .. } = &self.buckets[index].slot {
                if slot_hash == hash && self.comparator.equals(existing, &key) {
                    if fail_if_exists {
                        return Err(TableError::DuplicateKey);
                    }
                    self.begin_mutation();
                    let previous = match &mut self.buckets[index].slot {
                        Slot::Occupied { value: current, .. } => {
                            Some(core::mem::replace(current, value))
                        }
                        _ => None,
                    };
                    self.commit_mutation();
                    return Ok(previous);
                }
            }

            // Collision marks only ever transition from clear to set; once
            // a reusable tombstone is known the chain already reaches it,
            // so marking stops.
            if reusable_tombstone.is_none() {
                let bucket = &mut self.buckets[index];
                if bucket.hash_coll & COLLISION_BIT == 0 {
                    bucket.hash_coll |= COLLISION_BIT;
                    self.occupancy += 1;
                }
            }

            index = (index + stride) % capacity;
        }

        if let Some(target) = reusable_tombstone {
            self.place(target, key, value, hash);
            return Ok(None);
        }

        panic!("probe cycle exhausted without a free slot: loadsize/capacity invariant broken");
    }

    /// Writes a new entry into `index`, which is empty or a tombstone.
    fn place(&mut self, index: usize, key: K, value: V, hash: u32) {
        self.begin_mutation();
        let bucket = &mut self.buckets[index];
        bucket.slot = Slot::Occupied { key, value };
        bucket.hash_coll |= hash;
        self.count += 1;
        self.commit_mutation();
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// The lookup runs the validated-read protocol: the version counter
    /// and writer flag are sampled around every bucket inspection, and the
    /// probe restarts (with bounded backoff) if a mutation raced it. No
    /// lock is taken.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use double_hash::Hashtable;
    ///
    /// # fn main() -> Result<(), double_hash::TableError> {
    /// let mut table = Hashtable::new();
    /// table.insert(7, "seven")?;
    /// assert_eq!(table.get(&7), Some(&"seven"));
    /// assert_eq!(table.get(&8), None);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.comparator.hash(key) & HASH_MASK;
        let mut spins = 0u32;
        'retry: loop {
            let version = self.begin_read(&mut spins);
            let capacity = self.buckets.len();
            let (mut index, stride) = probe_params(hash, capacity);
            for _ in 0..capacity {
                let bucket = &self.buckets[index];
                let hash_coll = bucket.hash_coll;
                let outcome = match &bucket.slot {
                    Slot::Empty => ProbeHit::Absent,
                    Slot::Occupied {
                        key: existing,
                        value,
                    } if hash_coll & HASH_MASK == hash
                        && self.comparator.equals(existing, key) =>
                    {
                        ProbeHit::Found(value)
                    }
                    // A clear collision marker means no other key's chain
                    // continues past this slot.
                    _ if hash_coll & COLLISION_BIT != 0 => ProbeHit::Chain,
                    _ => ProbeHit::Absent,
                };
                if !self.read_valid(version) {
                    reader_backoff(&mut spins);
                    continue 'retry;
                }
                match outcome {
                    ProbeHit::Found(value) => return Some(value),
                    ProbeHit::Absent => return None,
                    ProbeHit::Chain => index = (index + stride) % capacity,
                }
            }
            return None;
        }
    }

    /// Returns whether an entry with an equal key exists.
    ///
    /// Runs the same validated-read protocol as [`get`](Self::get).
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns whether any live entry stores a value equal to `value`.
    ///
    /// This is a full scan, unlike the hashed key lookups.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|(_, candidate)| candidate == value)
    }

    /// Removes the entry for `key`, returning its value.
    ///
    /// The slot is retained as a tombstone when another key's probe chain
    /// passes through it, and fully emptied otherwise. Tombstones are
    /// reclaimed by the next rehash.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use double_hash::Hashtable;
    ///
    /// # fn main() -> Result<(), double_hash::TableError> {
    /// let mut table = Hashtable::new();
    /// table.insert("x", 10)?;
    /// assert_eq!(table.remove(&"x"), Some(10));
    /// assert_eq!(table.remove(&"x"), None);
    /// # Ok(())
    /// # }
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.comparator.hash(key) & HASH_MASK;
        let capacity = self.buckets.len();
        let (mut index, stride) = probe_params(hash, capacity);

        for _ in 0..capacity {
            let hash_coll = self.buckets[index].hash_coll;
            let found = match &self.buckets[index].slot {
                Slot::Occupied { key: existing, .. } => {
                    hash_coll & HASH_MASK == hash && self.comparator.equals(existing, key)
                }
                _ => false,
            };

            if found {
                self.begin_mutation();
                let bucket = &mut self.buckets[index];
                let retained = hash_coll & COLLISION_BIT;
                let replacement = if retained != 0 {
                    Slot::Tombstone
                } else {
                    Slot::Empty
                };
                let removed = core::mem::replace(&mut bucket.slot, replacement);
                bucket.hash_coll = retained;
                self.count -= 1;
                self.commit_mutation();
                return match removed {
                    Slot::Occupied { value, .. } => Some(value),
                    _ => None,
                };
            }

            if hash_coll & COLLISION_BIT == 0 {
                return None;
            }
            index = (index + stride) % capacity;
        }
        None
    }

    /// Removes all entries and collision marks.
    ///
    /// A true no-op on an already empty table (the version does not move).
    pub fn clear(&mut self) {
        if self.count == 0 && self.occupancy == 0 {
            return;
        }
        self.begin_mutation();
        for bucket in &mut self.buckets {
            bucket.slot = Slot::Empty;
            bucket.hash_coll = 0;
        }
        self.count = 0;
        self.occupancy = 0;
        self.commit_mutation();
    }

    /// Grows the bucket array to the next qualifying prime capacity.
    fn expand(&mut self) -> Result<()> {
        let new_capacity = primes::expand_capacity(self.buckets.len())?;
        self.rehash(new_capacity, false);
        Ok(())
    }

    /// Rebuilds the bucket array at `new_capacity`, dropping tombstones.
    ///
    /// Entries are re-placed by their stored hash, or by freshly computed
    /// hashes when `force_rehash_keys` is set (used when the hashing
    /// backend changes). Bulk placement skips per-entry version traffic;
    /// the new array is installed as a single mutation.
    fn rehash(&mut self, new_capacity: usize, force_rehash_keys: bool) {
        let old = core::mem::take(&mut self.buckets);
        let mut new_buckets = allocate_buckets(new_capacity);
        let mut new_occupancy = 0;

        for bucket in old.into_vec() {
            if let Slot::Occupied { key, value } = bucket.slot {
                let hash = if force_rehash_keys {
                    self.comparator.hash(&key) & HASH_MASK
                } else {
                    bucket.hash_coll & HASH_MASK
                };
                put_entry(&mut new_buckets, key, value, hash, &mut new_occupancy);
            }
        }

        self.begin_mutation();
        self.buckets = new_buckets;
        self.occupancy = new_occupancy;
        let mut loadsize = (self.load_factor * new_capacity as f32) as usize;
        if loadsize >= new_capacity {
            loadsize = new_capacity - 1;
        }
        self.loadsize = loadsize;
        self.commit_mutation();
    }

    /// Switches natural hashing to keyed SipHash and rebuilds the table
    /// with freshly computed hash codes.
    ///
    /// `k0`/`k1` are the caller-supplied entropy; see
    /// [`KeyComparator::randomized`]. Comparators whose hashes come from a
    /// custom provider or unified equivalence are unaffected and no rehash
    /// happens.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use double_hash::Hashtable;
    ///
    /// # fn main() -> Result<(), double_hash::TableError> {
    /// let mut table = Hashtable::new();
    /// table.insert("a", 1)?;
    /// table.randomize_hashing(0x8af6_37cf, 0x1d27_9c06);
    /// assert_eq!(table.get(&"a"), Some(&1));
    /// # Ok(())
    /// # }
    /// ```
    pub fn randomize_hashing(&mut self, k0: u64, k1: u64) {
        if self.comparator.randomize(k0, k1) {
            self.rehash(self.buckets.len(), true);
        }
    }
}

/// Bulk placement used by rehash: no tombstones exist in the fresh array
/// and no duplicate or version bookkeeping applies.
fn put_entry<K, V>(
    buckets: &mut [Bucket<K, V>],
    key: K,
    value: V,
    hash: u32,
    occupancy: &mut usize,
) {
    let capacity = buckets.len();
    let (mut index, stride) = probe_params(hash, capacity);
    for _ in 0..capacity {
        let bucket = &mut buckets[index];
        if !matches!(bucket.slot, Slot::Occupied { .. }) {
            bucket.slot = Slot::Occupied { key, value };
            bucket.hash_coll |= hash;
            return;
        }
        if bucket.hash_coll & COLLISION_BIT == 0 {
            bucket.hash_coll |= COLLISION_BIT;
            *occupancy += 1;
        }
        index = (index + stride) % capacity;
    }
    panic!("probe cycle exhausted during rehash: loadsize/capacity invariant broken");
}

#[cfg(feature = "foldhash")]
impl<K, V> Default for Hashtable<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Hashtable<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Snapshots the table: live entries, tombstone layout, load factor,
    /// and the current version are all preserved; the copy is fully
    /// independent afterward.
    fn clone(&self) -> Self {
        Hashtable {
            buckets: self
                .buckets
                .iter()
                .map(|bucket| Bucket {
                    slot: bucket.slot.clone(),
                    hash_coll: bucket.hash_coll,
                })
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            count: self.count,
            occupancy: self.occupancy,
            loadsize: self.loadsize,
            load_factor: self.load_factor,
            version: AtomicU64::new(self.version.load(Ordering::Acquire)),
            writer_in_progress: AtomicBool::new(false),
            comparator: self.comparator.clone(),
        }
    }
}

impl<K, V> Debug for Hashtable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.iter() {
            map.entry(key, value);
        }
        map.finish()
    }
}

/// A borrowing iterator over a table's live entries.
///
/// Created by [`Hashtable::iter`]. Yields `(&K, &V)` in bucket order.
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Bucket<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for bucket in self.buckets.by_ref() {
            if let Slot::Occupied { key, value } = &bucket.slot {
                return Some((key, value));
            }
        }
        None
    }
}
