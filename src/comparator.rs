use alloc::sync::Arc;
use core::cmp::Ordering;
#[cfg(feature = "foldhash")]
use core::hash::BuildHasher;
use core::hash::Hash;
use core::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::error::Result;
use crate::error::TableError;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "foldhash", feature = "std"))] {
        type FoldState = foldhash::fast::RandomState;
    } else if #[cfg(feature = "foldhash")] {
        type FoldState = foldhash::fast::FixedState;
    }
}

/// Folds a 64-bit hash down to the 32-bit codes the bucket array stores.
pub(crate) fn truncate_hash(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// A unified equality + hashing strategy supplied as one object.
///
/// Implementations must hash equal keys equally. The table does not verify
/// this; a comparer that violates it produces wrong lookup results (keys
/// silently not found), never crashes or memory unsafety.
pub trait Equivalence<K>: Send + Sync {
    /// Returns whether `a` and `b` identify the same entry.
    fn equals(&self, a: &K, b: &K) -> bool;

    /// Returns the 32-bit hash code for `key`.
    fn hash(&self, key: &K) -> u32;
}

/// Hashing backend used whenever no custom hash provider applies.
#[derive(Clone)]
enum NaturalHash {
    #[cfg(feature = "foldhash")]
    Fold(FoldState),
    Sip { k0: u64, k1: u64 },
}

impl NaturalHash {
    fn hash_key<K: Hash>(&self, key: &K) -> u32 {
        let hash = match self {
            #[cfg(feature = "foldhash")]
            NaturalHash::Fold(state) => state.hash_one(key),
            NaturalHash::Sip { k0, k1 } => {
                let mut hasher = SipHasher13::new_with_keys(*k0, *k1);
                key.hash(&mut hasher);
                hasher.finish()
            }
        };
        truncate_hash(hash)
    }
}

type OrderingFn<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;
type HashProviderFn<K> = Arc<dyn Fn(&K) -> u32 + Send + Sync>;

enum Style<K> {
    Natural(NaturalHash),
    Legacy {
        ordering: Option<OrderingFn<K>>,
        provider: Option<HashProviderFn<K>>,
        natural: NaturalHash,
    },
    Unified(Arc<dyn Equivalence<K>>),
}

/// The equality and hashing strategy for a table's keys.
///
/// A comparator starts from natural behavior (`Hash + Eq` through the
/// crate's hashing backend) and can be customized in one of two mutually
/// exclusive styles:
///
/// - composing an ordering function (equality becomes
///   `compare(a, b) == Ordering::Equal`) and/or a hash-provider function,
///   each independently, with natural behavior filling the other half;
/// - supplying a single [`Equivalence`] object for both halves.
///
/// Layering one style onto a comparator already customized with the other
/// fails with [`TableError::MixedComparison`].
///
/// Callers supplying custom pieces must keep equality and hashing
/// consistent: equal keys must yield equal hash codes. Violations are not
/// detected and make lookups unreliable.
///
/// # Examples
///
/// ```rust
/// use double_hash::KeyComparator;
///
/// # fn main() -> Result<(), double_hash::TableError> {
/// let comparator = KeyComparator::natural()
///     .with_ordering(|a: &u64, b: &u64| (a % 10).cmp(&(b % 10)))?
///     .with_hash_provider(|key: &u64| (key % 10) as u32)?;
///
/// assert!(comparator.equals(&13, &23));
/// assert_eq!(comparator.hash(&13), comparator.hash(&23));
/// # Ok(())
/// # }
/// ```
pub struct KeyComparator<K> {
    style: Style<K>,
}

impl<K> core::fmt::Debug for KeyComparator<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let style = match &self.style {
            Style::Natural(_) => "Natural",
            Style::Legacy { .. } => "Legacy",
            Style::Unified(_) => "Unified",
        };
        f.debug_struct("KeyComparator").field("style", &style).finish()
    }
}

impl<K> Clone for KeyComparator<K> {
    fn clone(&self) -> Self {
        let style = match &self.style {
            Style::Natural(natural) => Style::Natural(natural.clone()),
            Style::Legacy {
                ordering,
                provider,
                natural,
            } => Style::Legacy {
                ordering: ordering.clone(),
                provider: provider.clone(),
                natural: natural.clone(),
            },
            Style::Unified(equivalence) => Style::Unified(Arc::clone(equivalence)),
        };
        KeyComparator { style }
    }
}

#[cfg(feature = "foldhash")]
impl<K> Default for KeyComparator<K> {
    fn default() -> Self {
        Self::natural()
    }
}

impl<K> KeyComparator<K> {
    /// Creates a comparator using natural equality and hashing.
    #[cfg(feature = "foldhash")]
    pub fn natural() -> Self {
        KeyComparator {
            style: Style::Natural(NaturalHash::Fold(FoldState::default())),
        }
    }

    /// Creates a comparator whose natural hashing is keyed SipHash.
    ///
    /// The keys are the caller's entropy; two comparators built with the
    /// same keys hash identically, which makes this the reproducible
    /// (and hash-flood resistant, given secret keys) backend.
    pub fn randomized(k0: u64, k1: u64) -> Self {
        KeyComparator {
            style: Style::Natural(NaturalHash::Sip { k0, k1 }),
        }
    }

    /// Creates a comparator from a unified [`Equivalence`] object.
    pub fn unified(equivalence: impl Equivalence<K> + 'static) -> Self {
        KeyComparator {
            style: Style::Unified(Arc::new(equivalence)),
        }
    }

    /// Composes an ordering function; equality becomes
    /// `ordering(a, b) == Ordering::Equal`.
    ///
    /// Fails with [`TableError::MixedComparison`] on a comparator already
    /// carrying a unified equivalence.
    pub fn with_ordering(
        self,
        ordering: impl Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    ) -> Result<Self> {
        match self.style {
            Style::Unified(_) => Err(TableError::MixedComparison),
            Style::Natural(natural) => Ok(KeyComparator {
                style: Style::Legacy {
                    ordering: Some(Arc::new(ordering)),
                    provider: None,
                    natural,
                },
            }),
            Style::Legacy {
                provider, natural, ..
            } => Ok(KeyComparator {
                style: Style::Legacy {
                    ordering: Some(Arc::new(ordering)),
                    provider,
                    natural,
                },
            }),
        }
    }

    /// Composes a hash-provider function used in place of natural hashing.
    ///
    /// Fails with [`TableError::MixedComparison`] on a comparator already
    /// carrying a unified equivalence.
    pub fn with_hash_provider(
        self,
        provider: impl Fn(&K) -> u32 + Send + Sync + 'static,
    ) -> Result<Self> {
        match self.style {
            Style::Unified(_) => Err(TableError::MixedComparison),
            Style::Natural(natural) => Ok(KeyComparator {
                style: Style::Legacy {
                    ordering: None,
                    provider: Some(Arc::new(provider)),
                    natural,
                },
            }),
            Style::Legacy {
                ordering, natural, ..
            } => Ok(KeyComparator {
                style: Style::Legacy {
                    ordering,
                    provider: Some(Arc::new(provider)),
                    natural,
                },
            }),
        }
    }

    /// Replaces the comparison strategy with a unified [`Equivalence`].
    ///
    /// Fails with [`TableError::MixedComparison`] on a comparator already
    /// customized with an ordering or hash-provider function.
    pub fn with_equivalence(self, equivalence: impl Equivalence<K> + 'static) -> Result<Self> {
        match self.style {
            Style::Natural(_)
            | Style::Legacy {
                ordering: None,
                provider: None,
                ..
            }
            | Style::Unified(_) => Ok(KeyComparator {
                style: Style::Unified(Arc::new(equivalence)),
            }),
            Style::Legacy { .. } => Err(TableError::MixedComparison),
        }
    }

    /// Returns whether `a` and `b` identify the same entry.
    pub fn equals(&self, a: &K, b: &K) -> bool
    where
        K: Eq,
    {
        match &self.style {
            Style::Natural(_) => a == b,
            Style::Legacy {
                ordering: Some(ordering),
                ..
            } => ordering(a, b) == Ordering::Equal,
            Style::Legacy { ordering: None, .. } => a == b,
            Style::Unified(equivalence) => equivalence.equals(a, b),
        }
    }

    /// Returns the 32-bit hash code for `key`.
    pub fn hash(&self, key: &K) -> u32
    where
        K: Hash,
    {
        match &self.style {
            Style::Natural(natural) => natural.hash_key(key),
            Style::Legacy {
                provider: Some(provider),
                ..
            } => provider(key),
            Style::Legacy {
                provider: None,
                natural,
                ..
            } => natural.hash_key(key),
            Style::Unified(equivalence) => equivalence.hash(key),
        }
    }

    /// Swaps the natural hashing backend to keyed SipHash.
    ///
    /// Returns whether stored hash codes went stale, i.e. whether this
    /// comparator's hashing actually flows through the natural backend. A
    /// comparator with a custom hash provider or unified equivalence keeps
    /// hashing the same way and reports `false`.
    pub(crate) fn randomize(&mut self, k0: u64, k1: u64) -> bool {
        match &mut self.style {
            Style::Natural(natural)
            | Style::Legacy {
                provider: None,
                natural,
                ..
            } => {
                *natural = NaturalHash::Sip { k0, k1 };
                true
            }
            Style::Legacy {
                provider: Some(_), ..
            }
            | Style::Unified(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;

    use super::*;

    struct AsciiCaseInsensitive;

    impl Equivalence<String> for AsciiCaseInsensitive {
        fn equals(&self, a: &String, b: &String) -> bool {
            a.eq_ignore_ascii_case(b)
        }

        fn hash(&self, key: &String) -> u32 {
            let mut hasher = SipHasher13::new_with_keys(3, 5);
            key.to_ascii_lowercase().hash(&mut hasher);
            truncate_hash(hasher.finish())
        }
    }

    #[test]
    fn natural_equal_keys_hash_equal() {
        let comparator = KeyComparator::<u64>::natural();
        assert!(comparator.equals(&17, &17));
        assert!(!comparator.equals(&17, &18));
        assert_eq!(comparator.hash(&17), comparator.hash(&17));
    }

    #[test]
    fn randomized_hashing_is_keyed() {
        let a = KeyComparator::<u64>::randomized(1, 2);
        let b = KeyComparator::<u64>::randomized(1, 2);
        let c = KeyComparator::<u64>::randomized(9, 9);
        assert_eq!(a.hash(&42), b.hash(&42));
        assert_ne!(a.hash(&42), c.hash(&42));
    }

    #[test]
    fn ordering_defines_equality() {
        let comparator = KeyComparator::natural()
            .with_ordering(|a: &u64, b: &u64| (a % 10).cmp(&(b % 10)))
            .unwrap();
        assert!(comparator.equals(&3, &13));
        assert!(!comparator.equals(&3, &14));
    }

    #[test]
    fn hash_provider_overrides_natural_hashing() {
        let comparator = KeyComparator::natural()
            .with_hash_provider(|key: &u64| (key % 10) as u32)
            .unwrap();
        assert_eq!(comparator.hash(&123), 3);
        assert_eq!(comparator.hash(&3), comparator.hash(&13));
    }

    #[test]
    fn unified_equivalence_supplies_both_halves() {
        let comparator = KeyComparator::unified(AsciiCaseInsensitive);
        assert!(comparator.equals(&"Key".to_string(), &"kEY".to_string()));
        assert_eq!(
            comparator.hash(&"Key".to_string()),
            comparator.hash(&"kEY".to_string())
        );
    }

    #[test]
    fn mixing_legacy_onto_unified_is_rejected() {
        let unified = KeyComparator::unified(AsciiCaseInsensitive);
        let err = unified
            .with_ordering(|a: &String, b: &String| a.cmp(b))
            .unwrap_err();
        assert_eq!(err, TableError::MixedComparison);

        let unified = KeyComparator::unified(AsciiCaseInsensitive);
        let err = unified
            .with_hash_provider(|_: &String| 0)
            .unwrap_err();
        assert_eq!(err, TableError::MixedComparison);
    }

    #[test]
    fn mixing_unified_onto_legacy_is_rejected() {
        let legacy = KeyComparator::natural()
            .with_ordering(|a: &String, b: &String| a.cmp(b))
            .unwrap();
        let err = legacy.with_equivalence(AsciiCaseInsensitive).unwrap_err();
        assert_eq!(err, TableError::MixedComparison);
    }

    #[test]
    fn replacing_unified_with_unified_is_allowed() {
        let comparator = KeyComparator::unified(AsciiCaseInsensitive)
            .with_equivalence(AsciiCaseInsensitive)
            .unwrap();
        assert!(comparator.equals(&"a".to_string(), &"A".to_string()));
    }

    #[test]
    fn randomize_reports_whether_hashes_went_stale() {
        let mut natural = KeyComparator::<u64>::natural();
        assert!(natural.randomize(1, 2));
        assert_eq!(natural.hash(&7), KeyComparator::<u64>::randomized(1, 2).hash(&7));

        let mut with_provider = KeyComparator::natural()
            .with_hash_provider(|key: &u64| *key as u32)
            .unwrap();
        assert!(!with_provider.randomize(1, 2));
        assert_eq!(with_provider.hash(&7), 7);

        let mut unified = KeyComparator::unified(AsciiCaseInsensitive);
        assert!(!unified.randomize(1, 2));
    }

    #[test]
    fn ordering_only_keeps_natural_hashing() {
        let comparator = KeyComparator::randomized(4, 4)
            .with_ordering(|a: &u64, b: &u64| a.cmp(b))
            .unwrap();
        assert_eq!(
            comparator.hash(&99),
            KeyComparator::<u64>::randomized(4, 4).hash(&99)
        );
    }
}
