use crate::error::Result;
use crate::error::TableError;
use crate::table::Hashtable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    NotStarted,
    At(usize),
    Ended,
}

/// Traversal core shared by the three cursor views.
///
/// A cursor captures the table's version at creation and holds no borrow;
/// every step revalidates the version against the table passed in, so a
/// mutation between steps (including a same-key value overwrite) surfaces
/// as [`TableError::Invalidated`] instead of yielding torn output.
///
/// Traversal walks the bucket array backward from the end, yielding live
/// slots. The order is an artifact of bucket indices, not an API
/// guarantee.
#[derive(Clone, Debug)]
struct RawCursor {
    version: u64,
    position: Position,
}

impl RawCursor {
    fn new<K, V>(table: &Hashtable<K, V>) -> Self {
        RawCursor {
            version: table.version(),
            position: Position::NotStarted,
        }
    }

    fn check_version<K, V>(&self, table: &Hashtable<K, V>) -> Result<()> {
        if table.version() != self.version {
            return Err(TableError::Invalidated);
        }
        Ok(())
    }

    fn move_next<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<bool> {
        self.check_version(table)?;
        let mut index = match self.position {
            Position::NotStarted => table.bucket_count(),
            Position::At(current) => current,
            Position::Ended => return Ok(false),
        };
        while index > 0 {
            index -= 1;
            if table.is_live(index) {
                self.position = Position::At(index);
                return Ok(true);
            }
        }
        self.position = Position::Ended;
        Ok(false)
    }

    fn reset<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<()> {
        self.check_version(table)?;
        self.position = Position::NotStarted;
        Ok(())
    }

    fn current<'a, K, V>(&self, table: &'a Hashtable<K, V>) -> Result<(&'a K, &'a V)> {
        let index = match self.position {
            Position::At(index) => index,
            Position::NotStarted | Position::Ended => return Err(TableError::InvalidPosition),
        };
        self.check_version(table)?;
        // A stale or foreign index past this point means the cursor was
        // used with a table it does not describe.
        table.bucket_entry(index).ok_or(TableError::Invalidated)
    }
}

/// A version-checked cursor over a table's entries.
///
/// Created by [`Hashtable::entry_cursor`]. The cursor starts before the
/// first entry; call [`move_next`](EntryCursor::move_next) to advance and
/// [`current`](EntryCursor::current) to read the entry it is positioned
/// on. A cursor must only be used with the table that created it.
///
/// # Examples
///
/// ```rust
/// use double_hash::Hashtable;
///
/// # fn main() -> Result<(), double_hash::TableError> {
/// let mut table = Hashtable::new();
/// table.insert("a", 1)?;
/// table.insert("b", 2)?;
///
/// let mut total = 0;
/// let mut cursor = table.entry_cursor();
/// while cursor.move_next(&table)? {
///     let (_key, value) = cursor.current(&table)?;
///     total += *value;
/// }
/// assert_eq!(total, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct EntryCursor {
    raw: RawCursor,
}

impl EntryCursor {
    /// Advances to the next live entry; `Ok(false)` once exhausted.
    ///
    /// Fails with [`TableError::Invalidated`] if the table was mutated
    /// after this cursor was created.
    pub fn move_next<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<bool> {
        self.raw.move_next(table)
    }

    /// Returns the entry the cursor is positioned on.
    ///
    /// Fails with [`TableError::InvalidPosition`] before the first
    /// `move_next` or after exhaustion, and with
    /// [`TableError::Invalidated`] if the table was mutated since the
    /// cursor was created.
    pub fn current<'a, K, V>(&self, table: &'a Hashtable<K, V>) -> Result<(&'a K, &'a V)> {
        self.raw.current(table)
    }

    /// Returns the cursor to its starting state.
    ///
    /// Fails with [`TableError::Invalidated`] if the table was mutated
    /// since the cursor was created.
    pub fn reset<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<()> {
        self.raw.reset(table)
    }
}

/// A version-checked cursor projecting only keys.
///
/// Created by [`Hashtable::key_cursor`]; shares [`EntryCursor`]'s
/// traversal and invalidation behavior.
#[derive(Clone, Debug)]
pub struct KeyCursor {
    raw: RawCursor,
}

impl KeyCursor {
    /// Advances to the next live entry; `Ok(false)` once exhausted.
    pub fn move_next<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<bool> {
        self.raw.move_next(table)
    }

    /// Returns the key the cursor is positioned on.
    pub fn current<'a, K, V>(&self, table: &'a Hashtable<K, V>) -> Result<&'a K> {
        self.raw.current(table).map(|(key, _)| key)
    }

    /// Returns the cursor to its starting state.
    pub fn reset<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<()> {
        self.raw.reset(table)
    }
}

/// A version-checked cursor projecting only values.
///
/// Created by [`Hashtable::value_cursor`]; shares [`EntryCursor`]'s
/// traversal and invalidation behavior.
#[derive(Clone, Debug)]
pub struct ValueCursor {
    raw: RawCursor,
}

impl ValueCursor {
    /// Advances to the next live entry; `Ok(false)` once exhausted.
    pub fn move_next<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<bool> {
        self.raw.move_next(table)
    }

    /// Returns the value the cursor is positioned on.
    pub fn current<'a, K, V>(&self, table: &'a Hashtable<K, V>) -> Result<&'a V> {
        self.raw.current(table).map(|(_, value)| value)
    }

    /// Returns the cursor to its starting state.
    pub fn reset<K, V>(&mut self, table: &Hashtable<K, V>) -> Result<()> {
        self.raw.reset(table)
    }
}

impl<K, V> Hashtable<K, V> {
    /// Creates a cursor over `(key, value)` entries.
    pub fn entry_cursor(&self) -> EntryCursor {
        EntryCursor {
            raw: RawCursor::new(self),
        }
    }

    /// Creates a cursor over keys.
    pub fn key_cursor(&self) -> KeyCursor {
        KeyCursor {
            raw: RawCursor::new(self),
        }
    }

    /// Creates a cursor over values.
    pub fn value_cursor(&self) -> ValueCursor {
        ValueCursor {
            raw: RawCursor::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn sample_table() -> Hashtable<u64, u64> {
        let mut table = Hashtable::new();
        for key in 0..10 {
            table.insert(key, key * 100).unwrap();
        }
        table
    }

    #[test]
    fn cursor_visits_every_entry_exactly_once() {
        let table = sample_table();
        let mut cursor = table.entry_cursor();
        let mut seen = Vec::new();
        while cursor.move_next(&table).unwrap() {
            let (key, value) = cursor.current(&table).unwrap();
            assert_eq!(*value, key * 100);
            seen.push(*key);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn exhausted_cursor_stays_ended() {
        let table = sample_table();
        let mut cursor = table.entry_cursor();
        while cursor.move_next(&table).unwrap() {}
        assert!(!cursor.move_next(&table).unwrap());
        assert_eq!(cursor.current(&table), Err(TableError::InvalidPosition));
    }

    #[test]
    fn current_before_first_step_is_invalid() {
        let table = sample_table();
        let cursor = table.entry_cursor();
        assert_eq!(cursor.current(&table), Err(TableError::InvalidPosition));
    }

    #[test]
    fn empty_table_cursor_ends_immediately() {
        let table: Hashtable<u64, u64> = Hashtable::new();
        let mut cursor = table.entry_cursor();
        assert!(!cursor.move_next(&table).unwrap());
        assert_eq!(cursor.current(&table), Err(TableError::InvalidPosition));
    }

    #[test]
    fn insert_invalidates_a_cursor() {
        let mut table = sample_table();
        let mut cursor = table.entry_cursor();
        table.insert(99, 0).unwrap();
        assert_eq!(cursor.move_next(&table), Err(TableError::Invalidated));
    }

    #[test]
    fn remove_invalidates_a_cursor() {
        let mut table = sample_table();
        let mut cursor = table.entry_cursor();
        table.remove(&3).unwrap();
        assert_eq!(cursor.move_next(&table), Err(TableError::Invalidated));
    }

    #[test]
    fn clear_invalidates_a_cursor() {
        let mut table = sample_table();
        let mut cursor = table.entry_cursor();
        table.clear();
        assert_eq!(cursor.move_next(&table), Err(TableError::Invalidated));
    }

    #[test]
    fn value_overwrite_invalidates_a_cursor() {
        let mut table = sample_table();
        let mut cursor = table.entry_cursor();
        assert!(cursor.move_next(&table).unwrap());
        table.insert(3, 999).unwrap();
        assert_eq!(cursor.current(&table), Err(TableError::Invalidated));
        assert_eq!(cursor.move_next(&table), Err(TableError::Invalidated));
    }

    #[test]
    fn lookups_do_not_invalidate_a_cursor() {
        let table = sample_table();
        let mut cursor = table.entry_cursor();
        let mut steps = 0;
        while cursor.move_next(&table).unwrap() {
            assert!(table.get(&3).is_some());
            assert!(table.contains_key(&7));
            steps += 1;
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn reset_restarts_a_valid_cursor() {
        let table = sample_table();
        let mut cursor = table.entry_cursor();
        assert!(cursor.move_next(&table).unwrap());
        assert!(cursor.move_next(&table).unwrap());
        cursor.reset(&table).unwrap();
        let mut steps = 0;
        while cursor.move_next(&table).unwrap() {
            steps += 1;
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn reset_after_mutation_is_rejected() {
        let mut table = sample_table();
        let mut cursor = table.entry_cursor();
        table.insert(99, 0).unwrap();
        assert_eq!(cursor.reset(&table), Err(TableError::Invalidated));
    }

    #[test]
    fn key_and_value_views_project_the_same_traversal() {
        let table = sample_table();

        let mut keys = Vec::new();
        let mut key_cursor = table.key_cursor();
        while key_cursor.move_next(&table).unwrap() {
            keys.push(*key_cursor.current(&table).unwrap());
        }

        let mut values = Vec::new();
        let mut value_cursor = table.value_cursor();
        while value_cursor.move_next(&table).unwrap() {
            values.push(*value_cursor.current(&table).unwrap());
        }

        assert_eq!(keys.len(), 10);
        assert_eq!(values.len(), 10);
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(*value, key * 100, "views share one traversal order");
        }
    }
}
