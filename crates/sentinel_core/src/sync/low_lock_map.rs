//! # Low-Lock Map
//!
//! Copy-on-write hash map for player state shared between the primary thread
//! and background workers.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │         LowLockMap          │
//!                    │                             │
//!                    │  ArcSwap ──► Arc<Table N>   │
//!                    │                             │
//!                    │  write_lock: Mutex<()>      │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┼────────────────┐
//!              ▼               ▼                ▼
//!      ┌──────────────┐ ┌─────────────┐ ┌──────────────┐
//!      │ get()        │ │ insert/     │ │ snapshot()   │
//!      │ atomic load  │ │ remove      │ │ Arc<Table N> │
//!      │ (no lock)    │ │ lock+clone+ │ │ restartable  │
//!      │              │ │ publish     │ │              │
//!      └──────────────┘ └─────────────┘ └──────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - Reads: any thread, never blocked by writers
//! - Writes: any thread, serialized by `write_lock`
//! - A batch removal is published once, readers see all of it or none of it
//!
//! Writes clone the table, which is a vector of `Arc` pointers. Player counts
//! are in the hundreds, so this stays far below a tick budget.

use std::borrow::Borrow;
use std::collections::hash_map;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

type Table<K, V> = FxHashMap<K, Arc<V>>;

/// Concurrent map with lock-free point reads and serialized writes.
///
/// Values are handed out as `Arc<V>`; a value stays valid for as long as a
/// caller holds it, even after it has been removed from the map.
pub struct LowLockMap<K, V> {
    /// Currently published table.
    table: ArcSwap<Table<K, V>>,
    /// Serializes writers. Readers never touch it.
    write_lock: Mutex<()>,
}

impl<K, V> LowLockMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: ArcSwap::from_pointee(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the value for `key`, if present.
    ///
    /// Never blocks, whatever writers are doing.
    #[inline]
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.load().get(key).cloned()
    }

    /// Returns whether `key` is present.
    #[inline]
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.load().contains_key(key)
    }

    /// Number of entries in the currently published table.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    /// Returns true if the published table is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Gets the value for `key`, creating it with `factory` if absent.
    ///
    /// If several threads race on the same key, every one of them gets the
    /// same `Arc`; only one factory result is ever retained.
    pub fn get_or_insert_with<F>(&self, key: K, factory: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        match self.try_get_or_insert_with(key, || Ok::<V, Infallible>(factory())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible version of [`get_or_insert_with`](Self::get_or_insert_with).
    ///
    /// The factory runs outside the write lock. If it fails, the error is
    /// returned and nothing is inserted.
    ///
    /// # Errors
    ///
    /// Returns whatever the factory returns.
    pub fn try_get_or_insert_with<F, E>(&self, key: K, factory: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }
        let created = Arc::new(factory()?);
        Ok(self.insert_if_absent(key, created))
    }

    /// Inserts `value` unless `key` is already present.
    ///
    /// Returns the value that is in the map afterwards.
    pub fn insert_if_absent(&self, key: K, value: Arc<V>) -> Arc<V> {
        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        if let Some(existing) = current.get(&key) {
            return Arc::clone(existing);
        }
        let mut next: Table<K, V> = (*current).clone();
        next.insert(key, Arc::clone(&value));
        self.table.store(Arc::new(next));
        value
    }

    /// Inserts or replaces the value for `key`, returning the previous one.
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        let _guard = self.write_lock.lock();
        let mut next: Table<K, V> = (*self.table.load_full()).clone();
        let previous = next.insert(key, Arc::new(value));
        self.table.store(Arc::new(next));
        previous
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        if !current.contains_key(key) {
            return None;
        }
        let mut next: Table<K, V> = (*current).clone();
        let removed = next.remove(key);
        self.table.store(Arc::new(next));
        removed
    }

    /// Removes every listed key in one publication.
    ///
    /// Keys that are not present are ignored. Returns the removed entries in
    /// the order the keys were given.
    pub fn remove_batch<'a, I>(&self, keys: I) -> Vec<(K, Arc<V>)>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        let mut next: Option<Table<K, V>> = None;
        let mut removed = Vec::new();

        for key in keys {
            if !current.contains_key(key) {
                continue;
            }
            let table = next.get_or_insert_with(|| (*current).clone());
            if let Some(entry) = table.remove_entry(key) {
                removed.push(entry);
            }
        }

        if let Some(table) = next {
            self.table.store(Arc::new(table));
        }
        removed
    }

    /// Removes every entry, returning how many there were.
    pub fn clear(&self) -> usize {
        let _guard = self.write_lock.lock();
        let count = self.table.load().len();
        if count > 0 {
            self.table.store(Arc::new(FxHashMap::default()));
        }
        count
    }

    /// Returns the keys of the currently published table.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.table.load().keys().cloned().collect()
    }

    /// Captures the currently published table.
    ///
    /// The snapshot is immutable: later inserts and removals do not show up
    /// in it, and it can be iterated any number of times.
    #[must_use]
    pub fn snapshot(&self) -> MapSnapshot<K, V> {
        MapSnapshot {
            table: self.table.load_full(),
        }
    }
}

impl<K, V> Default for LowLockMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for LowLockMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LowLockMap")
            .field("len", &self.table.load().len())
            .finish()
    }
}

/// Immutable view of a [`LowLockMap`] at one point in time.
pub struct MapSnapshot<K, V> {
    table: Arc<Table<K, V>>,
}

impl<K, V> MapSnapshot<K, V>
where
    K: Eq + Hash,
{
    /// Number of entries in the snapshot.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the snapshot holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Looks up `key` in the snapshot.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.get(key)
    }

    /// Iterates over all `(key, value)` pairs.
    pub fn iter(&self) -> hash_map::Iter<'_, K, Arc<V>> {
        self.table.iter()
    }

    /// Iterates over the values.
    pub fn values(&self) -> hash_map::Values<'_, K, Arc<V>> {
        self.table.values()
    }
}

impl<'a, K, V> IntoIterator for &'a MapSnapshot<K, V> {
    type Item = (&'a K, &'a Arc<V>);
    type IntoIter = hash_map::Iter<'a, K, Arc<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter()
    }
}

impl<K, V> Clone for MapSnapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}
