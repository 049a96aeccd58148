//! # Ordered Set
//!
//! Insertion-ordered set used for pending tasks and removal batches.

use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Set that remembers insertion order.
///
/// Not thread-safe on its own; callers wrap it in a lock.
#[derive(Clone, Debug)]
pub struct OrderedSet<T> {
    /// Members in insertion order.
    order: Vec<T>,
    /// Membership index.
    members: FxHashSet<T>,
}

impl<T> OrderedSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            members: FxHashSet::default(),
        }
    }

    /// Adds `value`. Returns false if it was already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.members.insert(value.clone()) {
            self.order.push(value);
            true
        } else {
            false
        }
    }

    /// Removes `value`. Returns false if it was not present.
    pub fn remove(&mut self, value: &T) -> bool {
        if self.members.remove(value) {
            self.order.retain(|v| v != value);
            true
        } else {
            false
        }
    }

    /// Returns whether `value` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if there are no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.order.iter()
    }

    /// Keeps only the members for which `keep` returns true, in order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        let members = &mut self.members;
        self.order.retain(|value| {
            if keep(value) {
                true
            } else {
                members.remove(value);
                false
            }
        });
    }

    /// Moves every member of `other` into `self`, preserving order.
    pub fn extend_from(&mut self, other: Self) {
        for value in other.order {
            self.insert(value);
        }
    }

    /// Removes and returns all members in insertion order.
    pub fn drain(&mut self) -> Vec<T> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }

    /// Removes all members.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

impl<T> Default for OrderedSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for OrderedSet<T>
where
    T: Eq + Hash + Clone,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_dedup() {
        let mut set = OrderedSet::new();
        assert!(set.insert(3));
        assert!(set.insert(1));
        assert!(!set.insert(3));
        assert!(set.insert(2));

        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_retain_keeps_index_in_sync() {
        let mut set: OrderedSet<u32> = (0..6).collect();
        set.retain(|v| v % 2 == 0);

        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert!(!set.contains(&3));
        // Removed values can be re-added.
        assert!(set.insert(3));
    }

    #[test]
    fn test_extend_and_drain() {
        let mut a: OrderedSet<u32> = [1, 2].into_iter().collect();
        let b: OrderedSet<u32> = [2, 3].into_iter().collect();
        a.extend_from(b);

        assert_eq!(a.drain(), vec![1, 2, 3]);
        assert!(a.is_empty());
        assert!(!a.contains(&1));
    }
}
