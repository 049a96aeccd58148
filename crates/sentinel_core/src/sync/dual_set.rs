//! # Dual-Context Set
//!
//! Set fed from two contexts without sharing one lock between them.
//!
//! ```text
//!   Primary thread ──add_primary──►  ┌────────────────┐
//!                                    │ primary buffer │ ◄── retain_primary (tick)
//!                                    └───────▲────────┘
//!                                            │ merge_into_primary (tick start)
//!   Worker N ──add_background──►     ┌───────┴────────┐
//!   Worker M ──add_background──►     │ backgr. buffer │
//!                                    └────────────────┘
//! ```
//!
//! Merging is one-way: background entries move into the primary buffer, never
//! the reverse. The primary buffer has its own lock, but only the primary
//! thread takes it, so it is uncontended in practice.

use std::hash::Hash;

use parking_lot::Mutex;

use super::ordered_set::OrderedSet;

/// Pending set with separate primary and background buffers.
#[derive(Debug)]
pub struct DualSet<T> {
    /// Entries visible to the primary thread's iteration.
    primary: Mutex<OrderedSet<T>>,
    /// Entries added from other threads since the last merge.
    background: Mutex<OrderedSet<T>>,
}

impl<T> DualSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            primary: Mutex::new(OrderedSet::new()),
            background: Mutex::new(OrderedSet::new()),
        }
    }

    /// Adds from the primary thread.
    pub fn add_primary(&self, value: T) -> bool {
        self.primary.lock().insert(value)
    }

    /// Adds from any other thread.
    pub fn add_background(&self, value: T) -> bool {
        self.background.lock().insert(value)
    }

    /// Moves all background entries into the primary buffer.
    ///
    /// Both buffers are locked for the move, primary first, so a concurrent
    /// membership query sees every entry in one buffer or the other. An
    /// entry added while this waits is merged now or on the next call.
    /// Returns how many entries were taken from the background buffer.
    pub fn merge_into_primary(&self) -> usize {
        let mut primary = self.primary.lock();
        let taken = std::mem::take(&mut *self.background.lock());
        let count = taken.len();
        if count > 0 {
            primary.extend_from(taken);
        }
        count
    }

    /// Iterates the primary buffer, keeping entries for which `keep` returns true.
    ///
    /// `keep` runs with the primary buffer locked. It must not add to this set
    /// from the same thread; use [`add_background`](Self::add_background) for
    /// re-entrant registration, which is merged on the next tick.
    pub fn retain_primary<F>(&self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.primary.lock().retain(keep);
    }

    /// Copies the primary buffer in order.
    #[must_use]
    pub fn primary_entries(&self) -> Vec<T> {
        self.primary.lock().iter().cloned().collect()
    }

    /// Membership as seen by the primary thread: its own buffer, then
    /// entries still waiting in the background buffer.
    #[must_use]
    pub fn contains_primary(&self, value: &T) -> bool {
        self.contains_either(value)
    }

    /// Membership as seen by a background thread: the background buffer
    /// and everything already merged.
    #[must_use]
    pub fn contains_background(&self, value: &T) -> bool {
        self.contains_either(value)
    }

    /// Locks primary then background, the same order as the merge.
    fn contains_either(&self, value: &T) -> bool {
        let primary = self.primary.lock();
        if primary.contains(value) {
            return true;
        }
        self.background.lock().contains(value)
    }

    /// Removes `value` from both buffers.
    pub fn remove(&self, value: &T) -> bool {
        let mut primary = self.primary.lock();
        let from_primary = primary.remove(value);
        let from_background = self.background.lock().remove(value);
        from_primary || from_background
    }

    /// Size of the primary buffer.
    #[must_use]
    pub fn primary_len(&self) -> usize {
        self.primary.lock().len()
    }

    /// Size of the background buffer.
    #[must_use]
    pub fn background_len(&self) -> usize {
        self.background.lock().len()
    }

    /// Empties both buffers.
    pub fn clear(&self) {
        let mut primary = self.primary.lock();
        primary.clear();
        self.background.lock().clear();
    }
}

impl<T> Default for DualSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
