//! # Expiration
//!
//! Logged-out players are remembered in an access-ordered log, oldest
//! logout first. The rare maintenance pass pops entries off the old end until
//! it meets one that has not expired yet, and stages the popped identities in
//! a [`RemovalBatch`].
//!
//! ```text
//!  oldest                                   newest
//!  ┌──────┬──────┬──────┬──────┬──────┐
//!  │ A:10 │ B:40 │ C:70 │ D:90 │ E:95 │   now = 100, ttl = 50
//!  └──────┴──────┴──────┴──────┴──────┘
//!   staged staged  stop
//! ```
//!
//! A player who comes back between staging and application is marked in the
//! batch and survives the removal.

use lru::LruCache;
use rustc_hash::FxHashSet;
use sentinel_core::OrderedSet;

use crate::identity::EntityId;

/// Identity → last logout time, ordered by insertion.
pub struct ExpirationLog {
    entries: LruCache<EntityId, u64>,
}

impl ExpirationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Records a logout. A repeated logout moves the player to the newest end.
    pub fn record_deactivation(&mut self, id: EntityId, at_ms: u64) {
        self.entries.put(id, at_ms);
    }

    /// Forgets `id`, returning its logout time.
    pub fn remove(&mut self, id: &EntityId) -> Option<u64> {
        self.entries.pop(id)
    }

    /// Whether `id` is waiting to expire.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains(id)
    }

    /// Logout time of `id`, without touching the order.
    #[must_use]
    pub fn logout_time(&self, id: &EntityId) -> Option<u64> {
        self.entries.peek(id).copied()
    }

    /// Number of logged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pops every entry at least `ttl_ms` old, oldest first.
    ///
    /// Stops at the first entry that is still fresh; younger entries behind
    /// it are not inspected.
    pub fn drain_expired(&mut self, now_ms: u64, ttl_ms: u64) -> Vec<EntityId> {
        let mut expired = Vec::new();
        while let Some((_, logout)) = self.entries.peek_lru() {
            if now_ms.saturating_sub(*logout) < ttl_ms {
                break;
            }
            if let Some((id, _)) = self.entries.pop_lru() {
                expired.push(id);
            }
        }
        expired
    }

    /// Moves every logout time after `now_ms` back to `now_ms`, keeping order.
    pub fn clamp_to(&mut self, now_ms: u64) {
        for (_, logout) in self.entries.iter_mut() {
            if *logout > now_ms {
                *logout = now_ms;
            }
        }
    }
}

impl Default for ExpirationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpirationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationLog")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Identities staged for removal.
#[derive(Debug, Default)]
pub struct RemovalBatch {
    staged: OrderedSet<EntityId>,
    reactivated: FxHashSet<EntityId>,
}

impl RemovalBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `id`. Staging again clears an earlier reactivation mark.
    pub fn stage(&mut self, id: EntityId) -> bool {
        self.reactivated.remove(&id);
        self.staged.insert(id)
    }

    /// Marks a staged identity as active again.
    pub fn mark_reactivated(&mut self, id: EntityId) -> bool {
        self.staged.contains(&id) && self.reactivated.insert(id)
    }

    /// Whether `id` is staged.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.staged.contains(id)
    }

    /// Number of staged identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Empties the batch, returning staged identities in staging order plus
    /// the set of those reactivated since.
    pub fn take(&mut self) -> (Vec<EntityId>, FxHashSet<EntityId>) {
        (self.staged.drain(), std::mem::take(&mut self.reactivated))
    }

    /// Drops everything staged.
    pub fn clear(&mut self) {
        self.staged.clear();
        self.reactivated.clear();
    }
}
