//! # Collaborators
//!
//! Checks keep their own per-player data outside the registry. They plug in
//! through two traits so the registry can drop that data when a player
//! expires or when everything is reset:
//!
//! - [`CheckDataFactory`]: owns the data of one check type, keyed by name.
//! - [`RemovalListener`]: anything else holding per-player state.
//!
//! Both are registered explicitly and notified in registration order.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::check_type::CheckType;
use crate::error::RegistryResult;
use crate::identity::EntityId;

/// Per-player data held by one check.
pub trait CheckData: Send + Sync {
    /// Whether debug output is enabled for this data.
    fn debug(&self) -> bool {
        false
    }

    /// Drops the part of this data that belongs to `check`.
    ///
    /// Returns true if anything was dropped. The default keeps everything,
    /// which makes the factory fall back to removing the whole entry.
    fn remove_sub_check_data(&self, _check: CheckType) -> bool {
        false
    }
}

/// Owner of per-player data for one check type.
pub trait CheckDataFactory: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// The check subtree this factory serves.
    fn check_type(&self) -> CheckType;

    /// Data for the player, if any exists.
    fn data_if_present(&self, id: EntityId, name: &str) -> Option<Arc<dyn CheckData>>;

    /// Drops the data held for `name`, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory could not drop the data. The registry
    /// logs it and carries on with the next player.
    fn remove_data(&self, name: &str) -> RegistryResult<Option<Arc<dyn CheckData>>>;

    /// Drops all data.
    fn remove_all_data(&self);

    /// The wall clock jumped backwards. Defaults to dropping everything.
    fn handle_time_ran_backwards(&self) {
        self.remove_all_data();
    }
}

/// Holder of per-player state outside any data factory.
pub trait RemovalListener: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Check subtree this listener belongs to, if any.
    ///
    /// A listener with a check type is notified by check-scoped removals
    /// that cover it. Listeners without one only hear about removals for
    /// [`CheckType::All`].
    fn check_type(&self) -> Option<CheckType> {
        None
    }

    /// Drops the state held for `name`. Returns true if anything was held.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener could not drop the state.
    fn remove_data(&self, name: &str) -> RegistryResult<bool>;

    /// Drops all state.
    fn remove_all_data(&self);

    /// The wall clock jumped backwards. Defaults to dropping everything.
    fn handle_time_ran_backwards(&self) {
        self.remove_all_data();
    }
}

/// Insertion-ordered list of shared collaborators, deduplicated by pointer.
pub(crate) struct Collaborators<T: ?Sized> {
    entries: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Collaborators<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Adds `entry` unless the same instance is already registered.
    pub(crate) fn register(&self, entry: Arc<T>) -> bool {
        let mut entries = self.entries.write();
        if entries.iter().any(|existing| Arc::ptr_eq(existing, &entry)) {
            return false;
        }
        entries.push(entry);
        true
    }

    pub(crate) fn unregister(&self, entry: &Arc<T>) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|existing| !Arc::ptr_eq(existing, entry));
        entries.len() != before
    }

    /// Copies the list so callbacks run without the lock held.
    pub(crate) fn list(&self) -> Vec<Arc<T>> {
        self.entries.read().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[test]
    fn test_register_dedupes_by_instance() {
        let list: Collaborators<Named> = Collaborators::new();
        let a = Arc::new(Named("a"));
        let twin = Arc::new(Named("a"));

        assert!(list.register(Arc::clone(&a)));
        assert!(!list.register(Arc::clone(&a)));
        assert!(list.register(Arc::clone(&twin)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_insertion_order_kept() {
        let list: Collaborators<Named> = Collaborators::new();
        let a = Arc::new(Named("a"));
        list.register(Arc::clone(&a));
        list.register(Arc::new(Named("b")));
        list.register(Arc::new(Named("c")));

        assert!(list.unregister(&a));
        assert!(!list.unregister(&a));
        let names: Vec<_> = list.list().iter().map(|n| n.0).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
