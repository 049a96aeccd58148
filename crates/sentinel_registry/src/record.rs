//! # Player Records
//!
//! One [`EntityRecord`] per known player. The record itself is shared
//! through `Arc` and never replaced; every mutable field sits behind its own
//! lock or atomic so background readers never contend with the whole record.
//!
//! ```text
//! EntityRecord
//! ├── identity       id (fixed), name, session, context
//! ├── timestamps     last active / join / leave
//! ├── sub-records    one value per subsystem type
//! ├── debug flags    per check subtree
//! ├── exemptions     per check subtree
//! ├── permissions    cached answers + queued refreshes
//! └── tick tasks     per-tick callbacks
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::check_type::CheckType;
use crate::identity::{EntityId, SessionToken};
use crate::permissions::{FetchPolicy, PermissionSource};

/// Outcome of one run of a [`TickTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Run again next tick.
    Continue,
    /// Drop the task.
    Done,
}

/// Callback run once per tick on the primary thread.
pub type TickTask = Box<dyn FnMut(&EntityRecord, u64) -> TaskStatus + Send>;

/// A cached permission answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CachedPermission {
    value: bool,
    fetched_ms: u64,
}

/// Per-player state shared by every check.
pub struct EntityRecord {
    id: EntityId,
    name: RwLock<String>,
    session: Mutex<Option<SessionToken>>,
    context: RwLock<Option<String>>,
    online: AtomicBool,

    last_active_ms: AtomicU64,
    last_join_ms: AtomicU64,
    last_leave_ms: AtomicU64,

    sub_records: Mutex<FxHashMap<TypeId, Box<dyn Any + Send>>>,
    debug: RwLock<FxHashSet<CheckType>>,
    exemptions: RwLock<FxHashSet<CheckType>>,

    permissions: Mutex<FxHashMap<CheckType, CachedPermission>>,
    permission_requests: Mutex<FxHashSet<CheckType>>,
    tick_tasks: Mutex<Vec<TickTask>>,
}

impl EntityRecord {
    /// Creates an offline record last seen at `now_ms`.
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id,
            name: RwLock::new(name.into()),
            session: Mutex::new(None),
            context: RwLock::new(None),
            online: AtomicBool::new(false),
            last_active_ms: AtomicU64::new(now_ms),
            last_join_ms: AtomicU64::new(0),
            last_leave_ms: AtomicU64::new(0),
            sub_records: Mutex::new(FxHashMap::default()),
            debug: RwLock::new(FxHashSet::default()),
            exemptions: RwLock::new(FxHashSet::default()),
            permissions: Mutex::new(FxHashMap::default()),
            permission_requests: Mutex::new(FxHashSet::default()),
            tick_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Stable identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Last known display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Whether the player is currently connected.
    #[inline]
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Session of the current (or last) connection.
    #[must_use]
    pub fn session(&self) -> Option<SessionToken> {
        *self.session.lock()
    }

    /// Name of the world (or other context) the player is in.
    #[must_use]
    pub fn context_name(&self) -> Option<String> {
        self.context.read().clone()
    }

    /// Wall-clock time of the last join, leave or lookup-creation.
    #[must_use]
    pub fn last_active_ms(&self) -> u64 {
        self.last_active_ms.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last join, zero if never.
    #[must_use]
    pub fn last_join_ms(&self) -> u64 {
        self.last_join_ms.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last leave, zero if never.
    #[must_use]
    pub fn last_leave_ms(&self) -> u64 {
        self.last_leave_ms.load(Ordering::Relaxed)
    }

    /// Runs `f` on this record's sub-record of type `T`, creating it with
    /// `T::default()` on first use.
    ///
    /// `f` runs with the sub-record bag locked; do not touch other
    /// sub-records of the same player from inside it.
    pub fn with_sub_record<T, R, F>(&self, f: F) -> R
    where
        T: Any + Send + Default,
        F: FnOnce(&mut T) -> R,
    {
        let mut bag = self.sub_records.lock();
        let slot = bag
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()));
        match slot.downcast_mut::<T>() {
            Some(value) => f(value),
            None => {
                // Keyed by TypeId, so the downcast cannot fail; rebuild anyway.
                let mut fresh = T::default();
                let result = f(&mut fresh);
                *slot = Box::new(fresh);
                result
            }
        }
    }

    /// Whether a sub-record of type `T` exists.
    #[must_use]
    pub fn has_sub_record<T: Any + Send>(&self) -> bool {
        self.sub_records.lock().contains_key(&TypeId::of::<T>())
    }

    /// Drops the sub-record of type `T`.
    pub fn remove_sub_record<T: Any + Send>(&self) -> bool {
        self.sub_records.lock().remove(&TypeId::of::<T>()).is_some()
    }

    /// Turns debug output for `check` on or off.
    pub fn set_debug(&self, check: CheckType, enabled: bool) {
        let mut debug = self.debug.write();
        if enabled {
            debug.insert(check);
        } else {
            debug.remove(&check);
        }
    }

    /// Whether debug output is on for `check` or any of its ancestors.
    #[must_use]
    pub fn is_debug(&self, check: CheckType) -> bool {
        let debug = self.debug.read();
        !debug.is_empty() && check.self_and_ancestors().any(|node| debug.contains(&node))
    }

    /// Exempts the player from `check` and everything below it.
    pub fn exempt(&self, check: CheckType) -> bool {
        self.exemptions.write().insert(check)
    }

    /// Lifts an exemption added with [`exempt`](Self::exempt).
    pub fn unexempt(&self, check: CheckType) -> bool {
        self.exemptions.write().remove(&check)
    }

    /// Whether `check` or any ancestor is exempted.
    #[must_use]
    pub fn is_exempt(&self, check: CheckType) -> bool {
        let exemptions = self.exemptions.read();
        !exemptions.is_empty() && check.self_and_ancestors().any(|node| exemptions.contains(&node))
    }

    /// Lifts every exemption.
    pub fn clear_exemptions(&self) {
        self.exemptions.write().clear();
    }

    /// Cached answer for `check`, if still valid under `policy`.
    #[must_use]
    pub fn cached_permission(&self, check: CheckType, policy: FetchPolicy, now_ms: u64) -> Option<bool> {
        self.permissions
            .lock()
            .get(&check)
            .filter(|cached| policy.is_fresh(cached.fetched_ms, now_ms))
            .map(|cached| cached.value)
    }

    /// Number of cached permission answers.
    #[must_use]
    pub fn cached_permission_count(&self) -> usize {
        self.permissions.lock().len()
    }

    /// Number of tick tasks waiting to run.
    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.tick_tasks.lock().len()
    }

    /// Number of permission refreshes waiting for the primary thread.
    #[must_use]
    pub fn pending_permission_requests(&self) -> usize {
        self.permission_requests.lock().len()
    }

    pub(crate) fn store_permission(&self, check: CheckType, value: bool, now_ms: u64) {
        self.permissions.lock().insert(
            check,
            CachedPermission {
                value,
                fetched_ms: now_ms,
            },
        );
    }

    /// Last fetched answer for `check`, however old.
    pub(crate) fn last_permission(&self, check: CheckType) -> Option<bool> {
        self.permissions.lock().get(&check).map(|cached| cached.value)
    }

    pub(crate) fn request_permission(&self, check: CheckType) -> bool {
        self.permission_requests.lock().insert(check)
    }

    pub(crate) fn add_tick_task(&self, task: TickTask) {
        self.tick_tasks.lock().push(task);
    }

    /// Drops cached permissions for `check` and its subtree.
    pub(crate) fn invalidate_permissions(&self, check: CheckType) {
        if check == CheckType::All {
            self.permissions.lock().clear();
        } else {
            self.permissions
                .lock()
                .retain(|cached, _| !check.is_ancestor_or_self(*cached));
        }
    }

    /// Drops state that is cheap to rebuild. Used when a removal is skipped
    /// because the player came back.
    pub(crate) fn degrade(&self) {
        self.invalidate_permissions(CheckType::All);
    }

    pub(crate) fn on_activate(&self, name: &str, session: SessionToken, now_ms: u64) {
        self.set_name(name);
        *self.session.lock() = Some(session);
        self.last_join_ms.store(now_ms, Ordering::Relaxed);
        self.last_active_ms.store(now_ms, Ordering::Relaxed);
        self.online.store(true, Ordering::Release);
    }

    pub(crate) fn on_deactivate(&self, now_ms: u64) {
        self.online.store(false, Ordering::Release);
        self.last_leave_ms.store(now_ms, Ordering::Relaxed);
        self.last_active_ms.store(now_ms, Ordering::Relaxed);
    }

    pub(crate) fn set_name(&self, name: &str) {
        let mut current = self.name.write();
        if *current != name {
            *current = name.to_string();
        }
    }

    pub(crate) fn set_session(&self, session: SessionToken) {
        *self.session.lock() = Some(session);
    }

    pub(crate) fn set_context(&self, context: Option<String>) {
        *self.context.write() = context;
    }

    /// Clock jumped backwards: pull every timestamp back to `now_ms`.
    pub(crate) fn reset_timestamps(&self, now_ms: u64) {
        for stamp in [&self.last_active_ms, &self.last_join_ms, &self.last_leave_ms] {
            if stamp.load(Ordering::Relaxed) > now_ms {
                stamp.store(now_ms, Ordering::Relaxed);
            }
        }
        self.invalidate_permissions(CheckType::All);
    }

    /// Runs queued permission refreshes and tick tasks.
    ///
    /// Returns true while there is still work left for later ticks.
    pub(crate) fn process_tick(&self, tick: u64, now_ms: u64, source: &dyn PermissionSource) -> bool {
        let requests: Vec<CheckType> = self.permission_requests.lock().drain().collect();
        for check in requests {
            let value = source.has_permission(self.id, check.permission_node());
            self.store_permission(check, value, now_ms);
        }

        let mut tasks = std::mem::take(&mut *self.tick_tasks.lock());
        if !tasks.is_empty() {
            tasks.retain_mut(|task| task(self, tick) == TaskStatus::Continue);
            // Tasks scheduled while these ran were pushed to the emptied list.
            let mut slot = self.tick_tasks.lock();
            let added = std::mem::take(&mut *slot);
            tasks.extend(added);
            *slot = tasks;
        }

        self.has_pending_work()
    }

    /// Whether tick tasks or permission refreshes are queued.
    pub(crate) fn has_pending_work(&self) -> bool {
        !self.tick_tasks.lock().is_empty() || !self.permission_requests.lock().is_empty()
    }
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .field("online", &self.is_online())
            .field("session", &self.session())
            .field("last_active_ms", &self.last_active_ms())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl PermissionSource for CountingSource {
        fn has_permission(&self, _id: EntityId, node: &str) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            node.starts_with("sentinel.checks.combat")
        }
    }

    #[derive(Default)]
    struct ReachState {
        hits: u32,
    }

    fn record() -> EntityRecord {
        EntityRecord::new(EntityId::from_u128(1), "Steve", 100)
    }

    #[test]
    fn test_sub_record_created_once() {
        let record = record();
        assert!(!record.has_sub_record::<ReachState>());
        record.with_sub_record(|s: &mut ReachState| s.hits += 1);
        let hits = record.with_sub_record(|s: &mut ReachState| {
            s.hits += 1;
            s.hits
        });
        assert_eq!(hits, 2);
        assert!(record.remove_sub_record::<ReachState>());
        assert_eq!(record.with_sub_record(|s: &mut ReachState| s.hits), 0);
    }

    #[test]
    fn test_exemption_covers_subtree() {
        let record = record();
        record.exempt(CheckType::Combat);
        assert!(record.is_exempt(CheckType::CombatReach));
        assert!(!record.is_exempt(CheckType::MovementSpeed));
        assert!(!record.is_exempt(CheckType::All));
        record.clear_exemptions();
        assert!(!record.is_exempt(CheckType::CombatReach));
    }

    #[test]
    fn test_debug_covers_subtree() {
        let record = record();
        record.set_debug(CheckType::BlockInteract, true);
        assert!(record.is_debug(CheckType::BlockInteractReach));
        record.set_debug(CheckType::BlockInteract, false);
        assert!(!record.is_debug(CheckType::BlockInteractReach));
    }

    #[test]
    fn test_activate_deactivate() {
        let record = record();
        record.on_activate("Steve2", SessionToken(9), 500);
        assert!(record.is_online());
        assert_eq!(record.name(), "Steve2");
        assert_eq!(record.session(), Some(SessionToken(9)));
        record.on_deactivate(800);
        assert!(!record.is_online());
        assert_eq!(record.last_leave_ms(), 800);
        assert_eq!(record.last_active_ms(), 800);
    }

    #[test]
    fn test_permission_requests_processed_on_tick() {
        let record = record();
        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        assert!(record.request_permission(CheckType::CombatReach));
        assert!(!record.request_permission(CheckType::CombatReach));

        assert!(!record.process_tick(1, 1000, &source));
        assert_eq!(source.calls.load(Ordering::Relaxed), 1);
        assert_eq!(
            record.cached_permission(CheckType::CombatReach, FetchPolicy::Once, 2000),
            Some(true)
        );
        record.degrade();
        assert_eq!(record.cached_permission_count(), 0);
    }

    #[test]
    fn test_tick_tasks_run_until_done() {
        let record = record();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        record.add_tick_task(Box::new(move |_, tick| {
            counter.fetch_add(1, Ordering::Relaxed);
            if tick >= 3 {
                TaskStatus::Done
            } else {
                TaskStatus::Continue
            }
        }));

        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        assert!(record.process_tick(1, 0, &source));
        assert!(record.process_tick(2, 0, &source));
        assert!(!record.process_tick(3, 0, &source));
        assert_eq!(runs.load(Ordering::Relaxed), 3);
        assert_eq!(record.pending_task_count(), 0);
    }

    #[test]
    fn test_task_can_schedule_follow_up() {
        let record = record();
        record.add_tick_task(Box::new(|rec, _| {
            rec.add_tick_task(Box::new(|_, _| TaskStatus::Done));
            TaskStatus::Done
        }));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        assert!(record.process_tick(1, 0, &source));
        assert_eq!(record.pending_task_count(), 1);
        assert!(!record.process_tick(2, 0, &source));
    }

    #[test]
    fn test_reset_timestamps() {
        let record = record();
        record.on_activate("Steve", SessionToken(1), 10_000);
        record.store_permission(CheckType::Combat, true, 10_000);
        record.reset_timestamps(5_000);
        assert_eq!(record.last_join_ms(), 5_000);
        assert_eq!(record.last_active_ms(), 5_000);
        assert_eq!(record.cached_permission_count(), 0);
    }
}
