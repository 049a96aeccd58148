//! # Entity Registry
//!
//! The shared home of every player's anti-cheat state.
//!
//! ```text
//!   BACKGROUND WORKERS                      PRIMARY THREAD
//!        │                                       │
//!        │ get / get_or_create ──► LowLockMap ◄──┤ notify_activated / deactivated
//!        │ has_bypass (read-only)     ▲          │
//!        │                            │          │ on_tick
//!        │ schedule_tick_task ──► DualSet ──────►│  ├─ frequent: merge + per-record tasks
//!        │                                       │  └─ rare:     expire ► stage ► apply
//!        │                                       │
//!        │                                       │ check_consistency
//! ```
//!
//! The primary thread is the one that constructed the registry (or called
//! [`EntityRegistry::bind_primary_thread`]). Primary-only operations called
//! elsewhere still run, but each call site is reported once.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use sentinel_core::{Clock, DualSet, LowLockMap, PrimaryContext, SystemClock};

use crate::check_type::CheckType;
use crate::collaborators::{CheckDataFactory, Collaborators, RemovalListener};
use crate::config::{ExpirationConfig, RegistryConfig};
use crate::consistency::{self, ActiveEntity, ConsistencyReport};
use crate::error::{RegistryError, RegistryResult};
use crate::expiration::{ExpirationLog, RemovalBatch};
use crate::history::HistoryLedger;
use crate::identity::{EntityId, SessionToken};
use crate::maintenance::RareTaskSchedule;
use crate::permissions::{
    FetchPolicy, NoPermissions, PermissionRegistry, PermissionSettings, PermissionSource,
};
use crate::record::{EntityRecord, TickTask};

/// Which records [`EntityRegistry::remove_all`] drops.
pub enum RemovalScope<'a> {
    /// Every record and every collaborator's data.
    All,
    /// Records the predicate accepts. Online players are kept.
    Matching(&'a dyn Fn(&EntityRecord) -> bool),
}

/// Point-in-time counters for monitoring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Records in the map.
    pub records: usize,
    /// Records of connected players.
    pub online: usize,
    /// Identities with per-tick work, primary buffer.
    pub pending_primary: usize,
    /// Identities with per-tick work, waiting to be merged.
    pub pending_background: usize,
    /// Logged-out players waiting to expire.
    pub expiration_log: usize,
    /// Identities staged for removal.
    pub staged: usize,
    /// Audits that found drift.
    pub inconsistencies: u64,
    /// Primary-only calls made off the primary thread.
    pub improper_access: u64,
    /// Number of the last tick processed.
    pub last_tick: u64,
    /// Length of the last tick in milliseconds.
    pub last_delta_ms: u64,
}

/// State only the primary thread works on.
struct PrimaryState {
    log: ExpirationLog,
    batch: RemovalBatch,
    schedule: RareTaskSchedule,
    inconsistencies: u64,
    last_tick: u64,
    last_delta_ms: u64,
}

/// Registry of per-player anti-cheat state.
pub struct EntityRegistry {
    records: LowLockMap<EntityId, EntityRecord>,
    pending: DualSet<EntityId>,
    primary: Mutex<PrimaryState>,
    config: RwLock<RegistryConfig>,
    factories: Collaborators<dyn CheckDataFactory>,
    listeners: Collaborators<dyn RemovalListener>,
    permissions: PermissionRegistry,
    permission_source: Arc<dyn PermissionSource>,
    history: HistoryLedger,
    clock: Arc<dyn Clock>,
    context: PrimaryContext,
}

impl EntityRegistry {
    /// Creates a registry bound to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PermissionSettings`] if the `[permissions]`
    /// section is invalid.
    pub fn new(
        config: RegistryConfig,
        permission_source: Arc<dyn PermissionSource>,
        clock: Arc<dyn Clock>,
    ) -> RegistryResult<Self> {
        let settings = PermissionSettings::from_config(&config.permissions)?;
        Ok(Self::build(config, settings, permission_source, clock))
    }

    /// Registry with default settings, the system clock and no permissions.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::build(
            RegistryConfig::default(),
            PermissionSettings::default(),
            Arc::new(NoPermissions),
            Arc::new(SystemClock),
        )
    }

    fn build(
        config: RegistryConfig,
        settings: PermissionSettings,
        permission_source: Arc<dyn PermissionSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.clamped();
        Self {
            records: LowLockMap::new(),
            pending: DualSet::new(),
            primary: Mutex::new(PrimaryState {
                log: ExpirationLog::new(),
                batch: RemovalBatch::new(),
                schedule: RareTaskSchedule::new(config.maintenance.rare_delay_ticks),
                inconsistencies: 0,
                last_tick: 0,
                last_delta_ms: 0,
            }),
            config: RwLock::new(config),
            factories: Collaborators::new(),
            listeners: Collaborators::new(),
            permissions: PermissionRegistry::new(settings),
            permission_source,
            history: HistoryLedger::new(),
            clock,
            context: PrimaryContext::current_thread(),
        }
    }

    /// Makes the calling thread the primary thread.
    pub fn bind_primary_thread(&self) {
        self.context.rebind_to_current();
    }

    /// The primary thread guard, for its violation counters.
    #[must_use]
    pub fn primary_context(&self) -> &PrimaryContext {
        &self.context
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Record for `id`, if one exists. Never blocks.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<EntityRecord>> {
        self.records.get(&id)
    }

    /// Record for `id`, creating an offline one named `name` if `create` is set.
    ///
    /// Safe from any thread. Racing creators all get the same record.
    pub fn get_or_create(&self, id: EntityId, name: &str, create: bool) -> Option<Arc<EntityRecord>> {
        if let Some(record) = self.records.get(&id) {
            return Some(record);
        }
        if !create {
            return None;
        }
        let now = self.clock.now_millis();
        Some(
            self.records
                .get_or_insert_with(id, || EntityRecord::new(id, name, now)),
        )
    }

    /// Record for `id`, creating it with `factory` if absent.
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or [`RegistryError::RecordCreation`] if
    /// the factory built a record for another identity. Nothing is inserted
    /// in either case.
    pub fn try_get_or_create_with<F>(&self, id: EntityId, factory: F) -> RegistryResult<Arc<EntityRecord>>
    where
        F: FnOnce() -> RegistryResult<EntityRecord>,
    {
        self.records.try_get_or_insert_with(id, || {
            let record = factory()?;
            if record.id() != id {
                return Err(RegistryError::RecordCreation {
                    id,
                    reason: format!("factory built a record for {}", record.id()),
                });
            }
            Ok(record)
        })
    }

    /// Whether a record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last known name of `id`.
    #[must_use]
    pub fn entity_name(&self, id: EntityId) -> Option<String> {
        self.records.get(&id).map(|record| record.name())
    }

    /// Record by name: exact match first, then ignoring ASCII case.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<EntityRecord>> {
        let snapshot = self.records.snapshot();
        snapshot
            .values()
            .find(|record| record.name() == name)
            .or_else(|| {
                snapshot
                    .values()
                    .find(|record| record.name().eq_ignore_ascii_case(name))
            })
            .cloned()
    }

    /// Violation history of every player.
    #[must_use]
    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    /// A copy of the active configuration.
    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.config.read().clone()
    }

    // =========================================================================
    // LIFECYCLE EVENTS (primary thread)
    // =========================================================================

    /// A player connected.
    ///
    /// Creates the record if needed, marks it online and takes the player
    /// out of the expiration log and any pending removal.
    #[track_caller]
    pub fn notify_activated(&self, id: EntityId, name: &str, session: SessionToken, at_ms: u64) {
        self.context.check("notify_activated");
        let record = self
            .records
            .get_or_insert_with(id, || EntityRecord::new(id, name, at_ms));
        record.on_activate(name, session, at_ms);

        let mut state = self.primary.lock();
        state.log.remove(&id);
        state.batch.mark_reactivated(id);
    }

    /// A player disconnected. Starts the expiration countdown.
    #[track_caller]
    pub fn notify_deactivated(&self, id: EntityId, at_ms: u64) {
        self.context.check("notify_deactivated");
        let Some(record) = self.records.get(&id) else {
            tracing::debug!(%id, "deactivation of unknown player ignored");
            return;
        };
        record.on_deactivate(at_ms);
        self.primary.lock().log.record_deactivation(id, at_ms);
    }

    /// A player moved between worlds (or other host contexts).
    ///
    /// Cached permissions are dropped since hosts may scope them per world.
    #[track_caller]
    pub fn notify_context_changed(&self, id: EntityId, name: &str, from: Option<&str>, to: &str) {
        self.context.check("notify_context_changed");
        let now = self.clock.now_millis();
        let record = self
            .records
            .get_or_insert_with(id, || EntityRecord::new(id, name, now));
        record.set_name(name);
        record.set_context(Some(to.to_string()));
        record.degrade();
        tracing::debug!(%id, from = from.unwrap_or("-"), to, "player changed context");
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Runs maintenance for one tick. Call once per tick from the primary thread.
    #[track_caller]
    pub fn on_tick(&self, tick: u64, delta_ms: u64) {
        self.context.check("on_tick");
        let now = self.clock.now_millis();
        self.run_frequent(tick, now);
        self.run_rare(now);

        let mut state = self.primary.lock();
        state.last_tick = tick;
        state.last_delta_ms = delta_ms;
    }

    fn run_frequent(&self, tick: u64, now: u64) {
        self.pending.merge_into_primary();
        let entries = self.pending.primary_entries();
        if entries.is_empty() {
            return;
        }

        let source = &*self.permission_source;
        let done: FxHashSet<EntityId> = entries
            .into_iter()
            .filter(|id| {
                !self
                    .records
                    .get(id)
                    .is_some_and(|record| record.process_tick(tick, now, source))
            })
            .collect();

        // Work scheduled for a finished record later in the pass keeps it.
        self.pending.retain_primary(|id| {
            !done.contains(id) || self.records.get(id).is_some_and(|record| record.has_pending_work())
        });
    }

    fn run_rare(&self, now: u64) {
        let expiration = self.config.read().expiration.clone();
        let (staged, reactivated) = {
            let mut state = self.primary.lock();
            let batch_pending = !state.batch.is_empty();
            if !state.schedule.should_run(batch_pending) {
                state.schedule.finish(false);
                return;
            }
            if expiration.active {
                for id in state.log.drain_expired(now, expiration.ttl_millis()) {
                    state.batch.stage(id);
                }
            }
            state.batch.take()
        };

        let did_work = !staged.is_empty();
        if did_work {
            self.apply_removals(&staged, &reactivated, &expiration);
        }
        self.primary.lock().schedule.finish(did_work);
    }

    /// Removes staged records, skipping players who came back.
    ///
    /// Returns the identities actually removed.
    fn apply_removals(
        &self,
        staged: &[EntityId],
        reactivated: &FxHashSet<EntityId>,
        expiration: &ExpirationConfig,
    ) -> Vec<EntityId> {
        let mut eligible = Vec::with_capacity(staged.len());
        let mut kept = 0usize;
        for id in staged {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if reactivated.contains(id) || record.is_online() {
                record.degrade();
                kept += 1;
                continue;
            }
            eligible.push(record);
        }

        for record in &eligible {
            let name = record.name();
            if name.is_empty() {
                tracing::warn!(id = %record.id(), "expired player has no name, check data left in place");
                continue;
            }
            if expiration.delete_data {
                self.remove_collaborator_data(&name);
            }
            if expiration.delete_history {
                self.history.remove(&name, CheckType::All);
            }
        }

        let ids: Vec<EntityId> = eligible.iter().map(|record| record.id()).collect();
        let removed: Vec<EntityId> = self
            .records
            .remove_batch(&ids)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in &removed {
            self.pending.remove(id);
        }

        if !removed.is_empty() || kept > 0 {
            tracing::debug!(removed = removed.len(), kept, "bulk removal of player records");
        }
        removed
    }

    fn remove_collaborator_data(&self, name: &str) {
        for factory in self.factories.list() {
            if let Err(error) = factory.remove_data(name) {
                tracing::warn!(component = factory.name(), name, %error, "failed to remove check data");
            }
        }
        for listener in self.listeners.list() {
            if let Err(error) = listener.remove_data(name) {
                tracing::warn!(component = listener.name(), name, %error, "failed to remove player data");
            }
        }
    }

    /// Schedules `task` to run on the primary thread every tick until it
    /// reports [`TaskStatus::Done`](crate::record::TaskStatus::Done).
    ///
    /// Safe from any thread. Returns false if `id` has no record.
    pub fn schedule_tick_task(&self, id: EntityId, task: TickTask) -> bool {
        let Some(record) = self.records.get(&id) else {
            return false;
        };
        record.add_tick_task(task);
        if self.context.is_primary() {
            self.pending.add_primary(id);
        } else {
            self.pending.add_background(id);
        }
        true
    }

    // =========================================================================
    // REMOVAL (primary thread)
    // =========================================================================

    /// Removes records and their collaborator data.
    ///
    /// [`RemovalScope::All`] tells every data factory and removal listener to
    /// drop everything (once each) and forgets all records, history and
    /// pending work. [`RemovalScope::Matching`] removes matching offline
    /// players the way expiration does.
    ///
    /// Returns true if anything was removed.
    #[track_caller]
    pub fn remove_all(&self, scope: RemovalScope<'_>) -> bool {
        self.context.check("remove_all");
        match scope {
            RemovalScope::All => {
                for factory in self.factories.list() {
                    factory.remove_all_data();
                }
                for listener in self.listeners.list() {
                    listener.remove_all_data();
                }
                self.history.clear(CheckType::All);

                let had_log = {
                    let mut state = self.primary.lock();
                    let had_log = !state.log.is_empty();
                    state.log.clear();
                    state.batch.clear();
                    had_log
                };
                self.pending.clear();
                let removed = self.records.clear();
                tracing::debug!(removed, "removed all player records");
                removed > 0 || had_log
            }
            RemovalScope::Matching(predicate) => {
                let snapshot = self.records.snapshot();
                let staged: Vec<EntityId> = snapshot
                    .values()
                    .filter(|record| predicate(record))
                    .map(|record| record.id())
                    .collect();
                if staged.is_empty() {
                    return false;
                }
                let expiration = self.config.read().expiration.clone();
                let removed = self.apply_removals(&staged, &FxHashSet::default(), &expiration);
                let mut state = self.primary.lock();
                for id in &removed {
                    state.log.remove(id);
                }
                !removed.is_empty()
            }
        }
    }

    /// Removes one player's data for `check` and its subtree.
    ///
    /// Data objects that can drop just the sub-check's part do so; others are
    /// removed whole. For [`CheckType::All`] the record itself is staged for
    /// the next bulk removal. Returns true if anything was removed or staged.
    #[track_caller]
    pub fn remove_data(&self, name: &str, check: CheckType) -> bool {
        self.context.check("remove_data");
        let record = self.find_by_name(name);
        let mut removed = false;

        for factory in self.factories.list() {
            let served = factory.check_type();
            if !check.is_ancestor_or_self(served) && !served.is_ancestor_or_self(check) {
                continue;
            }
            removed |= match &record {
                Some(record) => self.remove_data_precisely(record, name, check, factory.as_ref()),
                None => Self::remove_factory_data(factory.as_ref(), name),
            };
        }

        for listener in self.listeners.list() {
            if !Self::listener_covers(listener.as_ref(), check) {
                continue;
            }
            match listener.remove_data(name) {
                Ok(had) => removed |= had,
                Err(error) => {
                    tracing::warn!(component = listener.name(), name, %error, "failed to remove player data");
                }
            }
        }

        removed |= self.history.remove(name, check);

        if check == CheckType::All {
            if let Some(record) = record {
                self.primary.lock().batch.stage(record.id());
                removed = true;
            }
        }
        removed
    }

    fn remove_data_precisely(
        &self,
        record: &EntityRecord,
        name: &str,
        check: CheckType,
        factory: &dyn CheckDataFactory,
    ) -> bool {
        let Some(data) = factory.data_if_present(record.id(), name) else {
            return false;
        };
        if data.remove_sub_check_data(check) {
            if data.debug() || record.is_debug(check) {
                tracing::debug!(%check, name, "removed sub-check data, keeping the data object");
            }
            return true;
        }
        Self::remove_factory_data(factory, name)
    }

    fn remove_factory_data(factory: &dyn CheckDataFactory, name: &str) -> bool {
        match factory.remove_data(name) {
            Ok(data) => data.is_some(),
            Err(error) => {
                tracing::warn!(component = factory.name(), name, %error, "failed to remove check data");
                false
            }
        }
    }

    fn listener_covers(listener: &dyn RemovalListener, check: CheckType) -> bool {
        check == CheckType::All
            || listener
                .check_type()
                .is_some_and(|own| check.is_ancestor_or_self(own))
    }

    /// Drops every player's data for `check` and its subtree.
    ///
    /// For [`CheckType::All`] every offline record is removed as well;
    /// online ones only lose their cached permissions.
    #[track_caller]
    pub fn clear_data(&self, check: CheckType) {
        self.context.check("clear_data");
        for factory in self.factories.list() {
            let served = factory.check_type();
            if check.is_ancestor_or_self(served) || served.is_ancestor_or_self(check) {
                factory.remove_all_data();
            }
        }
        for listener in self.listeners.list() {
            if Self::listener_covers(listener.as_ref(), check) {
                listener.remove_all_data();
            }
        }
        self.history.clear(check);

        let snapshot = self.records.snapshot();
        for record in snapshot.values() {
            record.invalidate_permissions(check);
        }

        if check == CheckType::All {
            let staged: Vec<EntityId> = snapshot.values().map(|record| record.id()).collect();
            let expiration = self.config.read().expiration.clone();
            let removed = self.apply_removals(&staged, &FxHashSet::default(), &expiration);
            let mut state = self.primary.lock();
            for id in &removed {
                state.log.remove(id);
            }
        }
    }

    /// The wall clock jumped backwards.
    ///
    /// Collaborators reset their time-based state, history is cleared and
    /// every timestamp in the future is pulled back to now.
    #[track_caller]
    pub fn handle_time_ran_backwards(&self) {
        self.context.check("handle_time_ran_backwards");
        for factory in self.factories.list() {
            factory.handle_time_ran_backwards();
        }
        for listener in self.listeners.list() {
            listener.handle_time_ran_backwards();
        }
        self.history.clear(CheckType::All);

        let now = self.clock.now_millis();
        for record in self.records.snapshot().values() {
            record.reset_timestamps(now);
        }
        self.primary.lock().log.clamp_to(now);
        tracing::warn!(now, "system time ran backwards, time-based state reset");
    }

    // =========================================================================
    // EXEMPTIONS & PERMISSIONS
    // =========================================================================

    /// Exempts `id` from `check` and its subtree. False if there is no record.
    pub fn exempt(&self, id: EntityId, check: CheckType) -> bool {
        self.records.get(&id).is_some_and(|record| record.exempt(check))
    }

    /// Lifts an exemption.
    pub fn unexempt(&self, id: EntityId, check: CheckType) -> bool {
        self.records.get(&id).is_some_and(|record| record.unexempt(check))
    }

    /// Whether `id` is exempted from `check`.
    #[must_use]
    pub fn is_exempt(&self, id: EntityId, check: CheckType) -> bool {
        self.records.get(&id).is_some_and(|record| record.is_exempt(check))
    }

    /// Lifts every exemption of every player.
    pub fn clear_all_exemptions(&self) {
        for record in self.records.snapshot().values() {
            record.clear_exemptions();
        }
    }

    /// Turns debug output for `check` on or off for `id`.
    pub fn set_debug(&self, id: EntityId, check: CheckType, enabled: bool) -> bool {
        match self.records.get(&id) {
            Some(record) => {
                record.set_debug(check, enabled);
                true
            }
            None => false,
        }
    }

    /// Whether `id` may skip `check`.
    ///
    /// True for exempted players and for holders of the check's bypass
    /// permission. Safe from any thread: off the primary thread a permission
    /// that is not cached yet is queued for the next tick and reported as
    /// not held until then. Under [`FetchPolicy::Always`]
    /// an off-thread caller gets the last fetched answer while a refresh is
    /// queued.
    #[must_use]
    pub fn has_bypass(&self, id: EntityId, check: CheckType) -> bool {
        let Some(record) = self.records.get(&id) else {
            return false;
        };
        if record.is_exempt(check) {
            return true;
        }

        let node = check.permission_node();
        let policy = self.permissions.policy_for(node);
        if let Some(answer) = policy.fixed_answer() {
            return answer;
        }
        let now = self.clock.now_millis();
        if let Some(answer) = record.cached_permission(check, policy, now) {
            return answer;
        }

        if self.context.is_primary() {
            let answer = self.permission_source.has_permission(id, node);
            record.store_permission(check, answer, now);
            answer
        } else {
            if record.request_permission(check) {
                self.pending.add_background(id);
            }
            if policy == FetchPolicy::Always {
                record.last_permission(check).unwrap_or(false)
            } else {
                false
            }
        }
    }

    /// Active permission settings.
    #[must_use]
    pub fn permission_settings(&self) -> Arc<PermissionSettings> {
        self.permissions.settings()
    }

    fn install_permissions(&self, settings: PermissionSettings) {
        let changed = self.permissions.update_settings(settings);
        for record in self.records.snapshot().values() {
            record.invalidate_permissions(CheckType::All);
        }
        tracing::debug!(changed, "permission settings applied");
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Applies new settings.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PermissionSettings`] if the `[permissions]`
    /// section is invalid. Every other setting is applied regardless, and
    /// permissions fall back to denying every bypass.
    pub fn apply_config(&self, config: RegistryConfig) -> RegistryResult<()> {
        let config = config.clamped();
        let permissions = PermissionSettings::from_config(&config.permissions);
        self.primary
            .lock()
            .schedule
            .set_delay(config.maintenance.rare_delay_ticks);
        *self.config.write() = config;

        match permissions {
            Ok(settings) => {
                self.install_permissions(settings);
                Ok(())
            }
            Err(error) => Err(self.fall_back_to_deny(error)),
        }
    }

    /// Reloads settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the parse error. Permissions then deny every bypass and all
    /// other settings keep their previous values.
    pub fn reload_from_str(&self, content: &str) -> RegistryResult<()> {
        match RegistryConfig::from_toml_str(content) {
            Ok(config) => self.apply_config(config),
            Err(error) => Err(self.fall_back_to_deny(error)),
        }
    }

    /// Reloads settings from a TOML file. See [`reload_from_str`](Self::reload_from_str).
    ///
    /// # Errors
    ///
    /// Returns the read or parse error.
    pub fn reload_from_file(&self, path: &Path) -> RegistryResult<()> {
        match RegistryConfig::from_file(path) {
            Ok(config) => self.apply_config(config),
            Err(error) => Err(self.fall_back_to_deny(error)),
        }
    }

    fn fall_back_to_deny(&self, error: RegistryError) -> RegistryError {
        tracing::error!(%error, "failed to read the permission setup, denying every bypass");
        self.install_permissions(PermissionSettings::deny_all());
        error
    }

    // =========================================================================
    // CONSISTENCY
    // =========================================================================

    /// Audits the registry against the host's list of connected players.
    ///
    /// Stale sessions are fixed; nothing else is. Drift bumps a counter and
    /// logs one warning unless warnings are suppressed.
    #[track_caller]
    pub fn check_consistency(&self, active: &[ActiveEntity]) -> ConsistencyReport {
        self.context.check("check_consistency");
        let report = consistency::audit(&self.records, active);
        if report.is_consistent() {
            return report;
        }

        let total = {
            let mut state = self.primary.lock();
            state.inconsistencies += 1;
            state.inconsistencies
        };
        if !self.config.read().consistency.suppress_warnings {
            tracing::warn!(
                missing = report.missing,
                extra = report.extra,
                stale = report.stale,
                tracked = report.tracked,
                online = report.authoritative,
                total,
                "player registry out of sync with the online list"
            );
        }
        report
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Whether `id` is waiting to expire.
    #[must_use]
    pub fn is_expiring(&self, id: EntityId) -> bool {
        self.primary.lock().log.contains(&id)
    }

    /// Whether `id` is staged for the next bulk removal.
    #[must_use]
    pub fn is_staged(&self, id: EntityId) -> bool {
        self.primary.lock().batch.contains(&id)
    }

    /// Whether `id` has per-tick work queued.
    #[must_use]
    pub fn has_pending_work(&self, id: EntityId) -> bool {
        if self.context.is_primary() {
            self.pending.contains_primary(&id)
        } else {
            self.pending.contains_background(&id)
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let snapshot = self.records.snapshot();
        let online = snapshot.values().filter(|record| record.is_online()).count();
        let state = self.primary.lock();
        RegistryStats {
            records: snapshot.len(),
            online,
            pending_primary: self.pending.primary_len(),
            pending_background: self.pending.background_len(),
            expiration_log: state.log.len(),
            staged: state.batch.len(),
            inconsistencies: state.inconsistencies,
            improper_access: self.context.violations(),
            last_tick: state.last_tick,
            last_delta_ms: state.last_delta_ms,
        }
    }

    // =========================================================================
    // COLLABORATORS
    // =========================================================================

    /// Registers a data factory. False if this instance is already registered.
    pub fn register_data_factory(&self, factory: Arc<dyn CheckDataFactory>) -> bool {
        self.factories.register(factory)
    }

    /// Unregisters a data factory.
    pub fn unregister_data_factory(&self, factory: &Arc<dyn CheckDataFactory>) -> bool {
        self.factories.unregister(factory)
    }

    /// Registers a removal listener. False if this instance is already registered.
    pub fn register_removal_listener(&self, listener: Arc<dyn RemovalListener>) -> bool {
        self.listeners.register(listener)
    }

    /// Unregisters a removal listener.
    pub fn unregister_removal_listener(&self, listener: &Arc<dyn RemovalListener>) -> bool {
        self.listeners.unregister(listener)
    }

    /// Number of registered data factories and removal listeners.
    #[must_use]
    pub fn collaborator_count(&self) -> (usize, usize) {
        (self.factories.len(), self.listeners.len())
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Drops everything and reports how many audits found drift.
    #[track_caller]
    pub fn shutdown(&self) -> u64 {
        self.context.check("shutdown");
        self.remove_all(RemovalScope::All);
        let total = self.primary.lock().inconsistencies;
        if total > 0 {
            tracing::info!(total, "consistency audits found problems during this run");
        }
        total
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("records", &self.records.len())
            .field("factories", &self.factories.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
