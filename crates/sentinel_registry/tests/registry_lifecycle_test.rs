//! # Registry Lifecycle Verification
//!
//! Join, leave, expiry, bulk removal and audits, driven through the public
//! API with a manual clock.
//!
//! Run with: cargo test -p sentinel_registry --test registry_lifecycle_test

use parking_lot::Mutex;
use sentinel_core::{Clock, ManualClock};
use sentinel_registry::{
    ActiveEntity, CheckData, CheckDataFactory, CheckType, EntityId, EntityRegistry, NoPermissions,
    RegistryConfig, RegistryError, RegistryResult, RemovalListener, RemovalScope, SessionToken,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const TTL_ONE_MINUTE: &str = "[expiration]\nduration_minutes = 1\ndelete_history = true";

// =============================================================================
// Collaborator doubles
// =============================================================================

#[derive(Default)]
struct ReachData {
    reach_cleared: AtomicBool,
}

impl CheckData for ReachData {
    fn remove_sub_check_data(&self, check: CheckType) -> bool {
        if check == CheckType::CombatReach {
            self.reach_cleared.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

/// Data factory that remembers every call.
#[derive(Default)]
struct RecordingFactory {
    data: Mutex<HashMap<String, Arc<ReachData>>>,
    removed: Mutex<Vec<String>>,
    remove_all_calls: AtomicUsize,
    fail_for: Option<&'static str>,
}

impl RecordingFactory {
    fn failing_for(name: &'static str) -> Self {
        Self {
            fail_for: Some(name),
            ..Self::default()
        }
    }

    fn seed(&self, name: &str) -> Arc<ReachData> {
        let data = Arc::new(ReachData::default());
        self.data.lock().insert(name.to_string(), Arc::clone(&data));
        data
    }

    fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

impl CheckDataFactory for RecordingFactory {
    fn name(&self) -> &str {
        "combat"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Combat
    }

    fn data_if_present(&self, _id: EntityId, name: &str) -> Option<Arc<dyn CheckData>> {
        self.data
            .lock()
            .get(name)
            .map(|data| Arc::clone(data) as Arc<dyn CheckData>)
    }

    fn remove_data(&self, name: &str) -> RegistryResult<Option<Arc<dyn CheckData>>> {
        self.removed.lock().push(name.to_string());
        if self.fail_for == Some(name) {
            return Err(RegistryError::DataRemoval {
                component: "combat".to_string(),
                name: name.to_string(),
                reason: "storage offline".to_string(),
            });
        }
        Ok(self
            .data
            .lock()
            .remove(name)
            .map(|data| data as Arc<dyn CheckData>))
    }

    fn remove_all_data(&self) {
        self.remove_all_calls.fetch_add(1, Ordering::Relaxed);
        self.data.lock().clear();
    }
}

#[derive(Default)]
struct CountingListener {
    check: Option<CheckType>,
    removed: Mutex<Vec<String>>,
    remove_all_calls: AtomicUsize,
}

impl RemovalListener for CountingListener {
    fn name(&self) -> &str {
        "counting"
    }

    fn check_type(&self) -> Option<CheckType> {
        self.check
    }

    fn remove_data(&self, name: &str) -> RegistryResult<bool> {
        self.removed.lock().push(name.to_string());
        Ok(true)
    }

    fn remove_all_data(&self) {
        self.remove_all_calls.fetch_add(1, Ordering::Relaxed);
    }
}

fn registry(config: &str) -> (Arc<ManualClock>, Arc<EntityRegistry>) {
    let clock = Arc::new(ManualClock::new(0));
    let registry = EntityRegistry::new(
        RegistryConfig::from_toml_str(config).unwrap(),
        Arc::new(NoPermissions),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .unwrap();
    (clock, Arc::new(registry))
}

fn id(n: u128) -> EntityId {
    EntityId::from_u128(n)
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn verify_racing_get_or_create_single_record() {
    let (_, registry) = registry("");
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.get_or_create(id(1), "Steve", true).unwrap()
            })
        })
        .collect();

    let records: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for record in &records {
        assert!(Arc::ptr_eq(record, &records[0]));
    }
    assert_eq!(registry.len(), 1);
    // Background lookups are not primary-only.
    assert_eq!(registry.primary_context().violations(), 0);
}

// =============================================================================
// Expiration
// =============================================================================

#[test]
fn verify_expiry_boundary() {
    let (clock, registry) = registry("[expiration]\nduration_minutes = 1");
    let factory = Arc::new(RecordingFactory::default());
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);

    registry.notify_activated(id(1), "A name", SessionToken(1), 0);
    registry.notify_deactivated(id(1), 0);

    clock.set(59_999);
    registry.on_tick(1, 50);
    assert!(registry.contains(id(1)));
    assert!(registry.is_expiring(id(1)));
    assert!(factory.removed().is_empty());

    clock.set(60_001);
    registry.on_tick(2, 50);
    assert!(!registry.contains(id(1)));
    assert!(!registry.is_expiring(id(1)));
    assert_eq!(factory.removed(), vec!["A name".to_string()]);
}

#[test]
fn verify_reactivation_keeps_record() {
    let (clock, registry) = registry(TTL_ONE_MINUTE);
    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    let before = registry.get(id(1)).unwrap();
    registry.notify_deactivated(id(1), 0);

    clock.set(30_000);
    registry.notify_activated(id(1), "Steve", SessionToken(2), 30_000);
    assert!(!registry.is_expiring(id(1)));

    clock.set(120_000);
    registry.on_tick(1, 50);
    let after = registry.get(id(1)).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(after.is_online());
}

#[test]
fn verify_same_tick_flapping() {
    let (clock, registry) = registry(TTL_ONE_MINUTE);
    let factory = Arc::new(RecordingFactory::default());
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);

    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    registry.notify_deactivated(id(1), 0);
    // Stage without applying: remove_data for All only stages the record.
    assert!(registry.remove_data("Steve", CheckType::All));
    assert!(registry.is_staged(id(1)));
    factory.removed.lock().clear();

    // Back and gone again before the batch is applied.
    clock.set(10_000);
    registry.notify_activated(id(1), "Steve", SessionToken(2), 10_000);
    registry.notify_deactivated(id(1), 10_000);

    registry.on_tick(1, 50);
    assert!(registry.contains(id(1)), "reactivated since staging, so kept");
    assert!(factory.removed().is_empty());
    assert!(registry.is_expiring(id(1)), "fresh logout is still tracked");

    // The second logout expires on its own schedule.
    clock.set(70_000);
    for tick in 2..=12 {
        registry.on_tick(tick, 50);
    }
    assert!(!registry.contains(id(1)));
    assert_eq!(factory.removed(), vec!["Steve".to_string()]);
}

#[test]
fn verify_removal_failure_does_not_stop_batch() {
    let (clock, registry) = registry(TTL_ONE_MINUTE);
    let factory = Arc::new(RecordingFactory::failing_for("Alex"));
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);
    let listener = Arc::new(CountingListener::default());
    registry.register_removal_listener(Arc::clone(&listener) as Arc<dyn RemovalListener>);

    for (n, name) in [(1, "Alex"), (2, "Steve")] {
        registry.notify_activated(id(n), name, SessionToken(1), 0);
        registry.notify_deactivated(id(n), 0);
    }
    registry.history().record_violation(CheckType::CombatReach, "Steve", 2.0, 0);

    clock.set(60_000);
    registry.on_tick(1, 50);
    assert!(registry.is_empty());
    assert_eq!(factory.removed(), vec!["Alex".to_string(), "Steve".to_string()]);
    assert_eq!(listener.removed.lock().len(), 2);
    assert!(registry.history().violations(CheckType::CombatReach, "Steve").is_none());
}

#[test]
fn verify_rare_pass_backoff() {
    let (clock, registry) = registry(TTL_ONE_MINUTE);
    for n in 1..=2 {
        registry.notify_activated(id(n), "p", SessionToken(1), 0);
    }
    registry.notify_deactivated(id(1), 0);
    registry.notify_deactivated(id(2), 5_000);

    clock.set(60_000);
    registry.on_tick(1, 50);
    assert!(!registry.contains(id(1)));

    // The pass did work, so the next ones wait out the delay.
    clock.set(65_000);
    for tick in 2..=11 {
        registry.on_tick(tick, 50);
        assert!(registry.contains(id(2)), "tick {tick} should be backing off");
    }
    registry.on_tick(12, 50);
    assert!(!registry.contains(id(2)));
}

#[test]
fn verify_expiration_inactive() {
    let (clock, registry) = registry("[expiration]\nactive = false\nduration_minutes = 1");
    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    registry.notify_deactivated(id(1), 0);
    clock.set(10_000_000);
    registry.on_tick(1, 50);
    assert!(registry.contains(id(1)));
}

// =============================================================================
// Bulk removal
// =============================================================================

#[test]
fn verify_remove_all_notifies_each_collaborator_once() {
    let (_, registry) = registry("");
    let factory = Arc::new(RecordingFactory::default());
    let first = Arc::new(CountingListener::default());
    let second = Arc::new(CountingListener {
        check: Some(CheckType::Movement),
        ..CountingListener::default()
    });
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);
    registry.register_removal_listener(Arc::clone(&first) as Arc<dyn RemovalListener>);
    registry.register_removal_listener(Arc::clone(&second) as Arc<dyn RemovalListener>);
    // Same instance twice counts once.
    assert!(!registry.register_removal_listener(Arc::clone(&first) as Arc<dyn RemovalListener>));

    for n in 1..=5 {
        registry.notify_activated(id(n), &format!("p{n}"), SessionToken(1), 0);
    }
    registry.notify_deactivated(id(3), 0);

    assert!(registry.remove_all(RemovalScope::All));
    assert!(registry.is_empty());
    assert!(!registry.is_expiring(id(3)));
    assert_eq!(factory.remove_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(first.remove_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(second.remove_all_calls.load(Ordering::Relaxed), 1);

    assert!(!registry.remove_all(RemovalScope::All));
}

#[test]
fn verify_remove_matching_keeps_online() {
    let (_, registry) = registry("");
    registry.notify_activated(id(1), "bot_1", SessionToken(1), 0);
    registry.notify_activated(id(2), "bot_2", SessionToken(2), 0);
    registry.notify_activated(id(3), "Steve", SessionToken(3), 0);
    registry.notify_deactivated(id(1), 0);

    let is_bot = |record: &sentinel_registry::EntityRecord| record.name().starts_with("bot_");
    assert!(registry.remove_all(RemovalScope::Matching(&is_bot)));
    assert!(!registry.contains(id(1)));
    assert!(!registry.is_expiring(id(1)));
    assert!(registry.contains(id(2)), "online bot kept");
    assert!(registry.contains(id(3)));
}

#[test]
fn verify_unregistered_collaborator_not_called() {
    let (_, registry) = registry("");
    let listener = Arc::new(CountingListener::default());
    let handle = Arc::clone(&listener) as Arc<dyn RemovalListener>;
    registry.register_removal_listener(Arc::clone(&handle));
    assert!(registry.unregister_removal_listener(&handle));

    registry.get_or_create(id(1), "Steve", true);
    registry.remove_all(RemovalScope::All);
    assert_eq!(listener.remove_all_calls.load(Ordering::Relaxed), 0);
}

// =============================================================================
// Precise removal
// =============================================================================

#[test]
fn verify_remove_data_prefers_sub_check() {
    let (_, registry) = registry("");
    let factory = Arc::new(RecordingFactory::default());
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);
    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    let data = factory.seed("Steve");

    assert!(registry.remove_data("Steve", CheckType::CombatReach));
    assert!(data.reach_cleared.load(Ordering::Relaxed));
    assert!(factory.removed().is_empty(), "data object kept");

    assert!(registry.remove_data("Steve", CheckType::CombatSpeed));
    assert_eq!(factory.removed(), vec!["Steve".to_string()]);

    assert!(!registry.remove_data("Steve", CheckType::MovementSpeed));
    assert!(registry.contains(id(1)));
}

#[test]
fn verify_clear_data_scoped_to_subtree() {
    let (_, registry) = registry("");
    let factory = Arc::new(RecordingFactory::default());
    let movement = Arc::new(CountingListener {
        check: Some(CheckType::Movement),
        ..CountingListener::default()
    });
    let global = Arc::new(CountingListener::default());
    registry.register_data_factory(Arc::clone(&factory) as Arc<dyn CheckDataFactory>);
    registry.register_removal_listener(Arc::clone(&movement) as Arc<dyn RemovalListener>);
    registry.register_removal_listener(Arc::clone(&global) as Arc<dyn RemovalListener>);
    registry.history().record_violation(CheckType::MovementSpeed, "Steve", 1.0, 0);
    registry.history().record_violation(CheckType::CombatReach, "Steve", 1.0, 0);

    registry.clear_data(CheckType::Movement);
    assert_eq!(factory.remove_all_calls.load(Ordering::Relaxed), 0);
    assert_eq!(movement.remove_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(global.remove_all_calls.load(Ordering::Relaxed), 0);
    assert_eq!(registry.history().len(), 1);

    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    registry.get_or_create(id(2), "Alex", true);
    registry.clear_data(CheckType::All);
    assert_eq!(factory.remove_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(global.remove_all_calls.load(Ordering::Relaxed), 1);
    assert!(registry.contains(id(1)), "online record survives");
    assert!(!registry.contains(id(2)));
}

// =============================================================================
// Consistency
// =============================================================================

#[test]
fn verify_consistency_reports() {
    let (_, registry) = registry("");
    let online: Vec<ActiveEntity> = (1..=3)
        .map(|n| {
            let name = format!("p{n}");
            registry.notify_activated(id(n), &name, SessionToken(n as u64), 0);
            ActiveEntity::new(id(n), name, SessionToken(n as u64))
        })
        .collect();

    let clean = registry.check_consistency(&online);
    assert!(clean.is_consistent());
    assert_eq!((clean.missing, clean.extra, clean.stale), (0, 0, 0));
    assert_eq!(registry.stats().inconsistencies, 0);

    let mut with_ghost = online.clone();
    with_ghost.push(ActiveEntity::new(id(99), "ghost", SessionToken(99)));
    let report = registry.check_consistency(&with_ghost);
    assert_eq!(report.missing, 1);
    assert!(!registry.contains(id(99)));
    assert_eq!(registry.stats().inconsistencies, 1);

    assert_eq!(registry.shutdown(), 1);
    assert!(registry.is_empty());
}

#[test]
fn verify_suppressed_warnings_still_count() {
    let (_, registry) = registry("[consistency]\nsuppress_warnings = true");
    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    let report = registry.check_consistency(&[]);
    assert_eq!(report.extra, 1);
    assert_eq!(registry.stats().inconsistencies, 1);
}

// =============================================================================
// Threading
// =============================================================================

#[test]
fn verify_off_thread_tick_reported_and_runs() {
    let (clock, registry) = registry(TTL_ONE_MINUTE);
    registry.notify_activated(id(1), "Steve", SessionToken(1), 0);
    registry.notify_deactivated(id(1), 0);
    clock.set(60_000);

    let worker = Arc::clone(&registry);
    thread::spawn(move || {
        worker.on_tick(1, 50);
        worker.on_tick(2, 50);
    })
    .join()
    .unwrap();

    assert!(!registry.contains(id(1)), "maintenance still ran");
    assert_eq!(registry.primary_context().violations(), 2);
    assert_eq!(registry.primary_context().reported_sites(), 2);
}

#[test]
fn verify_background_tasks_merge_into_tick() {
    let (_, registry) = registry("");
    for n in 0..32 {
        registry.notify_activated(id(n), &format!("p{n}"), SessionToken(1), 0);
    }
    let runs = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4u128)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            let runs = Arc::clone(&runs);
            thread::spawn(move || {
                for n in (worker * 8)..(worker * 8 + 8) {
                    let runs = Arc::clone(&runs);
                    assert!(registry.schedule_tick_task(
                        id(n),
                        Box::new(move |_, _| {
                            runs.fetch_add(1, Ordering::Relaxed);
                            sentinel_registry::TaskStatus::Done
                        }),
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.stats().pending_background, 32);
    registry.on_tick(1, 50);
    assert_eq!(runs.load(Ordering::Relaxed), 32);
    let stats = registry.stats();
    assert_eq!(stats.pending_primary, 0);
    assert_eq!(stats.pending_background, 0);
}
