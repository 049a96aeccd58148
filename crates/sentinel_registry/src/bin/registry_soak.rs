//! # Registry Soak
//!
//! Runs the registry against simulated traffic: a network thread delivers
//! joins and leaves over a channel, background workers hammer lookups and
//! bypass checks, and the main thread ticks, expires and audits.
//!
//! Usage: `cargo run -p sentinel_registry --features soak --bin registry_soak -- [ticks] [config.toml]`
//!
//! Log level comes from `SENTINEL_LOG` (default `info`).

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sentinel_core::{Clock, ManualClock};
use sentinel_registry::{
    ActiveEntity, CheckType, EntityId, EntityRegistry, PermissionSource, RegistryConfig,
    SessionToken, TaskStatus,
};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Distinct players that come and go.
const PLAYER_POOL: u128 = 500;
/// Simulated milliseconds per tick. Fast-forwards expiration.
const SIMULATED_TICK_MS: u64 = 1_000;
/// Real time per tick.
const REAL_TICK: Duration = Duration::from_millis(2);
/// Ticks between consistency audits.
const AUDIT_INTERVAL: u64 = 20;
const BACKGROUND_WORKERS: usize = 2;

const CHECKS: [CheckType; 4] = [
    CheckType::CombatReach,
    CheckType::CombatSpeed,
    CheckType::MovementSpeed,
    CheckType::BlockInteractReach,
];

/// Connection events as the host's network layer reports them.
enum HostEvent {
    Join {
        id: EntityId,
        name: String,
        session: SessionToken,
    },
    Leave {
        id: EntityId,
    },
}

/// Every tenth player holds every bypass.
struct StaffPermissions;

impl PermissionSource for StaffPermissions {
    fn has_permission(&self, id: EntityId, _node: &str) -> bool {
        id.as_uuid().as_u128() % 10 == 0
    }
}

fn init_tracing() {
    let env = std::env::var("SENTINEL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(path: Option<&str>) -> Result<RegistryConfig, sentinel_registry::RegistryError> {
    match path {
        Some(path) => RegistryConfig::from_file(Path::new(path)),
        None => RegistryConfig::from_toml_str(
            "[expiration]\nduration_minutes = 2\ndelete_history = true\n\
             [permissions]\ndefault_policy = \"interval:30000\"",
        ),
    }
}

/// Network thread: random joins and leaves until the receiver goes away.
fn spawn_network(events: Sender<HostEvent>, stop: Arc<AtomicBool>) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(0x5e47);
        let mut online: HashMap<u128, u64> = HashMap::new();
        let mut next_session = 1u64;
        let mut sent = 0u64;

        while !stop.load(Ordering::Relaxed) {
            let n = rng.gen_range(0..PLAYER_POOL);
            let id = EntityId::from_u128(n);
            let event = if online.remove(&n).is_some() {
                HostEvent::Leave { id }
            } else {
                next_session += 1;
                online.insert(n, next_session);
                HostEvent::Join {
                    id,
                    name: format!("player{n}"),
                    session: SessionToken(next_session),
                }
            };
            if events.send(event).is_err() {
                break;
            }
            sent += 1;
            thread::sleep(Duration::from_micros(rng.gen_range(200..2_000)));
        }
        sent
    })
}

/// Background worker: lookups, bypass checks and the odd tick task.
fn spawn_worker(
    seed: u64,
    registry: Arc<EntityRegistry>,
    task_runs: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<(u64, u64)> {
    thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut lookups = 0u64;
        let mut bypasses = 0u64;

        while !stop.load(Ordering::Relaxed) {
            let id = EntityId::from_u128(rng.gen_range(0..PLAYER_POOL));
            if registry.get_or_create(id, "", false).is_some() {
                lookups += 1;
            }
            let check = CHECKS[rng.gen_range(0..CHECKS.len())];
            if registry.has_bypass(id, check) {
                bypasses += 1;
            }
            if rng.gen_bool(0.01) {
                let runs = Arc::clone(&task_runs);
                registry.schedule_tick_task(
                    id,
                    Box::new(move |_, _| {
                        runs.fetch_add(1, Ordering::Relaxed);
                        TaskStatus::Done
                    }),
                );
            }
            thread::yield_now();
        }
        (lookups, bypasses)
    })
}

fn drain_events(
    events: &Receiver<HostEvent>,
    registry: &EntityRegistry,
    online: &mut HashMap<EntityId, ActiveEntity>,
    now_ms: u64,
) -> bool {
    loop {
        match events.try_recv() {
            Ok(HostEvent::Join { id, name, session }) => {
                registry.notify_activated(id, &name, session, now_ms);
                online.insert(id, ActiveEntity::new(id, name, session));
            }
            Ok(HostEvent::Leave { id }) => {
                registry.notify_deactivated(id, now_ms);
                online.remove(&id);
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let ticks: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(600);
    let config = match load_config(args.get(2).map(String::as_str)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let clock = Arc::new(ManualClock::new(0));
    let registry = match EntityRegistry::new(
        config,
        Arc::new(StaffPermissions),
        Arc::clone(&clock) as Arc<dyn Clock>,
    ) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SENTINEL REGISTRY SOAK                                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!("Ticks: {ticks}  Players: {PLAYER_POOL}  Workers: {BACKGROUND_WORKERS}");
    println!();

    let stop = Arc::new(AtomicBool::new(false));
    let task_runs = Arc::new(AtomicU64::new(0));
    let (event_tx, event_rx) = bounded(1024);

    let network = spawn_network(event_tx, Arc::clone(&stop));
    let workers: Vec<_> = (0..BACKGROUND_WORKERS)
        .map(|i| {
            spawn_worker(
                i as u64 + 1,
                Arc::clone(&registry),
                Arc::clone(&task_runs),
                Arc::clone(&stop),
            )
        })
        .collect();

    let started = Instant::now();
    let mut online: HashMap<EntityId, ActiveEntity> = HashMap::new();
    let mut audits_with_drift = 0u64;

    for tick in 1..=ticks {
        clock.advance(SIMULATED_TICK_MS);
        if !drain_events(&event_rx, &registry, &mut online, clock.now_millis()) {
            break;
        }
        registry.on_tick(tick, SIMULATED_TICK_MS);

        if tick % AUDIT_INTERVAL == 0 {
            let list: Vec<ActiveEntity> = online.values().cloned().collect();
            if !registry.check_consistency(&list).is_consistent() {
                audits_with_drift += 1;
            }
        }
        thread::sleep(REAL_TICK);
    }

    stop.store(true, Ordering::Relaxed);
    drop(event_rx);
    let events_sent = network.join().unwrap_or(0);
    let (mut lookups, mut bypasses) = (0u64, 0u64);
    for worker in workers {
        if let Ok((l, b)) = worker.join() {
            lookups += l;
            bypasses += b;
        }
    }

    let stats = registry.stats();
    let elapsed = started.elapsed();

    println!("┌─ RESULTS ────────────────────────────────────────────────────────┐");
    println!("│ Wall time:          {:.2}s", elapsed.as_secs_f64());
    println!("│ Host events:        {events_sent}");
    println!("│ Records:            {} ({} online)", stats.records, stats.online);
    println!("│ Waiting to expire:  {}", stats.expiration_log);
    println!("│ Background lookups: {lookups} hits, {bypasses} bypasses");
    println!("│ Tick tasks run:     {}", task_runs.load(Ordering::Relaxed));
    println!("│ Audits with drift:  {audits_with_drift}");
    println!("│ Improper access:    {}", stats.improper_access);
    println!("└──────────────────────────────────────────────────────────────────┘");

    let inconsistencies = registry.shutdown();
    if inconsistencies > 0 {
        println!("Consistency audits found {inconsistencies} problem(s).");
    }
}
