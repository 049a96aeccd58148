//! # Primary Thread Guard
//!
//! Exactly one thread drives the tick loop. Some registry operations are only
//! correct on that thread; calling them elsewhere is a latent bug, not a
//! crash. This guard detects such calls and reports each call site once.

use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;

/// Identity of the primary thread plus a record of reported violations.
#[derive(Debug)]
pub struct PrimaryContext {
    /// The primary thread.
    thread: RwLock<ThreadId>,
    /// Call sites already reported.
    reported: Mutex<FxHashSet<&'static Location<'static>>>,
    /// Total off-thread calls, reported or not.
    violations: AtomicU64,
}

impl PrimaryContext {
    /// Binds the primary context to the calling thread.
    #[must_use]
    pub fn current_thread() -> Self {
        Self {
            thread: RwLock::new(thread::current().id()),
            reported: Mutex::new(FxHashSet::default()),
            violations: AtomicU64::new(0),
        }
    }

    /// Rebinds the primary context to the calling thread.
    ///
    /// For hosts that construct the registry before their tick thread exists.
    pub fn rebind_to_current(&self) {
        *self.thread.write() = thread::current().id();
    }

    /// Returns true on the primary thread.
    #[inline]
    #[must_use]
    pub fn is_primary(&self) -> bool {
        *self.thread.read() == thread::current().id()
    }

    /// Checks that the caller runs on the primary thread.
    ///
    /// Off the primary thread this logs once per call site at `error` level
    /// and returns false. Execution is expected to continue either way.
    #[track_caller]
    pub fn check(&self, operation: &'static str) -> bool {
        if self.is_primary() {
            return true;
        }
        self.violations.fetch_add(1, Ordering::Relaxed);
        let location = Location::caller();
        if self.reported.lock().insert(location) {
            tracing::error!(
                operation,
                file = location.file(),
                line = location.line(),
                thread = ?thread::current().id(),
                "primary-only operation called off the primary thread"
            );
        }
        false
    }

    /// Total number of off-thread calls observed.
    #[must_use]
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Number of distinct call sites reported.
    #[must_use]
    pub fn reported_sites(&self) -> usize {
        self.reported.lock().len()
    }
}
