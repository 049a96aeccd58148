//! # Violation History
//!
//! Accumulated violation levels per check and player name. Kept apart from
//! the player records so history can outlive a record (expiration keeps it
//! unless configured otherwise).

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::check_type::CheckType;

/// Violations of one player for one check.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViolationRecord {
    /// Sum of all violation levels added.
    pub total_vl: f64,
    /// Number of violations.
    pub count: u64,
    /// Wall-clock time of the latest violation.
    pub last_ms: u64,
}

/// Violation history for every check.
#[derive(Debug, Default)]
pub struct HistoryLedger {
    entries: Mutex<FxHashMap<CheckType, FxHashMap<String, ViolationRecord>>>,
}

impl HistoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a violation of `vl` for `name` on `check`.
    pub fn record_violation(&self, check: CheckType, name: &str, vl: f64, now_ms: u64) {
        let mut entries = self.entries.lock();
        let record = entries
            .entry(check)
            .or_default()
            .entry(name.to_ascii_lowercase())
            .or_default();
        record.total_vl += vl;
        record.count += 1;
        record.last_ms = now_ms;
    }

    /// History of `name` on `check`. Names are case-insensitive.
    #[must_use]
    pub fn violations(&self, check: CheckType, name: &str) -> Option<ViolationRecord> {
        self.entries
            .lock()
            .get(&check)
            .and_then(|players| players.get(&name.to_ascii_lowercase()).copied())
    }

    /// Drops the history of `name` for `check` and its subtree.
    ///
    /// Returns true if anything was dropped.
    pub fn remove(&self, name: &str, check: CheckType) -> bool {
        let key = name.to_ascii_lowercase();
        let mut entries = self.entries.lock();
        let mut removed = false;
        for (node, players) in entries.iter_mut() {
            if check.is_ancestor_or_self(*node) {
                removed |= players.remove(&key).is_some();
            }
        }
        removed
    }

    /// Drops all history for `check` and its subtree.
    pub fn clear(&self, check: CheckType) {
        let mut entries = self.entries.lock();
        if check == CheckType::All {
            entries.clear();
        } else {
            entries.retain(|node, _| !check.is_ancestor_or_self(*node));
        }
    }

    /// Number of (check, player) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(FxHashMap::len).sum()
    }

    /// Whether the ledger holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
