//! # Consistency Audit
//!
//! Compares the registry with the host's list of connected players. Drift is
//! counted and reported; the only thing repaired is a stale session, which is
//! overwritten with the one the host knows.

use std::fmt;

use rustc_hash::FxHashSet;
use sentinel_core::LowLockMap;

use crate::identity::{EntityId, SessionToken};
use crate::record::EntityRecord;

/// One connected player as the host sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveEntity {
    /// Identity.
    pub id: EntityId,
    /// Current name.
    pub name: String,
    /// Current connection.
    pub session: SessionToken,
}

impl ActiveEntity {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>, session: SessionToken) -> Self {
        Self {
            id,
            name: name.into(),
            session,
        }
    }
}

/// Result of one audit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Connected players with no online record.
    pub missing: usize,
    /// Online records for players the host does not list.
    pub extra: usize,
    /// Records whose session differed from the host's (now fixed).
    pub stale: usize,
    /// Online records in the registry.
    pub tracked: usize,
    /// Players in the host's list.
    pub authoritative: usize,
}

impl ConsistencyReport {
    /// Whether registry and host agree.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.missing == 0 && self.extra == 0 && self.stale == 0 && self.tracked == self.authoritative
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing={} extra={} stale={} tracked={} online={}",
            self.missing, self.extra, self.stale, self.tracked, self.authoritative
        )
    }
}

/// Audits `records` against `active`, fixing stale sessions.
///
/// Never creates records.
pub(crate) fn audit(
    records: &LowLockMap<EntityId, EntityRecord>,
    active: &[ActiveEntity],
) -> ConsistencyReport {
    let snapshot = records.snapshot();
    let listed: FxHashSet<EntityId> = active.iter().map(|entity| entity.id).collect();
    let mut report = ConsistencyReport {
        authoritative: listed.len(),
        ..ConsistencyReport::default()
    };

    for entity in active {
        match snapshot.get(&entity.id) {
            Some(record) if record.is_online() => {
                if record.session() != Some(entity.session) {
                    record.set_session(entity.session);
                    record.set_name(&entity.name);
                    report.stale += 1;
                }
            }
            _ => report.missing += 1,
        }
    }

    for record in snapshot.values() {
        if record.is_online() {
            report.tracked += 1;
            if !listed.contains(&record.id()) {
                report.extra += 1;
            }
        }
    }

    report
}
