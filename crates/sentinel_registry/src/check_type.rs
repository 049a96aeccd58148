//! # Check Types
//!
//! Checks form a tree rooted at [`CheckType::All`]. Exemptions, debug flags,
//! permission nodes and data removal all work on subtrees: exempting a player
//! from `Combat` also exempts them from `CombatReach`.
//!
//! ```text
//! All
//! ├── BlockInteract
//! │   ├── BlockInteractDirection
//! │   ├── BlockInteractReach
//! │   ├── BlockInteractSpeed
//! │   └── BlockInteractVisible
//! ├── Combat
//! │   ├── CombatReach
//! │   └── CombatSpeed
//! └── Movement
//!     ├── MovementSpeed
//!     └── MovementFlight
//! ```

use std::fmt;

use serde::Deserialize;

/// A node in the check tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Root of the tree.
    All,
    /// Block interaction group.
    BlockInteract,
    /// Looking away from the clicked block face.
    BlockInteractDirection,
    /// Interacting beyond reach.
    BlockInteractReach,
    /// Interacting too often.
    BlockInteractSpeed,
    /// Interacting through solid blocks.
    BlockInteractVisible,
    /// Combat group.
    Combat,
    /// Hitting beyond reach.
    CombatReach,
    /// Attacking too often.
    CombatSpeed,
    /// Movement group.
    Movement,
    /// Moving too fast.
    MovementSpeed,
    /// Flying without permission.
    MovementFlight,
}

impl CheckType {
    /// Every check type, parents before children.
    pub const ALL_TYPES: [CheckType; 12] = [
        CheckType::All,
        CheckType::BlockInteract,
        CheckType::BlockInteractDirection,
        CheckType::BlockInteractReach,
        CheckType::BlockInteractSpeed,
        CheckType::BlockInteractVisible,
        CheckType::Combat,
        CheckType::CombatReach,
        CheckType::CombatSpeed,
        CheckType::Movement,
        CheckType::MovementSpeed,
        CheckType::MovementFlight,
    ];

    /// Parent node, `None` for the root.
    #[must_use]
    pub const fn parent(self) -> Option<CheckType> {
        match self {
            CheckType::All => None,
            CheckType::BlockInteract | CheckType::Combat | CheckType::Movement => {
                Some(CheckType::All)
            }
            CheckType::BlockInteractDirection
            | CheckType::BlockInteractReach
            | CheckType::BlockInteractSpeed
            | CheckType::BlockInteractVisible => Some(CheckType::BlockInteract),
            CheckType::CombatReach | CheckType::CombatSpeed => Some(CheckType::Combat),
            CheckType::MovementSpeed | CheckType::MovementFlight => Some(CheckType::Movement),
        }
    }

    /// True if `self` is `other` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(self, other: CheckType) -> bool {
        let mut current = Some(other);
        while let Some(node) = current {
            if node == self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// `self` and everything below it, parents first.
    #[must_use]
    pub fn self_and_descendants(self) -> Vec<CheckType> {
        Self::ALL_TYPES
            .into_iter()
            .filter(|candidate| self.is_ancestor_or_self(*candidate))
            .collect()
    }

    /// Nodes from `self` up to the root.
    pub fn self_and_ancestors(self) -> impl Iterator<Item = CheckType> {
        std::iter::successors(Some(self), |node| node.parent())
    }

    /// Dotted permission node name that bypasses this check.
    #[must_use]
    pub const fn permission_node(self) -> &'static str {
        match self {
            CheckType::All => "sentinel.checks",
            CheckType::BlockInteract => "sentinel.checks.blockinteract",
            CheckType::BlockInteractDirection => "sentinel.checks.blockinteract.direction",
            CheckType::BlockInteractReach => "sentinel.checks.blockinteract.reach",
            CheckType::BlockInteractSpeed => "sentinel.checks.blockinteract.speed",
            CheckType::BlockInteractVisible => "sentinel.checks.blockinteract.visible",
            CheckType::Combat => "sentinel.checks.combat",
            CheckType::CombatReach => "sentinel.checks.combat.reach",
            CheckType::CombatSpeed => "sentinel.checks.combat.speed",
            CheckType::Movement => "sentinel.checks.movement",
            CheckType::MovementSpeed => "sentinel.checks.movement.speed",
            CheckType::MovementFlight => "sentinel.checks.movement.flight",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
