//! # Permission Caching
//!
//! Bypass permissions come from the host. Asking the host is only allowed on
//! the primary thread and can be slow, so answers are cached per player. How
//! long an answer stays valid is decided per node by a [`FetchPolicy`]:
//!
//! | Policy          | Behavior                                   |
//! |-----------------|--------------------------------------------|
//! | `always`        | Ask the host on every lookup               |
//! | `once`          | Ask once, keep until settings change       |
//! | `interval:<ms>` | Ask again once the answer is `ms` old      |
//! | `grant`         | Never ask, always bypass                   |
//! | `deny`          | Never ask, never bypass                    |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::PermissionConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::identity::EntityId;

/// Host-side permission lookup.
///
/// Only called from the primary thread.
pub trait PermissionSource: Send + Sync {
    /// Whether `id` holds the permission `node`.
    fn has_permission(&self, id: EntityId, node: &str) -> bool;
}

/// Permission source that grants nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPermissions;

impl PermissionSource for NoPermissions {
    fn has_permission(&self, _id: EntityId, _node: &str) -> bool {
        false
    }
}

/// How long a fetched permission stays valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Ask the host every time.
    Always,
    /// Ask once.
    Once,
    /// Ask again after the given number of milliseconds.
    Interval {
        /// Lifetime of a cached answer.
        millis: u64,
    },
    /// Always bypass without asking.
    Grant,
    /// Never bypass, never ask.
    Deny,
}

impl FetchPolicy {
    /// Whether an answer fetched at `fetched_ms` may still be used at `now_ms`.
    #[must_use]
    pub fn is_fresh(self, fetched_ms: u64, now_ms: u64) -> bool {
        match self {
            FetchPolicy::Always => false,
            FetchPolicy::Once | FetchPolicy::Grant | FetchPolicy::Deny => true,
            FetchPolicy::Interval { millis } => now_ms.saturating_sub(fetched_ms) < millis,
        }
    }

    /// Fixed answer for policies that never ask the host.
    #[must_use]
    pub const fn fixed_answer(self) -> Option<bool> {
        match self {
            FetchPolicy::Grant => Some(true),
            FetchPolicy::Deny => Some(false),
            _ => None,
        }
    }
}

impl FromStr for FetchPolicy {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_lowercase();
        match text.as_str() {
            "always" => Ok(FetchPolicy::Always),
            "once" => Ok(FetchPolicy::Once),
            "grant" => Ok(FetchPolicy::Grant),
            "deny" => Ok(FetchPolicy::Deny),
            _ => {
                let millis = text
                    .strip_prefix("interval:")
                    .and_then(|ms| ms.trim().parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        RegistryError::PermissionSettings(format!("unknown policy '{s}'"))
                    })?;
                Ok(FetchPolicy::Interval { millis })
            }
        }
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPolicy::Always => f.write_str("always"),
            FetchPolicy::Once => f.write_str("once"),
            FetchPolicy::Interval { millis } => write!(f, "interval:{millis}"),
            FetchPolicy::Grant => f.write_str("grant"),
            FetchPolicy::Deny => f.write_str("deny"),
        }
    }
}

/// Maps permission nodes to policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRule {
    /// Node, or node prefix when `prefix` is set.
    pattern: Arc<str>,
    prefix: bool,
    policy: FetchPolicy,
}

impl PermissionRule {
    /// Builds a rule. A trailing `*` turns the pattern into a prefix.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pattern.
    pub fn new(pattern: &str, policy: FetchPolicy) -> RegistryResult<Self> {
        let pattern = pattern.trim();
        let (body, prefix) = match pattern.strip_suffix('*') {
            Some(body) => (body, true),
            None => (pattern, false),
        };
        if body.is_empty() && !prefix {
            return Err(RegistryError::PermissionSettings(
                "empty permission pattern".to_string(),
            ));
        }
        Ok(Self {
            pattern: Arc::from(body.to_ascii_lowercase()),
            prefix,
            policy,
        })
    }

    /// Whether this rule applies to `node`.
    #[must_use]
    pub fn matches(&self, node: &str) -> bool {
        if self.prefix {
            node.len() >= self.pattern.len()
                && node.as_bytes()[..self.pattern.len()].eq_ignore_ascii_case(self.pattern.as_bytes())
        } else {
            node.eq_ignore_ascii_case(&self.pattern)
        }
    }

    /// The rule's policy.
    #[must_use]
    pub const fn policy(&self) -> FetchPolicy {
        self.policy
    }
}

/// Complete permission setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionSettings {
    default_policy: FetchPolicy,
    rules: Vec<PermissionRule>,
}

impl PermissionSettings {
    /// Settings with a default policy and rules checked in order.
    #[must_use]
    pub fn new(default_policy: FetchPolicy, rules: Vec<PermissionRule>) -> Self {
        Self {
            default_policy,
            rules,
        }
    }

    /// Least permissive settings: nobody bypasses anything.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::new(FetchPolicy::Deny, Vec::new())
    }

    /// Validates the `[permissions]` section.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PermissionSettings`] for an unknown policy or
    /// an empty pattern.
    pub fn from_config(config: &PermissionConfig) -> RegistryResult<Self> {
        let default_policy = config.default_policy.parse()?;
        let rules = config
            .rules
            .iter()
            .map(|rule| PermissionRule::new(&rule.pattern, rule.policy.parse()?))
            .collect::<RegistryResult<Vec<_>>>()?;
        Ok(Self::new(default_policy, rules))
    }

    /// Policy for `node`: the first matching rule, else the default.
    #[must_use]
    pub fn policy_for(&self, node: &str) -> FetchPolicy {
        self.rules
            .iter()
            .find(|rule| rule.matches(node))
            .map_or(self.default_policy, PermissionRule::policy)
    }
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self::new(FetchPolicy::Always, Vec::new())
    }
}

/// Currently active permission settings, swappable at runtime.
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    settings: RwLock<Arc<PermissionSettings>>,
}

impl PermissionRegistry {
    /// Registry starting with `settings`.
    #[must_use]
    pub fn new(settings: PermissionSettings) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
        }
    }

    /// Replaces the settings. Returns true if they differ from the old ones.
    pub fn update_settings(&self, settings: PermissionSettings) -> bool {
        let mut current = self.settings.write();
        if **current == settings {
            return false;
        }
        *current = Arc::new(settings);
        true
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> Arc<PermissionSettings> {
        Arc::clone(&self.settings.read())
    }

    /// Policy for `node` under the active settings.
    #[must_use]
    pub fn policy_for(&self, node: &str) -> FetchPolicy {
        self.settings.read().policy_for(node)
    }
}
