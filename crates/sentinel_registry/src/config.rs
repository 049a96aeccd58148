//! # Registry Configuration
//!
//! Loaded from TOML. Every key is optional; out-of-range values are clamped
//! rather than rejected.
//!
//! ```toml
//! [expiration]
//! active = true
//! duration_minutes = 60
//! delete_data = true
//! delete_history = false
//!
//! [consistency]
//! suppress_warnings = false
//!
//! [maintenance]
//! rare_delay_ticks = 10
//!
//! [permissions]
//! default_policy = "always"
//! rules = [
//!     { pattern = "sentinel.checks.combat*", policy = "interval:5000" },
//!     { pattern = "sentinel.checks.movement.flight", policy = "once" },
//! ]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{RegistryError, RegistryResult};

/// Lower bound for the expiration duration.
pub const MIN_DURATION_MINUTES: u64 = 1;
/// Upper bound for the expiration duration.
pub const MAX_DURATION_MINUTES: u64 = 1_000_000;
/// Default expiration duration.
pub const DEFAULT_DURATION_MINUTES: u64 = 60;
/// Default number of ticks between rare maintenance passes.
pub const DEFAULT_RARE_DELAY_TICKS: u32 = 10;

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Complete registry configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Expiration of logged-out players.
    pub expiration: ExpirationConfig,
    /// Consistency audit.
    pub consistency: ConsistencyConfig,
    /// Tick loop tuning.
    pub maintenance: MaintenanceConfig,
    /// Permission fetch policies. Parsed separately so a bad rule only
    /// affects permissions.
    pub permissions: PermissionConfig,
}

impl RegistryConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if the text is not valid TOML
    /// or a key has the wrong type.
    pub fn from_toml_str(content: &str) -> RegistryResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        Ok(config.clamped())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Returns a copy with every value forced into its valid range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.expiration.duration_minutes = self
            .expiration
            .duration_minutes
            .clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES);
        self
    }
}

/// `[expiration]`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    /// Whether logged-out players expire at all.
    pub active: bool,
    /// Minutes after logout before a player's record is removed.
    pub duration_minutes: u64,
    /// Whether check data is dropped along with the record.
    pub delete_data: bool,
    /// Whether violation history is dropped along with the record.
    pub delete_history: bool,
}

impl ExpirationConfig {
    /// Time to live after logout, in milliseconds.
    #[must_use]
    pub fn ttl_millis(&self) -> u64 {
        self.duration_minutes
            .clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES)
            .saturating_mul(MILLIS_PER_MINUTE)
    }
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            active: true,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            delete_data: true,
            delete_history: false,
        }
    }
}

/// `[consistency]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Count drift without logging it.
    pub suppress_warnings: bool,
}

/// `[maintenance]`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Ticks to wait after a rare pass that did work.
    pub rare_delay_ticks: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            rare_delay_ticks: DEFAULT_RARE_DELAY_TICKS,
        }
    }
}

/// `[permissions]`, kept as raw text until
/// [`PermissionSettings::from_config`](crate::permissions::PermissionSettings::from_config)
/// validates it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Policy for nodes no rule matches.
    pub default_policy: String,
    /// Rules, first match wins.
    pub rules: Vec<PermissionRuleConfig>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            default_policy: "always".to_string(),
            rules: Vec::new(),
        }
    }
}

/// One `[[permissions.rules]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PermissionRuleConfig {
    /// Exact node, or a prefix ending in `*`.
    pub pattern: String,
    /// Policy text, see [`FetchPolicy`](crate::permissions::FetchPolicy).
    pub policy: String,
}
