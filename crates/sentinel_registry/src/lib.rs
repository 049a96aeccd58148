//! # SENTINEL Registry - The Player Ledger
//!
//! Per-player state shared by every anti-cheat check.
//!
//! ## Features
//!
//! - **Player Records**: One record per player, created on join or first lookup
//! - **Tick Maintenance**: Per-record tasks every tick, bulk work with backoff
//! - **Expiration**: Logged-out players are dropped after a configurable time
//! - **Consistency Audit**: Drift against the server's online list is reported
//!
//! ## Architecture
//!
//! ```text
//! HOST SERVER                          REGISTRY
//!     │                                    │
//!     │─── join / leave / world ──────────►│ lifecycle events
//!     │─── tick ──────────────────────────►│ frequent + rare maintenance
//!     │─── online list ───────────────────►│ consistency audit
//!     │                                    │
//!     │                                    ▼
//!     │                         ┌─────────────────────┐
//!     │                         │  EntityRecord map   │◄── checks (any thread)
//!     │                         └─────────────────────┘
//!     │                                    │
//!     │◄─── remove_data / remove_all ──────┤ data factories, listeners
//!     │                                    │
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod check_type;
pub mod collaborators;
pub mod config;
pub mod consistency;
pub mod error;
pub mod expiration;
pub mod history;
pub mod identity;
pub mod maintenance;
pub mod permissions;
pub mod record;
pub mod registry;

pub use check_type::CheckType;
pub use collaborators::{CheckData, CheckDataFactory, RemovalListener};
pub use config::RegistryConfig;
pub use consistency::{ActiveEntity, ConsistencyReport};
pub use error::{RegistryError, RegistryResult};
pub use history::{HistoryLedger, ViolationRecord};
pub use identity::{EntityId, SessionToken};
pub use permissions::{FetchPolicy, NoPermissions, PermissionSettings, PermissionSource};
pub use record::{EntityRecord, TaskStatus, TickTask};
pub use registry::{EntityRegistry, RegistryStats, RemovalScope};
