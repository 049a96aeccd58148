//! # Registry Error Types
//!
//! All errors that can surface from the player registry. None of them are
//! allowed to cross the tick boundary; the tick path logs and moves on.

use thiserror::Error;

use crate::identity::EntityId;

/// Errors that can occur in the registry and its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Configuration text could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration {path}: {reason}")]
    ConfigIo {
        /// Path that was read.
        path: String,
        /// I/O error text.
        reason: String,
    },

    /// Permission settings could not be built.
    #[error("invalid permission settings: {0}")]
    PermissionSettings(String),

    /// The record factory failed for a player.
    #[error("failed to create record for {id}: {reason}")]
    RecordCreation {
        /// Player the record was for.
        id: EntityId,
        /// Reason given by the factory.
        reason: String,
    },

    /// A data factory or removal listener failed to drop a player's data.
    #[error("{component} failed to remove data for {name}: {reason}")]
    DataRemoval {
        /// Component that failed.
        component: String,
        /// Player name the removal was for.
        name: String,
        /// Reason given by the component.
        reason: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
