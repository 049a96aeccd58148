//! # Synchronization Primitives for the Player Registry
//!
//! ARCHITECT'S ORDER: The primary thread never waits on a background worker.
//!
//! ## The Problem
//!
//! ```text
//! Primary thread (tick):     READ player state, every check, every packet
//! Background (async chat):   CREATE player state, rarely
//! Primary thread (rare):     REMOVE expired players in bulk
//!
//! With one Mutex:            every check contends with every login
//! ```
//!
//! ## The Solution: Copy-on-Write + Split Buffers
//!
//! ```text
//! Readers:  load Arc<snapshot>   (atomic pointer load, no lock)
//! Writers:  lock -> clone -> mutate -> publish -> unlock
//!
//! Pending work:
//!   primary buffer     <- primary thread only
//!   background buffer  <- workers, drained into primary at tick start
//! ```

mod dual_set;
mod low_lock_map;
mod ordered_set;

pub use dual_set::DualSet;
pub use low_lock_map::{LowLockMap, MapSnapshot};
pub use ordered_set::OrderedSet;
