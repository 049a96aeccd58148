//! # SENTINEL Core
//!
//! Concurrency kernel for the SENTINEL anti-cheat player registry:
//! - Point reads of player state from the primary thread without waiting on writers
//! - Rare writes from background workers behind a short critical section
//! - Pending work fed from both contexts, merged at tick boundaries
//!
//! ## Architecture Rules
//!
//! 1. **Readers never wait** - The player map is published as an immutable snapshot
//! 2. **Writers serialize** - One short critical section per insert or batch removal
//! 3. **Contexts are explicit** - Primary-only operations are checked, not assumed
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_core::{LowLockMap, DualSet};
//!
//! let map: LowLockMap<u64, String> = LowLockMap::new();
//! let name = map.get_or_insert_with(7, || "Steve".to_string());
//! assert_eq!(map.get(&7).as_deref(), Some(&*name));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod context;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::PrimaryContext;
pub use sync::{DualSet, LowLockMap, MapSnapshot, OrderedSet};
