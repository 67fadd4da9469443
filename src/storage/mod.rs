//! Cross-cycle state.
//!
//! The only mutable state that survives between cycles: the acquisition
//! manager's last-known-good snapshots and the dispatcher's record of
//! recently delivered signals. Both are in-memory and owned by the
//! component they are injected into; nothing is persisted across process
//! restarts.

pub mod cache;
pub mod dedup;

pub use cache::{CacheEntry, SnapshotCache};
pub use dedup::{DispatchKey, DispatchLog};
