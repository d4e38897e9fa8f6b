//! # samgr common
//!
//! Common types shared across the system ability manager workspace: the
//! error type and its wire reply codes, validated ability ids, the bounded
//! worker pool used by both the registry and the per-process manager, and
//! serde helpers for configuration durations.

pub mod duration_serde;
pub mod errors;
pub mod pool;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result, ResultExt};
pub use pool::{PoolSlot, TaskPool};
pub use types::{validate_process_name, AbilityId, LOCAL_DEVICE};
