//! Registry types shared with clients.

use samgr_common::AbilityId;
use std::fmt;

/// Attributes published together with an ability handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaExtraProp {
    pub is_distributed: bool,
    pub dump_flags: i32,
    pub capability: String,
    pub permission: String,
}

/// Progress of an on-demand start for an id with no published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting for on-demand info or a registered host process.
    Init,
    /// Start directive issued.
    Starting,
    /// Start directive accepted by the hosting process.
    Started,
}

impl fmt::Display for PendingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PendingState::Init => "init",
            PendingState::Starting => "starting",
            PendingState::Started => "started",
        };
        f.write_str(s)
    }
}

/// One caller/ability pair from the frequency report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyEntry {
    pub calling_pid: i32,
    pub ability_id: i32,
    pub count: i32,
}

/// Pending load summary for one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    pub id: AbilityId,
    pub state: PendingState,
    pub callbacks: usize,
}

/// Point-in-time view of the registry's maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub abilities: Vec<AbilityId>,
    pub pending: Vec<PendingSummary>,
    pub processes: Vec<String>,
    pub starting_processes: Vec<String>,
    pub subscriptions: usize,
    pub remote_loads: usize,
}
