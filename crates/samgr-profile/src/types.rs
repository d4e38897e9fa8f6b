//! Profile types.

use samgr_common::{duration_serde, AbilityId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Dependency timeout used when a profile does not set one.
pub const DEFAULT_DEPEND_TIMEOUT: Duration = Duration::from_millis(6000);

/// Shortest accepted dependency timeout; shorter values fall back to the default.
pub const MIN_DEPEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Longest accepted dependency timeout; longer values fall back to the default.
pub const MAX_DEPEND_TIMEOUT: Duration = Duration::from_secs(60);

fn default_depend_timeout() -> Duration {
    DEFAULT_DEPEND_TIMEOUT
}

/// Ordering bucket for process bring-up. Phases start in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BootPhase {
    Boot,
    Core,
    #[default]
    Other,
}

impl BootPhase {
    pub const ALL: [BootPhase; 3] = [BootPhase::Boot, BootPhase::Core, BootPhase::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            BootPhase::Boot => "BootStartPhase",
            BootPhase::Core => "CoreStartPhase",
            BootPhase::Other => "OtherStartPhase",
        }
    }
}

/// Unknown tags land in `Other`.
impl From<String> for BootPhase {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "BootStartPhase" => BootPhase::Boot,
            "CoreStartPhase" => BootPhase::Core,
            _ => BootPhase::Other,
        }
    }
}

impl From<BootPhase> for String {
    fn from(phase: BootPhase) -> String {
        phase.as_str().to_string()
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for one ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaProfile {
    pub id: AbilityId,
    /// Hosting process. Filled from the enclosing process document when omitted.
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub lib_path: String,
    #[serde(default)]
    pub depends: Vec<AbilityId>,
    #[serde(default = "default_depend_timeout", with = "duration_serde")]
    pub depend_timeout: Duration,
    #[serde(default)]
    pub run_on_create: bool,
    #[serde(default)]
    pub distributed: bool,
    #[serde(default)]
    pub dump_level: i32,
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub permission: String,
    #[serde(default)]
    pub boot_phase: BootPhase,
}

impl SaProfile {
    /// A profile with every optional attribute at its default.
    pub fn new(id: AbilityId, process: impl Into<String>) -> Self {
        Self {
            id,
            process: process.into(),
            lib_path: String::new(),
            depends: Vec::new(),
            depend_timeout: DEFAULT_DEPEND_TIMEOUT,
            run_on_create: false,
            distributed: false,
            dump_level: 0,
            capability: String::new(),
            permission: String::new(),
            boot_phase: BootPhase::Other,
        }
    }

    /// Replaces an out-of-bounds dependency timeout with the default.
    pub(crate) fn normalize(&mut self) {
        if self.depend_timeout < MIN_DEPEND_TIMEOUT || self.depend_timeout > MAX_DEPEND_TIMEOUT {
            tracing::warn!(
                "Ability {} depend_timeout {:?} out of bounds, using {:?}",
                self.id,
                self.depend_timeout,
                DEFAULT_DEPEND_TIMEOUT
            );
            self.depend_timeout = DEFAULT_DEPEND_TIMEOUT;
        }
    }
}

/// One YAML profile document: a hosting process and its abilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessProfile {
    pub process: String,
    #[serde(default)]
    pub systemabilities: Vec<SaProfile>,
}
