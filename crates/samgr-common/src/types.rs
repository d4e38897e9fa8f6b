//! Core domain types.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest ability id accepted anywhere.
pub const FIRST_ABILITY_ID: i32 = 1;

/// Highest ability id accepted anywhere.
pub const LAST_ABILITY_ID: i32 = 0x00FF_FFFF;

/// Device key used for loads requested on this device.
pub const LOCAL_DEVICE: &str = "local";

/// Maximum length of a hosting process name.
pub const MAX_PROCESS_NAME_LEN: usize = 200;

/// Ability identifier, validated on construction.
///
/// Raw `i32` values arriving from the wire or from profiles must pass through
/// [`AbilityId::new`] before they can reach any registry map.
///
/// # Example
/// ```
/// use samgr_common::AbilityId;
///
/// let id = AbilityId::new(1234).unwrap();
/// assert_eq!(id.as_i32(), 1234);
/// assert!(AbilityId::new(0).is_err());
/// assert!(AbilityId::new(0x0100_0000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct AbilityId(i32);

impl AbilityId {
    /// Creates an id, rejecting values outside the reserved range.
    pub fn new(raw: i32) -> Result<Self> {
        if Self::is_valid(raw) {
            Ok(Self(raw))
        } else {
            Err(Error::invalid_value(format!(
                "ability id {} outside [{}, {}]",
                raw, FIRST_ABILITY_ID, LAST_ABILITY_ID
            )))
        }
    }

    pub fn is_valid(raw: i32) -> bool {
        (FIRST_ABILITY_ID..=LAST_ABILITY_ID).contains(&raw)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for AbilityId {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<AbilityId> for i32 {
    fn from(id: AbilityId) -> i32 {
        id.0
    }
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks a hosting process name: not blank and at most
/// [`MAX_PROCESS_NAME_LEN`] bytes.
pub fn validate_process_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_value("process name is empty"));
    }
    if name.len() > MAX_PROCESS_NAME_LEN {
        return Err(Error::invalid_value(format!(
            "process name too long ({} > {})",
            name.len(),
            MAX_PROCESS_NAME_LEN
        )));
    }
    Ok(())
}
