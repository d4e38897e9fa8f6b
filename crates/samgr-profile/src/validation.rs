use super::*;
use anyhow::{anyhow, Result};
use samgr_common::validate_process_name;
use std::collections::HashSet;

/// Validate a process document
pub fn validate_process_profile(profile: &ProcessProfile) -> Result<()> {
    validate_process_name(&profile.process)
        .map_err(|e| anyhow!("Invalid process name '{}': {}", profile.process, e))?;

    let mut ids = HashSet::new();
    for sa in &profile.systemabilities {
        if !ids.insert(sa.id) {
            return Err(anyhow!(
                "Duplicate ability id {} in process {}",
                sa.id,
                profile.process
            ));
        }
        validate_sa_profile(sa)?;
    }

    Ok(())
}

/// Validate a single ability profile
pub fn validate_sa_profile(sa: &SaProfile) -> Result<()> {
    validate_process_name(&sa.process)
        .map_err(|e| anyhow!("Ability {} has invalid process: {}", sa.id, e))?;

    if sa.depends.contains(&sa.id) {
        return Err(anyhow!("Ability {} depends on itself", sa.id));
    }

    if sa.dump_level < 0 {
        return Err(anyhow!(
            "Ability {} dump_level must be >= 0, got {}",
            sa.id,
            sa.dump_level
        ));
    }

    Ok(())
}
