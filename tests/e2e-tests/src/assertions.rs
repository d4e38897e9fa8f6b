//! Scenario assertions. Each returns a description of what went wrong.

use crate::harness::SamgrHarness;
use crate::services::EventLog;
use samgr_common::AbilityId;
use samgr_registry::PendingState;

/// Assert that `id` is published in the registry.
pub fn assert_published(harness: &SamgrHarness, id: AbilityId) -> Result<(), String> {
    if harness.registry.check_system_ability(id, 0).is_some() {
        Ok(())
    } else {
        Err(format!(
            "Ability {} is not published. Registry: {:?}",
            id,
            harness.registry.snapshot()
        ))
    }
}

/// Assert that `id` is not published in the registry.
pub fn assert_not_published(harness: &SamgrHarness, id: AbilityId) -> Result<(), String> {
    if harness.registry.check_system_ability(id, 0).is_none() {
        Ok(())
    } else {
        Err(format!("Ability {} is still published", id))
    }
}

/// Assert that `event` was logged exactly `expected` times.
pub fn assert_event_count(events: &EventLog, event: &str, expected: usize) -> Result<(), String> {
    let count = events.count(event);
    if count == expected {
        Ok(())
    } else {
        Err(format!(
            "Expected '{}' {} times, saw it {} times. Events:\n{:#?}",
            event,
            expected,
            count,
            events.entries()
        ))
    }
}

/// Assert that the events in `expected` were logged in this relative order.
pub fn assert_in_order(events: &EventLog, expected: &[&str]) -> Result<(), String> {
    let entries = events.entries();
    let positions: Vec<Option<usize>> = expected
        .iter()
        .map(|e| entries.iter().position(|entry| entry == e))
        .collect();
    let ordered = positions.iter().all(Option::is_some)
        && positions.windows(2).all(|pair| pair[0] < pair[1]);
    if ordered {
        Ok(())
    } else {
        Err(format!(
            "Expected {:?} in order. Events:\n{:#?}",
            expected, entries
        ))
    }
}

/// Assert that the registry holds no load request for `id`.
pub fn assert_no_pending_load(harness: &SamgrHarness, id: AbilityId) -> Result<(), String> {
    let snapshot = harness.registry.snapshot();
    match snapshot.pending.iter().find(|p| p.id == id) {
        None => Ok(()),
        Some(p) => Err(format!(
            "Ability {} still has a pending load ({:?}, {} callbacks)",
            id, p.state, p.callbacks
        )),
    }
}

/// Assert that the pending load of `id` is in `state`.
pub fn assert_pending_state(
    harness: &SamgrHarness,
    id: AbilityId,
    state: PendingState,
) -> Result<(), String> {
    let snapshot = harness.registry.snapshot();
    match snapshot.pending.iter().find(|p| p.id == id) {
        Some(p) if p.state == state => Ok(()),
        Some(p) => Err(format!(
            "Ability {} is {:?}, expected {:?}",
            id, p.state, state
        )),
        None => Err(format!("Ability {} has no pending load", id)),
    }
}

/// Assert that `process` is registered with the registry.
pub fn assert_process_registered(harness: &SamgrHarness, process: &str) -> Result<(), String> {
    let processes = harness.registry.snapshot().processes;
    if processes.iter().any(|p| p == process) {
        Ok(())
    } else {
        Err(format!(
            "Process {} is not registered. Registered: {:?}",
            process, processes
        ))
    }
}
