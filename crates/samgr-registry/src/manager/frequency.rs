//! Caller/ability lookup frequency.

use super::SystemAbilityManager;
use crate::types::FrequencyEntry;
use chrono::Utc;
use parking_lot::Mutex;
use samgr_common::AbilityId;
use std::collections::HashMap;
use tracing::{debug, info};

/// Counts saturate here instead of wrapping.
const MAX_FREQUENCY_COUNT: i32 = i32::MAX - 1_000_000;

#[derive(Default)]
pub(super) struct FrequencyCounter {
    counts: Mutex<HashMap<u64, i32>>,
}

impl FrequencyCounter {
    fn key(pid: i32, id: AbilityId) -> u64 {
        ((pid as u64) << 32) | (id.as_i32() as u64)
    }

    /// Counts one lookup. Non-positive pids are not tracked.
    pub(super) fn record(&self, pid: i32, id: AbilityId) {
        if pid <= 0 {
            return;
        }
        let mut counts = self.counts.lock();
        let count = counts.entry(Self::key(pid, id)).or_insert(0);
        if *count < MAX_FREQUENCY_COUNT {
            *count += 1;
        }
    }

    /// Returns the counts, sorted, and clears them.
    fn take(&self) -> Vec<FrequencyEntry> {
        let counts = std::mem::take(&mut *self.counts.lock());
        let mut entries: Vec<FrequencyEntry> = counts
            .into_iter()
            .map(|(key, count)| FrequencyEntry {
                calling_pid: (key >> 32) as i32,
                ability_id: (key & 0xFFFF_FFFF) as i32,
                count,
            })
            .collect();
        entries.sort_by_key(|e| (e.calling_pid, e.ability_id));
        entries
    }
}

impl SystemAbilityManager {
    /// Logs and clears the lookup counts.
    pub fn report_frequency(&self) -> Vec<FrequencyEntry> {
        let entries = self.inner.frequency.take();
        info!(
            "Frequency report at {}: {} caller/ability pairs",
            Utc::now().to_rfc3339(),
            entries.len()
        );
        for entry in &entries {
            info!(
                calling_pid = entry.calling_pid,
                ability_id = entry.ability_id,
                count = entry.count,
                "lookup frequency"
            );
        }
        entries
    }

    pub(super) fn spawn_frequency_reporter(&self) {
        let weak = self.downgrade();
        let cancel = self.inner.cancel.clone();
        let period = self.inner.config.frequency_report_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(manager) = SystemAbilityManager::upgrade(&weak) else {
                            break;
                        };
                        manager.report_frequency();
                    }
                }
            }
            debug!("frequency reporter stopped");
        });
    }
}
