//! Registered hosting processes.

use super::death::WatchKind;
use super::SystemAbilityManager;
use parking_lot::Mutex;
use samgr_common::{validate_process_name, Error, Result};
use samgr_ipc::{RemoteHandle, WatchId};
use std::collections::HashMap;
use tracing::{debug, info};

struct ProcessRecord {
    handle: RemoteHandle,
    watch: WatchId,
}

#[derive(Default)]
pub(super) struct ProcessTable {
    records: Mutex<HashMap<String, ProcessRecord>>,
}

impl ProcessTable {
    pub(super) fn get(&self, name: &str) -> Option<RemoteHandle> {
        self.records.lock().get(name).map(|r| r.handle.clone())
    }

    pub(super) fn contains(&self, name: &str) -> bool {
        self.records.lock().contains_key(name)
    }

    /// Registered names in ascending order.
    pub(super) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SystemAbilityManager {
    /// Registers a hosting process and its per-process manager handle.
    ///
    /// Re-registering a name replaces the previous handle. Any launch of
    /// the process still marked in flight is considered finished.
    pub fn add_system_process(&self, name: &str, handle: RemoteHandle) -> Result<()> {
        validate_process_name(name)?;
        let watch = self.watch(&handle, WatchKind::Process)?;
        let owner_pid = handle.owner_pid();

        let replaced = self
            .inner
            .processes
            .records
            .lock()
            .insert(name.to_string(), ProcessRecord { handle, watch });
        if let Some(old) = replaced {
            old.handle.remove_death_recipient(old.watch);
            debug!("Process {} re-registered, replacing {}", name, old.handle.token());
        }

        let launch = self
            .inner
            .ondemand
            .with(|state| state.starting_processes.remove(name));
        match launch {
            Some(started) => info!(
                "Process {} registered (pid {}) {:?} after launch",
                name,
                owner_pid,
                started.elapsed()
            ),
            None => info!("Process {} registered (pid {})", name, owner_pid),
        }
        Ok(())
    }

    /// Unregisters the process served by `handle`.
    pub fn remove_system_process(&self, handle: &RemoteHandle) -> Result<()> {
        let removed = {
            let mut records = self.inner.processes.records.lock();
            let name = records
                .iter()
                .find(|(_, r)| r.handle == *handle)
                .map(|(name, _)| name.clone());
            name.and_then(|name| records.remove(&name).map(|r| (name, r)))
        };
        let (name, record) =
            removed.ok_or_else(|| Error::not_found(format!("process handle {}", handle.token())))?;
        record.handle.remove_death_recipient(record.watch);
        info!("Process {} removed", name);
        Ok(())
    }
}
