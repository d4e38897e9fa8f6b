//! Published abilities: lookup, publish and withdraw.

use super::death::WatchKind;
use super::notifier::Notification;
use super::SystemAbilityManager;
use crate::types::SaExtraProp;
use parking_lot::RwLock;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::{RemoteHandle, WatchId};
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

pub(super) struct AbilityRecord {
    handle: RemoteHandle,
    extra: SaExtraProp,
    watch: WatchId,
}

/// Ability map, bounded by `capacity`.
pub(super) struct AbilityTable {
    capacity: usize,
    records: RwLock<HashMap<AbilityId, AbilityRecord>>,
}

impl AbilityTable {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub(super) fn get(&self, id: AbilityId) -> Option<RemoteHandle> {
        self.records.read().get(&id).map(|r| r.handle.clone())
    }

    pub(super) fn get_distributed(&self, id: AbilityId) -> Option<RemoteHandle> {
        self.records
            .read()
            .get(&id)
            .filter(|r| r.extra.is_distributed)
            .map(|r| r.handle.clone())
    }

    pub(super) fn contains(&self, id: AbilityId) -> bool {
        self.records.read().contains_key(&id)
    }

    /// Inserts or replaces. Returns the replaced record.
    fn insert(&self, id: AbilityId, record: AbilityRecord) -> Result<Option<AbilityRecord>> {
        let mut records = self.records.write();
        if !records.contains_key(&id) && records.len() >= self.capacity {
            return Err(Error::permission_denied(format!(
                "ability map is full ({} entries)",
                self.capacity
            )));
        }
        Ok(records.insert(id, record))
    }

    fn remove(&self, id: AbilityId) -> Option<AbilityRecord> {
        self.records.write().remove(&id)
    }

    /// Removes `id` only while it is still published with `handle`.
    fn remove_if_handle(&self, id: AbilityId, handle: &RemoteHandle) -> Option<AbilityRecord> {
        let mut records = self.records.write();
        if records.get(&id).map_or(false, |r| r.handle == *handle) {
            records.remove(&id)
        } else {
            None
        }
    }

    fn ids_for_handle(&self, handle: &RemoteHandle) -> Vec<AbilityId> {
        self.records
            .read()
            .iter()
            .filter(|(_, r)| r.handle == *handle)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Published ids in ascending order.
    pub(super) fn ids(&self) -> Vec<AbilityId> {
        let mut ids: Vec<AbilityId> = self.records.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl SystemAbilityManager {
    /// Non-blocking lookup. Counts the call for the frequency report.
    pub fn check_system_ability(&self, id: AbilityId, calling_pid: i32) -> Option<RemoteHandle> {
        self.inner.frequency.record(calling_pid, id);
        self.inner.abilities.get(id)
    }

    /// Publishes `handle` under `id`.
    ///
    /// Replaces an existing record for the same id. On success the handle is
    /// watched, queued load callbacks for the id are answered and listeners
    /// are told.
    pub fn add_system_ability(
        &self,
        id: AbilityId,
        handle: RemoteHandle,
        extra: SaExtraProp,
    ) -> Result<()> {
        if extra.dump_flags < 0 {
            return Err(Error::invalid_value(format!(
                "negative dump flags {} for ability {}",
                extra.dump_flags, id
            )));
        }

        let watch = self.watch(&handle, WatchKind::Ability)?;
        let record = AbilityRecord {
            handle: handle.clone(),
            extra: extra.clone(),
            watch,
        };
        let (inserted, listeners) = self
            .inner
            .listeners
            .snapshot_with(id, || self.inner.abilities.insert(id, record));

        match inserted {
            Err(e) => {
                handle.remove_death_recipient(watch);
                warn!("Rejected ability {}: {}", id, e);
                return Err(e);
            }
            Ok(Some(old)) => {
                old.handle.remove_death_recipient(old.watch);
                debug!("Ability {} republished, replacing {}", id, old.handle.token());
            }
            Ok(None) => {}
        }

        info!(
            ability_id = %id,
            owner_pid = handle.owner_pid(),
            distributed = extra.is_distributed,
            "System ability added"
        );

        if extra.is_distributed {
            if let Some(bridge) = self.bridge() {
                bridge.on_ability_added(id, &handle);
            }
        }

        let callbacks = self.take_pending_callbacks(id);
        self.inner
            .notifier
            .send(Notification::Added { id, listeners });
        if !callbacks.is_empty() {
            debug!("Answering {} queued load callbacks for ability {}", callbacks.len(), id);
            self.inner.notifier.send(Notification::LoadSucceeded {
                id,
                handle,
                callbacks,
            });
        }
        Ok(())
    }

    /// Withdraws `id`. Fails with `NotFound` if it is not published.
    pub fn remove_system_ability(&self, id: AbilityId) -> Result<()> {
        let (removed, listeners) = self
            .inner
            .listeners
            .snapshot_with(id, || self.inner.abilities.remove(id));
        let record = removed.ok_or_else(|| Error::not_found(format!("ability {}", id)))?;
        self.finish_removal(id, record, listeners);
        Ok(())
    }

    /// Withdraws every id published with `handle`.
    pub fn remove_system_ability_by_handle(&self, handle: &RemoteHandle) -> Result<()> {
        let ids = self.inner.abilities.ids_for_handle(handle);
        let mut removed_any = false;
        for id in ids {
            let (removed, listeners) = self
                .inner
                .listeners
                .snapshot_with(id, || self.inner.abilities.remove_if_handle(id, handle));
            if let Some(record) = removed {
                self.finish_removal(id, record, listeners);
                removed_any = true;
            }
        }
        if removed_any {
            Ok(())
        } else {
            Err(Error::not_found(format!("ability handle {}", handle.token())))
        }
    }

    fn finish_removal(&self, id: AbilityId, record: AbilityRecord, listeners: Vec<RemoteHandle>) {
        record.handle.remove_death_recipient(record.watch);
        info!(ability_id = %id, "System ability removed");

        if record.extra.is_distributed {
            if let Some(bridge) = self.bridge() {
                bridge.on_ability_removed(id);
            }
        }
        self.inner
            .notifier
            .send(Notification::Removed { id, listeners });
    }

    /// Published ids in ascending order, as decimal strings.
    pub fn list_system_abilities(&self, dump_flags: i32) -> Vec<String> {
        trace!("list abilities, dump flags {}", dump_flags);
        self.inner
            .abilities
            .ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }
}
