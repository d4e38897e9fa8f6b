//! Cross-device lookups and loads.

use super::death::WatchKind;
use super::notifier::bounded;
use super::SystemAbilityManager;
use crate::interfaces::LoadCallbackProxy;
use parking_lot::Mutex;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::{RemoteHandle, WatchId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

struct RemoteCallback {
    handle: RemoteHandle,
    watch: WatchId,
}

/// In-flight cross-device loads, keyed by `"<id>_<device>"`.
#[derive(Default)]
pub(super) struct RemoteLoadTable {
    entries: Mutex<HashMap<String, Vec<RemoteCallback>>>,
}

impl RemoteLoadTable {
    fn key(id: AbilityId, device_id: &str) -> String {
        format!("{}_{}", id, device_id)
    }

    /// Number of queued callbacks across all keys.
    pub(super) fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    fn take(&self, key: &str) -> Vec<RemoteCallback> {
        self.entries.lock().remove(key).unwrap_or_default()
    }
}

impl SystemAbilityManager {
    /// Loads `id` from `device_id` and reports to `callback` once the peer
    /// answers.
    ///
    /// Returns as soon as the request is queued on the load pool.
    pub fn load_system_ability_remote(
        &self,
        id: AbilityId,
        device_id: &str,
        callback: RemoteHandle,
        calling_pid: i32,
    ) -> Result<()> {
        if device_id.is_empty() {
            return Err(Error::invalid_value("remote load needs a device id"));
        }
        let key = RemoteLoadTable::key(id, device_id);

        let watch = {
            let mut entries = self.inner.remote_loads.entries.lock();
            let list = entries.entry(key.clone()).or_default();
            if list.iter().any(|c| c.handle == callback) {
                debug!("Callback {} already waiting on {}", callback.token(), key);
                return Ok(());
            }
            let watch = match self.watch(&callback, WatchKind::RemoteCallback) {
                Ok(watch) => watch,
                Err(e) => {
                    if list.is_empty() {
                        entries.remove(&key);
                    }
                    return Err(e);
                }
            };
            list.push(RemoteCallback {
                handle: callback.clone(),
                watch,
            });
            watch
        };

        let manager = self.clone();
        let device = device_id.to_string();
        let task_key = key.clone();
        let submitted = self.inner.load_pool.submit(async move {
            manager.do_load_remote(id, &device, &task_key, calling_pid).await;
        });
        if let Err(e) = submitted {
            warn!("Remote load {} not queued: {}", key, e);
            let mut entries = self.inner.remote_loads.entries.lock();
            if let Some(list) = entries.get_mut(&key) {
                list.retain(|c| c.handle != callback);
                if list.is_empty() {
                    entries.remove(&key);
                }
            }
            callback.remove_death_recipient(watch);
            return Err(e);
        }
        info!("Queued remote load {} for pid {}", key, calling_pid);
        Ok(())
    }

    async fn do_load_remote(&self, id: AbilityId, device_id: &str, key: &str, calling_pid: i32) {
        let handle = match self.bridge() {
            Some(bridge) => bridge.make_remote_binder(id, device_id, calling_pid).await,
            None => {
                warn!("No distributed bridge for remote load {}", key);
                None
            }
        };
        let callbacks = self.inner.remote_loads.take(key);
        info!(
            "Remote load {} finished ({}), {} callbacks",
            key,
            if handle.is_some() { "found" } else { "not found" },
            callbacks.len()
        );

        for callback in callbacks {
            callback.handle.remove_death_recipient(callback.watch);
            let proxy = LoadCallbackProxy::new(callback.handle, self.inner.pid);
            bounded(
                self.inner.config.notify_timeout,
                "on_load_system_ability_complete_for_remote",
                id,
                proxy.on_load_system_ability_complete_for_remote(device_id, id, handle.as_ref()),
            )
            .await;
        }
    }

    /// Drops a dead callback from every remote load.
    pub(super) fn remove_dead_remote_callback(&self, callback: &RemoteHandle) {
        let mut entries = self.inner.remote_loads.entries.lock();
        for list in entries.values_mut() {
            list.retain(|c| c.handle != *callback);
        }
        entries.retain(|_, list| !list.is_empty());
    }

    /// Resolves `id` on another device through the bridge. An empty device
    /// id means this device.
    pub async fn check_remote_system_ability(
        &self,
        id: AbilityId,
        device_id: &str,
        calling_pid: i32,
    ) -> Option<RemoteHandle> {
        if device_id.is_empty() {
            return self.check_system_ability(id, calling_pid);
        }
        let bridge = self.bridge()?;
        bridge.make_remote_binder(id, device_id, calling_pid).await
    }

    /// Local handle of `id` for a peer registry; only distributed abilities
    /// are visible.
    pub fn get_system_ability_from_remote(&self, id: AbilityId) -> Option<RemoteHandle> {
        self.inner.abilities.get_distributed(id)
    }

    /// Relays the death of a remote ability named `"<device>_<id>"`.
    pub fn notify_remote_ability_died(&self, name: &str) -> Result<()> {
        let (device_id, raw_id) = name
            .rsplit_once('_')
            .ok_or_else(|| Error::invalid_value(format!("malformed remote name '{}'", name)))?;
        if device_id.is_empty() {
            return Err(Error::invalid_value(format!("no device in remote name '{}'", name)));
        }
        let id = raw_id
            .parse::<i32>()
            .map_err(|e| Error::invalid_value(format!("bad id in remote name '{}': {}", name, e)))
            .and_then(AbilityId::new)?;

        info!("Remote ability {} on {} died", id, device_id);
        if let Some(bridge) = self.bridge() {
            bridge.on_remote_ability_died(device_id, id);
        }
        Ok(())
    }

    pub fn notify_remote_device_offline(&self, device_id: &str) {
        info!("Device {} went offline", device_id);
        if let Some(bridge) = self.bridge() {
            bridge.on_device_offline(device_id);
        }
    }
}
