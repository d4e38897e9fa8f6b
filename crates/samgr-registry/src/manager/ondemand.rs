//! On-demand loading.
//!
//! A load for an unpublished id queues its callback under the id's pending
//! entry, makes sure the hosting process is running, and sends that
//! process's manager a start directive. The pending entry is answered in
//! one go when the ability publishes; each callback that is still queued
//! when its own timer fires is failed on its own.

use super::death::WatchKind;
use super::notifier::Notification;
use super::{release_count, SystemAbilityManager};
use crate::interfaces::{LoadCallbackStub, LocalAbilityManagerProxy, SystemAbilityLoadCallback};
use crate::types::PendingState;
use async_trait::async_trait;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use samgr_common::{validate_process_name, AbilityId, Error, Result, LOCAL_DEVICE};
use samgr_ipc::{HandleToken, RemoteHandle, WatchId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

pub(super) struct PendingCallback {
    handle: RemoteHandle,
    /// Caller whose quota the callback counts against; `None` for loads
    /// requested by a peer registry.
    pid: Option<i32>,
    watch: WatchId,
    timer: AbortHandle,
}

impl PendingCallback {
    /// Disarms the timer and the liveness watch.
    fn release(&self, counts: &mut HashMap<i32, usize>) {
        self.timer.abort();
        self.handle.remove_death_recipient(self.watch);
        if let Some(pid) = self.pid {
            release_count(counts, pid);
        }
    }
}

pub(super) struct PendingLoad {
    pub(super) state: PendingState,
    /// Device key → callbacks in registration order.
    callbacks: BTreeMap<String, Vec<PendingCallback>>,
}

impl PendingLoad {
    fn new() -> Self {
        Self {
            state: PendingState::Init,
            callbacks: BTreeMap::new(),
        }
    }

    pub(super) fn callback_count(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    fn contains(&self, device_key: &str, token: HandleToken) -> bool {
        self.callbacks
            .get(device_key)
            .map_or(false, |list| list.iter().any(|c| c.handle.token() == token))
    }
}

#[derive(Default)]
pub(super) struct OnDemandState {
    /// Id → hosting process, registered by that process's manager.
    on_demand: HashMap<AbilityId, String>,
    pub(super) pending: HashMap<AbilityId, PendingLoad>,
    pub(super) starting_processes: HashMap<String, Instant>,
    callback_counts: HashMap<i32, usize>,
}

/// On-demand info, pending loads and starting processes under one
/// re-entrant lock.
pub(super) struct OnDemandTable {
    state: ReentrantMutex<RefCell<OnDemandState>>,
}

impl OnDemandTable {
    pub(super) fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(OnDemandState::default())),
        }
    }

    /// Holds the lock across several `with` calls.
    fn hold(&self) -> ReentrantMutexGuard<'_, RefCell<OnDemandState>> {
        self.state.lock()
    }

    /// Runs `f` on the state. `f` must not call back into the table.
    pub(super) fn with<T>(&self, f: impl FnOnce(&mut OnDemandState) -> T) -> T {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }
}

/// Work computed under the on-demand lock and carried out after it is
/// released.
#[derive(Debug)]
pub(super) enum Directive {
    StartAbility { process: RemoteHandle, id: AbilityId },
    LaunchProcess { process: String, id: AbilityId },
}

impl SystemAbilityManager {
    /// Loads `id` on this device and reports the outcome to `callback`.
    ///
    /// Requires a profile for `id`. If the ability is already published the
    /// callback is answered right away; otherwise it is queued until the
    /// ability publishes or `load_timeout` passes. Registering the same
    /// callback twice is accepted once.
    pub async fn load_system_ability(
        &self,
        id: AbilityId,
        callback: RemoteHandle,
        calling_pid: i32,
    ) -> Result<()> {
        let profile = self
            .profile(id)
            .ok_or_else(|| Error::invalid_value(format!("no profile for ability {}", id)))?;

        if let Some(handle) = self.inner.abilities.get(id) {
            self.inner.notifier.send(Notification::LoadSucceeded {
                id,
                handle,
                callbacks: vec![callback],
            });
            return Ok(());
        }

        let directive =
            self.queue_load(id, &profile.process, LOCAL_DEVICE, callback, Some(calling_pid))?;
        self.dispatch(directive).await;
        Ok(())
    }

    /// Load requested by a peer registry for one of this device's
    /// distributed abilities. Returns false if `id` is not distributed here.
    pub async fn load_system_ability_from_rpc(
        &self,
        src_device_id: &str,
        id: AbilityId,
        callback: RemoteHandle,
    ) -> bool {
        let Some(profile) = self.profile(id) else {
            warn!("load from {} for unknown ability {}", src_device_id, id);
            return false;
        };
        if !profile.distributed {
            warn!("load from {} for ability {} which is not distributed", src_device_id, id);
            return false;
        }

        if let Some(handle) = self.inner.abilities.get(id) {
            self.inner.notifier.send(Notification::LoadSucceeded {
                id,
                handle,
                callbacks: vec![callback],
            });
            return true;
        }

        match self.queue_load(id, &profile.process, src_device_id, callback, None) {
            Ok(directive) => {
                self.dispatch(directive).await;
                true
            }
            Err(e) => {
                warn!("load from {} for ability {} rejected: {}", src_device_id, id, e);
                false
            }
        }
    }

    /// Queues `callback` under `id` and `device_key`, arms its timer and
    /// works out what has to happen to get the ability started.
    fn queue_load(
        &self,
        id: AbilityId,
        process: &str,
        device_key: &str,
        callback: RemoteHandle,
        pid: Option<i32>,
    ) -> Result<Option<Directive>> {
        let ondemand = &self.inner.ondemand;
        let _guard = ondemand.hold();

        // The publish path inserts the record before it drains the pending
        // entry, so checking again here cannot strand a callback.
        if let Some(handle) = self.inner.abilities.get(id) {
            self.inner.notifier.send(Notification::LoadSucceeded {
                id,
                handle,
                callbacks: vec![callback],
            });
            return Ok(None);
        }

        let max = self.inner.config.max_subscribe_count;
        let accepted = ondemand.with(|state| -> Result<bool> {
            let duplicate = state
                .pending
                .get(&id)
                .map_or(false, |p| p.contains(device_key, callback.token()));
            if duplicate {
                return Ok(false);
            }
            if let Some(pid) = pid {
                let count = state.callback_counts.get(&pid).copied().unwrap_or(0);
                if count >= max {
                    return Err(Error::permission_denied(format!(
                        "pid {} exceeds {} load callbacks",
                        pid, max
                    )));
                }
            }
            Ok(true)
        })?;
        if !accepted {
            debug!("Callback {} already queued for ability {}", callback.token(), id);
            return Ok(None);
        }

        let watch = self.watch(&callback, WatchKind::LoadCallback)?;
        let timer = self.arm_load_timer(id, device_key, callback.token());
        let token = callback.token();
        let queued = ondemand.with(|state| {
            let pending = state.pending.entry(id).or_insert_with(PendingLoad::new);
            let list = pending.callbacks.entry(device_key.to_string()).or_default();
            list.push(PendingCallback {
                handle: callback,
                pid,
                watch,
                timer,
            });
            if let Some(pid) = pid {
                *state.callback_counts.entry(pid).or_insert(0) += 1;
            }
            list.len()
        });
        info!(
            "Queued load callback {} for ability {} ({}), {} waiting",
            token, id, device_key, queued
        );

        self.starting_system_process(process, id)
    }

    fn arm_load_timer(&self, id: AbilityId, device_key: &str, token: HandleToken) -> AbortHandle {
        let weak = self.downgrade();
        let timeout = self.inner.config.load_timeout;
        let device_key = device_key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(manager) = SystemAbilityManager::upgrade(&weak) {
                manager.on_load_timeout(id, &device_key, token);
            }
        })
        .abort_handle()
    }

    /// Fails one queued callback whose timer fired.
    fn on_load_timeout(&self, id: AbilityId, device_key: &str, token: HandleToken) {
        let ondemand = &self.inner.ondemand;
        let _guard = ondemand.hold();

        let removed = ondemand.with(|state| {
            let pending = state.pending.get_mut(&id)?;
            let list = pending.callbacks.get_mut(device_key)?;
            let pos = list.iter().position(|c| c.handle.token() == token)?;
            let entry = list.remove(pos);
            if list.is_empty() {
                pending.callbacks.remove(device_key);
            }
            if pending.callbacks.is_empty() {
                state.pending.remove(&id);
            }
            entry.handle.remove_death_recipient(entry.watch);
            if let Some(pid) = entry.pid {
                release_count(&mut state.callback_counts, pid);
            }
            Some(entry.handle)
        });
        let Some(callback) = removed else {
            return;
        };

        if let Some(handle) = self.inner.abilities.get(id) {
            self.inner.notifier.send(Notification::LoadSucceeded {
                id,
                handle,
                callbacks: vec![callback],
            });
            return;
        }

        if let Some(profile) = self.profile(id) {
            ondemand.with(|state| state.starting_processes.remove(&profile.process));
        }
        warn!(
            "Load of ability {} timed out after {:?} for callback {}",
            id, self.inner.config.load_timeout, token
        );
        self.inner.notifier.send(Notification::LoadFailed {
            id,
            callbacks: vec![callback],
        });
    }

    /// Removes the pending entry of a freshly published id and returns its
    /// callbacks, device key by device key.
    pub(super) fn take_pending_callbacks(&self, id: AbilityId) -> Vec<RemoteHandle> {
        self.inner.ondemand.with(|state| {
            let Some(pending) = state.pending.remove(&id) else {
                return Vec::new();
            };
            let mut handles = Vec::with_capacity(pending.callback_count());
            for (_, list) in pending.callbacks {
                for entry in list {
                    entry.release(&mut state.callback_counts);
                    handles.push(entry.handle);
                }
            }
            handles
        })
    }

    /// Drops a dead callback from every pending entry.
    pub(super) fn remove_dead_load_callback(&self, callback: &RemoteHandle) {
        let removed = self.inner.ondemand.with(|state| {
            let mut removed = 0;
            let mut emptied = Vec::new();
            for (id, pending) in state.pending.iter_mut() {
                let before = pending.callback_count();
                if before == 0 {
                    continue;
                }
                for list in pending.callbacks.values_mut() {
                    list.retain(|entry| {
                        if entry.handle == *callback {
                            entry.release(&mut state.callback_counts);
                            removed += 1;
                            false
                        } else {
                            true
                        }
                    });
                }
                pending.callbacks.retain(|_, list| !list.is_empty());
                if pending.callbacks.is_empty() {
                    emptied.push(*id);
                }
            }
            for id in emptied {
                state.pending.remove(&id);
            }
            removed
        });
        if removed > 0 {
            info!("Removed {} queued loads of dead callback {}", removed, callback.token());
        }
    }

    /// Makes sure `process` is running, or asks it to start `id` if it is.
    fn starting_system_process(&self, process: &str, id: AbilityId) -> Result<Option<Directive>> {
        let ondemand = &self.inner.ondemand;
        let _guard = ondemand.hold();

        if ondemand.with(|state| state.starting_processes.contains_key(process)) {
            debug!("Process {} is already starting", process);
            return Ok(None);
        }

        if self.inner.processes.contains(process) {
            return match self.start_on_demand_locked(id) {
                Ok(directive) => Ok(directive),
                // The process has not registered its on-demand info yet; it
                // will trigger the start itself when it does.
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            };
        }

        ondemand.with(|state| {
            state
                .starting_processes
                .insert(process.to_string(), Instant::now())
        });
        Ok(Some(Directive::LaunchProcess {
            process: process.to_string(),
            id,
        }))
    }

    /// The Init → Starting transition for `id`.
    fn start_on_demand_locked(&self, id: AbilityId) -> Result<Option<Directive>> {
        let ondemand = &self.inner.ondemand;
        let _guard = ondemand.hold();

        let process = ondemand
            .with(|state| state.on_demand.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("on-demand info for ability {}", id)))?;
        let remote = self
            .inner
            .processes
            .get(&process)
            .ok_or_else(|| Error::not_found(format!("process {}", process)))?;

        // Publishing inserts the record before it takes the on-demand lock to
        // drain the pending entry, so a record seen here is final.
        if self.inner.abilities.contains(id) {
            debug!("Ability {} is already published", id);
            return Ok(None);
        }

        let start = ondemand.with(|state| {
            let pending = state.pending.entry(id).or_insert_with(PendingLoad::new);
            if pending.state == PendingState::Init {
                pending.state = PendingState::Starting;
                true
            } else {
                false
            }
        });
        if !start {
            debug!("Ability {} is already starting", id);
            return Ok(None);
        }
        Ok(Some(Directive::StartAbility {
            process: remote,
            id,
        }))
    }

    /// Asks the hosting process of `id` to start it.
    ///
    /// Requires on-demand info for `id` and a registered hosting process.
    /// A second call while the start is in flight does nothing.
    pub async fn start_on_demand_ability(&self, id: AbilityId) -> Result<()> {
        let directive = self.start_on_demand_locked(id)?;
        self.dispatch(directive).await;
        Ok(())
    }

    /// Lookup that starts an on-demand ability when it is absent.
    ///
    /// Returns the handle if published. Otherwise the flag tells whether the
    /// ability is on its way: a start is in flight or could be triggered.
    pub async fn check_system_ability_immediate(
        &self,
        id: AbilityId,
        calling_pid: i32,
    ) -> (Option<RemoteHandle>, bool) {
        if let Some(handle) = self.check_system_ability(id, calling_pid) {
            return (Some(handle), true);
        }

        let state = self
            .inner
            .ondemand
            .with(|state| state.pending.get(&id).map(|p| p.state));
        if matches!(state, Some(PendingState::Starting | PendingState::Started)) {
            return (None, true);
        }

        match self.start_on_demand_ability(id).await {
            Ok(()) => (None, true),
            Err(e) => {
                debug!("Ability {} cannot be started on demand: {}", id, e);
                (None, false)
            }
        }
    }

    /// Registers `process` as the host that starts `id` on demand.
    ///
    /// The process must already be registered. A load waiting for `id` is
    /// started right away.
    pub async fn add_on_demand_system_ability_info(
        &self,
        id: AbilityId,
        process: &str,
    ) -> Result<()> {
        validate_process_name(process)?;
        if !self.inner.processes.contains(process) {
            return Err(Error::not_found(format!("process {}", process)));
        }
        let directive = self.record_on_demand_info(id, process)?;
        self.dispatch(directive).await;
        Ok(())
    }

    fn record_on_demand_info(&self, id: AbilityId, process: &str) -> Result<Option<Directive>> {
        let ondemand = &self.inner.ondemand;
        let _guard = ondemand.hold();

        let capacity = self.inner.config.max_services;
        let waiting = ondemand.with(|state| -> Result<bool> {
            if !state.on_demand.contains_key(&id) && state.on_demand.len() >= capacity {
                return Err(Error::permission_denied(format!(
                    "on-demand map is full ({} entries)",
                    capacity
                )));
            }
            state.on_demand.insert(id, process.to_string());
            Ok(state.pending.contains_key(&id))
        })?;
        debug!("On-demand info: ability {} hosted by {}", id, process);

        if !waiting {
            return Ok(None);
        }
        match self.start_on_demand_locked(id) {
            Ok(directive) => Ok(directive),
            Err(e) => {
                warn!("Could not start waiting ability {}: {}", id, e);
                Ok(None)
            }
        }
    }

    /// Carries out a directive outside every lock.
    pub(super) async fn dispatch(&self, directive: Option<Directive>) {
        let Some(directive) = directive else {
            return;
        };
        match directive {
            Directive::StartAbility { process, id } => {
                let proxy = LocalAbilityManagerProxy::new(process, self.inner.pid);
                match proxy.start_ability(id).await {
                    Ok(()) => {
                        info!("Start directive sent for ability {}", id);
                        self.advance_pending(id, PendingState::Starting, PendingState::Started);
                    }
                    Err(e) => {
                        warn!("Start directive for ability {} failed: {}", id, e);
                        self.advance_pending(id, PendingState::Starting, PendingState::Init);
                    }
                }
            }
            Directive::LaunchProcess { process, id } => {
                info!("Launching process {} for ability {}", process, id);
                if let Err(e) = self.inner.launcher.launch(&process, id).await {
                    // Waiting loads fail through their own timers.
                    warn!("Failed to launch process {}: {}", process, e);
                    self.inner
                        .ondemand
                        .with(|state| state.starting_processes.remove(&process));
                }
            }
        }
    }

    fn advance_pending(&self, id: AbilityId, from: PendingState, to: PendingState) {
        self.inner.ondemand.with(|state| {
            if let Some(pending) = state.pending.get_mut(&id) {
                if pending.state == from {
                    pending.state = to;
                }
            }
        });
    }

    /// Loads every on-demand ability once `ondemand_perf_delay` has passed.
    pub(super) fn spawn_preload(&self) {
        let weak = self.downgrade();
        let cancel = self.inner.cancel.clone();
        let delay = self.inner.config.ondemand_perf_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(manager) = SystemAbilityManager::upgrade(&weak) else {
                return;
            };
            manager.preload_on_demand_abilities().await;
        });
    }

    /// Issues a load for every profile that is not run-on-create.
    pub async fn preload_on_demand_abilities(&self) {
        let ids: Vec<AbilityId> = self.inner.profiles.read().on_demand().map(|p| p.id).collect();
        info!("Preloading {} on-demand abilities", ids.len());

        let callback = LoadCallbackStub::into_handle(Arc::new(PreloadCallback), self.inner.pid);
        for id in ids {
            if let Err(e) = self
                .load_system_ability(id, callback.clone(), self.inner.pid)
                .await
            {
                warn!("Preload of ability {} failed: {}", id, e);
            }
        }
    }
}

/// Logs preload outcomes.
struct PreloadCallback;

#[async_trait]
impl SystemAbilityLoadCallback for PreloadCallback {
    async fn on_load_system_ability_success(&self, id: AbilityId, handle: RemoteHandle) {
        info!("Preloaded ability {} (pid {})", id, handle.owner_pid());
    }

    async fn on_load_system_ability_fail(&self, id: AbilityId) {
        warn!("Preload of ability {} did not complete", id);
    }
}
