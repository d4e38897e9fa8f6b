//! The registry context object.
//!
//! [`SystemAbilityManager`] owns every map the registry keeps: published
//! abilities, listener subscriptions, pending loads and on-demand info,
//! hosting processes, cross-device loads and call frequencies. Each map sits
//! behind its own lock and is only touched from synchronous code; anything
//! that has to leave the registry (start directives, process launches,
//! listener and callback deliveries) is computed under the lock and sent
//! after it is released.
//!
//! Lock order where two locks nest:
//! - listeners → abilities (publish and withdraw, so a concurrent subscribe
//!   sees exactly one "added"),
//! - on-demand → abilities (read) and on-demand → processes.
//!
//! The on-demand lock is re-entrant: the load path holds it while it calls
//! into the on-demand trigger, which takes it again.

mod abilities;
mod death;
mod distributed;
mod frequency;
mod listeners;
mod notifier;
mod ondemand;
mod processes;


use crate::bridge::{DistributedBridge, ProcessLauncher};
use crate::config::RegistryConfig;
use crate::types::{PendingSummary, RegistrySnapshot};
use abilities::AbilityTable;
use death::{WatchKind, Watchers};
use distributed::RemoteLoadTable;
use frequency::FrequencyCounter;
use listeners::ListenerTable;
use notifier::Notifier;
use ondemand::OnDemandTable;
use parking_lot::RwLock;
use processes::ProcessTable;
use samgr_common::{AbilityId, Error, Result, TaskPool};
use samgr_ipc::{RemoteHandle, WatchId};
use samgr_profile::{ProfileSet, SaProfile};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The system ability registry.
///
/// Cloning is cheap and every clone refers to the same registry. Background
/// tasks stop when [`shutdown`](Self::shutdown) is called or the last clone
/// is dropped.
#[derive(Clone)]
pub struct SystemAbilityManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: RegistryConfig,
    profiles: RwLock<ProfileSet>,
    abilities: AbilityTable,
    listeners: ListenerTable,
    ondemand: OnDemandTable,
    processes: ProcessTable,
    remote_loads: RemoteLoadTable,
    frequency: FrequencyCounter,
    bridge: RwLock<Option<Arc<dyn DistributedBridge>>>,
    launcher: Arc<dyn ProcessLauncher>,
    notifier: Notifier,
    load_pool: TaskPool,
    watchers: Watchers,
    cancel: CancellationToken,
    pid: i32,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SystemAbilityManager {
    /// Creates the registry and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: RegistryConfig,
        profiles: ProfileSet,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let pid = std::process::id() as i32;
        let notifier = Notifier::spawn(config.notify_timeout, pid, cancel.child_token());
        let load_pool = TaskPool::new(
            "samgr-load",
            config.load_pool_size,
            config.pool_queue_capacity,
        );

        info!(
            "Creating system ability manager: {} profiles, max {} services",
            profiles.len(),
            config.max_services
        );

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            profiles: RwLock::new(profiles),
            abilities: AbilityTable::new(config.max_services),
            listeners: ListenerTable::new(config.max_subscribe_count),
            ondemand: OnDemandTable::new(),
            processes: ProcessTable::default(),
            remote_loads: RemoteLoadTable::default(),
            frequency: FrequencyCounter::default(),
            bridge: RwLock::new(None),
            launcher,
            notifier,
            load_pool,
            watchers: Watchers::new(weak),
            cancel,
            pid,
            config,
        });

        let manager = Self { inner };
        manager.spawn_frequency_reporter();
        if manager.inner.config.preload_on_demand {
            manager.spawn_preload();
        }
        manager
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// Pid the registry uses as caller identity for its own calls.
    pub fn pid(&self) -> i32 {
        self.inner.pid
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Profile of `id`, if one was loaded.
    pub fn profile(&self, id: AbilityId) -> Option<SaProfile> {
        self.inner.profiles.read().get(id).cloned()
    }

    /// Adds profiles discovered after startup.
    pub fn add_profiles(&self, profiles: impl IntoIterator<Item = SaProfile>) -> anyhow::Result<()> {
        let mut current = self.inner.profiles.write();
        for profile in profiles {
            current.insert(profile)?;
        }
        Ok(())
    }

    pub fn set_distributed_bridge(&self, bridge: Arc<dyn DistributedBridge>) {
        *self.inner.bridge.write() = Some(bridge);
        info!("Distributed bridge installed");
    }

    fn bridge(&self) -> Option<Arc<dyn DistributedBridge>> {
        self.inner.bridge.read().clone()
    }

    /// Installs the liveness watch for `kind` on `handle`.
    fn watch(&self, handle: &RemoteHandle, kind: WatchKind) -> Result<WatchId> {
        handle
            .add_death_recipient(self.inner.watchers.recipient(kind))
            .ok_or_else(|| {
                Error::transport(format!("{} handle {} is already dead", kind, handle.token()))
            })
    }

    /// Point-in-time view of the registry's maps.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let (pending, starting_processes) = self.inner.ondemand.with(|state| {
            let mut pending: Vec<PendingSummary> = state
                .pending
                .iter()
                .map(|(id, load)| PendingSummary {
                    id: *id,
                    state: load.state,
                    callbacks: load.callback_count(),
                })
                .collect();
            pending.sort_by_key(|p| p.id);
            let mut starting: Vec<String> = state.starting_processes.keys().cloned().collect();
            starting.sort();
            (pending, starting)
        });

        RegistrySnapshot {
            abilities: self.inner.abilities.ids(),
            pending,
            processes: self.inner.processes.names(),
            starting_processes,
            subscriptions: self.inner.listeners.len(),
            remote_loads: self.inner.remote_loads.len(),
        }
    }

    /// Stops background tasks. Registry maps stay readable.
    pub fn shutdown(&self) {
        info!("Shutting down system ability manager");
        self.inner.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

/// Decrements a per-pid counter, dropping it at zero.
fn release_count(counts: &mut HashMap<i32, usize>, pid: i32) {
    if let Some(count) = counts.get_mut(&pid) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(&pid);
        }
    } else {
        debug!("no outstanding count for pid {}", pid);
    }
}
