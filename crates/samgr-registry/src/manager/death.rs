//! Liveness-watch recipients.
//!
//! One recipient per kind of watched handle. Each holds a weak reference to
//! the registry so a watch registered on a long-lived peer never keeps the
//! registry alive.

use super::{Inner, SystemAbilityManager};
use samgr_ipc::{DeathRecipient, RemoteHandle};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WatchKind {
    Ability,
    Listener,
    LoadCallback,
    RemoteCallback,
    Process,
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchKind::Ability => "ability",
            WatchKind::Listener => "listener",
            WatchKind::LoadCallback => "load callback",
            WatchKind::RemoteCallback => "remote load callback",
            WatchKind::Process => "process",
        };
        f.write_str(s)
    }
}

struct Watcher {
    kind: WatchKind,
    registry: Weak<Inner>,
}

impl DeathRecipient for Watcher {
    fn on_remote_died(&self, handle: &RemoteHandle) {
        let Some(manager) = SystemAbilityManager::upgrade(&self.registry) else {
            debug!("{} {} died after registry shutdown", self.kind, handle.token());
            return;
        };
        info!("{} {} (pid {}) died", self.kind, handle.token(), handle.owner_pid());

        match self.kind {
            WatchKind::Ability => {
                if let Err(e) = manager.remove_system_ability_by_handle(handle) {
                    debug!("dead ability handle {} already removed: {}", handle.token(), e);
                }
            }
            WatchKind::Listener => manager.remove_dead_listener(handle),
            WatchKind::LoadCallback => manager.remove_dead_load_callback(handle),
            WatchKind::RemoteCallback => manager.remove_dead_remote_callback(handle),
            WatchKind::Process => {
                if let Err(e) = manager.remove_system_process(handle) {
                    debug!("dead process handle {} already removed: {}", handle.token(), e);
                }
            }
        }
    }
}

pub(super) struct Watchers {
    ability: Arc<dyn DeathRecipient>,
    listener: Arc<dyn DeathRecipient>,
    load_callback: Arc<dyn DeathRecipient>,
    remote_callback: Arc<dyn DeathRecipient>,
    process: Arc<dyn DeathRecipient>,
}

impl Watchers {
    pub(super) fn new(registry: &Weak<Inner>) -> Self {
        let make = |kind| -> Arc<dyn DeathRecipient> {
            Arc::new(Watcher {
                kind,
                registry: registry.clone(),
            })
        };
        Self {
            ability: make(WatchKind::Ability),
            listener: make(WatchKind::Listener),
            load_callback: make(WatchKind::LoadCallback),
            remote_callback: make(WatchKind::RemoteCallback),
            process: make(WatchKind::Process),
        }
    }

    pub(super) fn recipient(&self, kind: WatchKind) -> Weak<dyn DeathRecipient> {
        let recipient = match kind {
            WatchKind::Ability => &self.ability,
            WatchKind::Listener => &self.listener,
            WatchKind::LoadCallback => &self.load_callback,
            WatchKind::RemoteCallback => &self.remote_callback,
            WatchKind::Process => &self.process,
        };
        Arc::downgrade(recipient)
    }
}
