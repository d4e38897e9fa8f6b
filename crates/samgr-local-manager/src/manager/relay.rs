//! Listener relay.
//!
//! Local abilities do not subscribe to the registry themselves. The manager
//! subscribes once per target with its own listener and fans each
//! notification out to the local abilities registered for that target.

use super::LocalAbilityManager;
use async_trait::async_trait;
use samgr_ability::AbilityHost;
use samgr_common::{AbilityId, Result};
use samgr_registry::SystemAbilityStatusListener;
use std::sync::Weak;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusChange {
    Added,
    Removed,
}

/// The listener the manager registers with the registry.
pub(super) struct RelayListener {
    manager: Weak<LocalAbilityManager>,
}

impl RelayListener {
    pub(super) fn new(manager: Weak<LocalAbilityManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl SystemAbilityStatusListener for RelayListener {
    async fn on_add_system_ability(&self, id: AbilityId, device_id: &str) {
        if let Some(manager) = self.manager.upgrade() {
            manager
                .notify_listeners(id, device_id, StatusChange::Added)
                .await;
        }
    }

    async fn on_remove_system_ability(&self, id: AbilityId, device_id: &str) {
        if let Some(manager) = self.manager.upgrade() {
            manager
                .notify_listeners(id, device_id, StatusChange::Removed)
                .await;
        }
    }
}

impl LocalAbilityManager {
    /// Registers local ability `listener` for changes of `target`.
    ///
    /// The first local listener of a target subscribes this process with the
    /// registry, which reports an already published target right away. A
    /// later listener is told directly when the target is already there.
    pub async fn add_system_ability_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
    ) -> Result<()> {
        let first = {
            let mut relay = self.relay.lock();
            let listeners = relay.entry(target).or_default();
            if !listeners.contains(&listener) {
                listeners.push(listener);
            }
            info!(
                "Ability {} listens for {} ({} local listeners)",
                listener,
                target,
                listeners.len()
            );
            listeners.len() == 1
        };

        if !first {
            if let Ok(Some(_)) = self.samgr.check_system_ability(target).await {
                self.notify_listener(target, listener, "", StatusChange::Added)
                    .await;
            }
            return Ok(());
        }

        if let Err(e) = self
            .samgr
            .subscribe_system_ability(target, &self.relay_handle)
            .await
        {
            warn!("Failed to subscribe to ability {}: {}", target, e);
            let mut relay = self.relay.lock();
            if let Some(listeners) = relay.get_mut(&target) {
                listeners.retain(|l| *l != listener);
                if listeners.is_empty() {
                    relay.remove(&target);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Drops `listener` from `target`. The last one out unsubscribes.
    pub async fn remove_system_ability_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
    ) -> Result<()> {
        {
            let mut relay = self.relay.lock();
            let Some(listeners) = relay.get_mut(&target) else {
                return Ok(());
            };
            listeners.retain(|l| *l != listener);
            debug!(
                "Ability {} stopped listening for {} ({} left)",
                listener,
                target,
                listeners.len()
            );
            if !listeners.is_empty() {
                return Ok(());
            }
            relay.remove(&target);
        }

        self.samgr
            .unsubscribe_system_ability(target, &self.relay_handle)
            .await
            .map_err(|e| {
                warn!("Failed to unsubscribe from ability {}: {}", target, e);
                e
            })
    }

    /// Local listener ids registered for `target`.
    pub fn listeners_of(&self, target: AbilityId) -> Vec<AbilityId> {
        self.relay.lock().get(&target).cloned().unwrap_or_default()
    }

    async fn notify_listeners(&self, target: AbilityId, device_id: &str, change: StatusChange) {
        let listeners = self.listeners_of(target);
        debug!(
            "Ability {} {:?}, {} local listeners",
            target,
            change,
            listeners.len()
        );
        for listener in listeners {
            self.notify_listener(target, listener, device_id, change)
                .await;
        }
    }

    async fn notify_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
        device_id: &str,
        change: StatusChange,
    ) {
        let Some(ability) = self.get_ability(listener) else {
            warn!("Listener ability {} is not hosted here", listener);
            return;
        };
        match change {
            StatusChange::Added => ability.on_add_system_ability(target, device_id).await,
            StatusChange::Removed => ability.on_remove_system_ability(target, device_id).await,
        }
    }
}

#[async_trait]
impl AbilityHost for LocalAbilityManager {
    async fn add_system_ability_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
    ) -> Result<()> {
        LocalAbilityManager::add_system_ability_listener(self, target, listener).await
    }

    async fn remove_system_ability_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
    ) -> Result<()> {
        LocalAbilityManager::remove_system_ability_listener(self, target, listener).await
    }
}
