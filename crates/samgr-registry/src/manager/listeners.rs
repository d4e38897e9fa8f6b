//! Listener subscriptions.

use super::death::WatchKind;
use super::notifier::Notification;
use super::{release_count, SystemAbilityManager};
use parking_lot::Mutex;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::{RemoteHandle, WatchId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

struct ListenerEntry {
    handle: RemoteHandle,
    pid: i32,
    watch: WatchId,
}

#[derive(Default)]
struct ListenerState {
    by_id: HashMap<AbilityId, Vec<ListenerEntry>>,
    counts: HashMap<i32, usize>,
}

/// Subscriptions in subscription order per id, with a per-pid cap.
pub(super) struct ListenerTable {
    max_per_pid: usize,
    state: Mutex<ListenerState>,
}

impl ListenerTable {
    pub(super) fn new(max_per_pid: usize) -> Self {
        Self {
            max_per_pid,
            state: Mutex::new(ListenerState::default()),
        }
    }

    /// Runs `f` with the table locked, then returns the listeners of `id` as
    /// they stand after `f`.
    pub(super) fn snapshot_with<T>(
        &self,
        id: AbilityId,
        f: impl FnOnce() -> T,
    ) -> (T, Vec<RemoteHandle>) {
        let state = self.state.lock();
        let value = f();
        let listeners = state
            .by_id
            .get(&id)
            .map(|entries| entries.iter().map(|e| e.handle.clone()).collect())
            .unwrap_or_default();
        (value, listeners)
    }

    /// Total number of subscriptions.
    pub(super) fn len(&self) -> usize {
        self.state.lock().by_id.values().map(Vec::len).sum()
    }
}

impl SystemAbilityManager {
    /// Subscribes `listener` to changes of `id`.
    ///
    /// Subscribing the same listener twice succeeds without a second entry.
    /// If `id` is already published the listener gets an immediate "added".
    pub fn subscribe_system_ability(
        &self,
        id: AbilityId,
        listener: RemoteHandle,
        calling_pid: i32,
    ) -> Result<()> {
        let published = {
            let mut guard = self.inner.listeners.state.lock();
            let state = &mut *guard;

            let duplicate = state
                .by_id
                .get(&id)
                .map_or(false, |entries| entries.iter().any(|e| e.handle == listener));
            if duplicate {
                debug!("Listener {} already subscribed to {}", listener.token(), id);
                return Ok(());
            }

            let count = state.counts.get(&calling_pid).copied().unwrap_or(0);
            if count >= self.inner.listeners.max_per_pid {
                warn!(
                    "pid {} reached the subscription limit ({})",
                    calling_pid, self.inner.listeners.max_per_pid
                );
                return Err(Error::permission_denied(format!(
                    "pid {} exceeds {} subscriptions",
                    calling_pid, self.inner.listeners.max_per_pid
                )));
            }

            let watch = self.watch(&listener, WatchKind::Listener)?;
            state.by_id.entry(id).or_default().push(ListenerEntry {
                handle: listener.clone(),
                pid: calling_pid,
                watch,
            });
            *state.counts.entry(calling_pid).or_insert(0) += 1;
            self.inner.abilities.contains(id)
        };

        info!("pid {} subscribed {} to ability {}", calling_pid, listener.token(), id);
        if published {
            self.inner.notifier.send(Notification::Added {
                id,
                listeners: vec![listener],
            });
        }
        Ok(())
    }

    /// Removes a subscription. Succeeds whether or not it existed.
    pub fn unsubscribe_system_ability(&self, id: AbilityId, listener: &RemoteHandle) -> Result<()> {
        let mut guard = self.inner.listeners.state.lock();
        let state = &mut *guard;

        if let Some(entries) = state.by_id.get_mut(&id) {
            if let Some(pos) = entries.iter().position(|e| e.handle == *listener) {
                let entry = entries.remove(pos);
                entry.handle.remove_death_recipient(entry.watch);
                release_count(&mut state.counts, entry.pid);
                debug!("Unsubscribed {} from ability {}", listener.token(), id);
            }
            if entries.is_empty() {
                state.by_id.remove(&id);
            }
        }
        Ok(())
    }

    /// Drops every subscription held by a dead listener.
    pub(super) fn remove_dead_listener(&self, listener: &RemoteHandle) {
        let mut guard = self.inner.listeners.state.lock();
        let state = &mut *guard;
        let mut removed = 0;

        for entries in state.by_id.values_mut() {
            entries.retain(|e| {
                if e.handle == *listener {
                    release_count(&mut state.counts, e.pid);
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        state.by_id.retain(|_, entries| !entries.is_empty());

        if removed > 0 {
            info!("Removed {} subscriptions of dead listener {}", removed, listener.token());
        }
    }
}
