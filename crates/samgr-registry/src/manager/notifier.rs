//! Serial delivery of listener notifications and load outcomes.
//!
//! Everything the registry tells its clients goes through one queue drained
//! by one task, so notifications for an id arrive in the order they were
//! queued. A delivery that fails or exceeds the timeout is logged and
//! dropped; registry state is never rolled back.

use crate::interfaces::{LoadCallbackProxy, StatusListenerProxy};
use samgr_common::{AbilityId, Result};
use samgr_ipc::RemoteHandle;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Listener notifications carry an empty device id for local abilities.
const LOCAL_NOTIFY_DEVICE: &str = "";

#[derive(Debug)]
pub(super) enum Notification {
    Added {
        id: AbilityId,
        listeners: Vec<RemoteHandle>,
    },
    Removed {
        id: AbilityId,
        listeners: Vec<RemoteHandle>,
    },
    LoadSucceeded {
        id: AbilityId,
        handle: RemoteHandle,
        callbacks: Vec<RemoteHandle>,
    },
    LoadFailed {
        id: AbilityId,
        callbacks: Vec<RemoteHandle>,
    },
}

pub(super) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub(super) fn spawn(timeout: Duration, pid: i32, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(rx, timeout, pid, cancel));
        Self { tx }
    }

    pub(super) fn send(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            debug!("notifier stopped, dropping {:?}", e.0);
        }
    }

    async fn run(
        mut rx: mpsc::UnboundedReceiver<Notification>,
        timeout: Duration,
        pid: i32,
        cancel: CancellationToken,
    ) {
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(notification) => notification,
                    None => break,
                },
            };
            Self::deliver(notification, timeout, pid).await;
        }
        debug!("notifier stopped");
    }

    async fn deliver(notification: Notification, timeout: Duration, pid: i32) {
        trace!("delivering {:?}", notification);
        match notification {
            Notification::Added { id, listeners } => {
                for listener in listeners {
                    let proxy = StatusListenerProxy::new(listener, pid);
                    bounded(
                        timeout,
                        "on_add_system_ability",
                        id,
                        proxy.on_add_system_ability(id, LOCAL_NOTIFY_DEVICE),
                    )
                    .await;
                }
            }
            Notification::Removed { id, listeners } => {
                for listener in listeners {
                    let proxy = StatusListenerProxy::new(listener, pid);
                    bounded(
                        timeout,
                        "on_remove_system_ability",
                        id,
                        proxy.on_remove_system_ability(id, LOCAL_NOTIFY_DEVICE),
                    )
                    .await;
                }
            }
            Notification::LoadSucceeded {
                id,
                handle,
                callbacks,
            } => {
                for callback in callbacks {
                    let proxy = LoadCallbackProxy::new(callback, pid);
                    bounded(
                        timeout,
                        "on_load_system_ability_success",
                        id,
                        proxy.on_load_system_ability_success(id, &handle),
                    )
                    .await;
                }
            }
            Notification::LoadFailed { id, callbacks } => {
                for callback in callbacks {
                    let proxy = LoadCallbackProxy::new(callback, pid);
                    bounded(
                        timeout,
                        "on_load_system_ability_fail",
                        id,
                        proxy.on_load_system_ability_fail(id),
                    )
                    .await;
                }
            }
        }
    }
}

/// Runs one delivery under `timeout`, logging instead of failing.
pub(super) async fn bounded<F>(timeout: Duration, what: &str, id: AbilityId, delivery: F)
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(timeout, delivery).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} for ability {} failed: {}", what, id, e),
        Err(_) => warn!("{} for ability {} timed out after {:?}", what, id, timeout),
    }
}
