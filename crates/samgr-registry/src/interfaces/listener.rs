//! Ability status listener: stub and proxy.

use async_trait::async_trait;
use samgr_common::errors::codes;
use samgr_common::{AbilityId, Result};
use samgr_ipc::codes::{enforce_interface, STATUS_LISTENER_INTERFACE_TOKEN};
use samgr_ipc::{
    CallContext, MessageOption, Parcel, RemoteHandle, RemoteObject, StatusListenerCode,
};
use std::sync::Arc;
use tracing::warn;

/// Receives "ability added" and "ability removed" notifications.
///
/// `device_id` is empty for abilities published on this host.
#[async_trait]
pub trait SystemAbilityStatusListener: Send + Sync {
    async fn on_add_system_ability(&self, id: AbilityId, device_id: &str);

    async fn on_remove_system_ability(&self, id: AbilityId, device_id: &str);
}

/// Server side of a status listener.
pub struct StatusListenerStub {
    listener: Arc<dyn SystemAbilityStatusListener>,
}

impl StatusListenerStub {
    pub fn new(listener: Arc<dyn SystemAbilityStatusListener>) -> Self {
        Self { listener }
    }

    /// Wraps `listener` in a handle served by `owner_pid`.
    pub fn into_handle(listener: Arc<dyn SystemAbilityStatusListener>, owner_pid: i32) -> RemoteHandle {
        RemoteHandle::new(Arc::new(Self::new(listener)), owner_pid)
    }

    async fn dispatch(&self, code: StatusListenerCode, data: &mut Parcel) -> Result<()> {
        let id = data.read_ability_id()?;
        let device_id = data.read_string()?;
        match code {
            StatusListenerCode::OnAdd => self.listener.on_add_system_ability(id, &device_id).await,
            StatusListenerCode::OnRemove => {
                self.listener.on_remove_system_ability(id, &device_id).await
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteObject for StatusListenerStub {
    fn descriptor(&self) -> &str {
        STATUS_LISTENER_INTERFACE_TOKEN
    }

    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        ctx: CallContext,
    ) -> i32 {
        if !enforce_interface(data, STATUS_LISTENER_INTERFACE_TOKEN) {
            warn!("status listener: interface token mismatch from pid {}", ctx.calling_pid);
            return codes::ERR_PERMISSION_DENIED;
        }
        let Ok(code) = StatusListenerCode::try_from(code) else {
            return codes::ERR_UNKNOWN_TRANSACTION;
        };
        match self.dispatch(code, data).await {
            Ok(()) => codes::ERR_OK,
            Err(e) => e.code(),
        }
    }
}

/// Client side of a status listener, used by the registry to deliver
/// notifications.
#[derive(Debug, Clone)]
pub struct StatusListenerProxy {
    remote: RemoteHandle,
    ctx: CallContext,
}

impl StatusListenerProxy {
    pub fn new(remote: RemoteHandle, calling_pid: i32) -> Self {
        Self {
            remote,
            ctx: CallContext::new(calling_pid),
        }
    }

    pub async fn on_add_system_ability(&self, id: AbilityId, device_id: &str) -> Result<()> {
        self.send(StatusListenerCode::OnAdd, id, device_id).await
    }

    pub async fn on_remove_system_ability(&self, id: AbilityId, device_id: &str) -> Result<()> {
        self.send(StatusListenerCode::OnRemove, id, device_id).await
    }

    async fn send(&self, code: StatusListenerCode, id: AbilityId, device_id: &str) -> Result<()> {
        let mut data = Parcel::new();
        data.write_interface_token(STATUS_LISTENER_INTERFACE_TOKEN);
        data.write_ability_id(id);
        data.write_string(device_id);
        self.remote
            .transact(code.code(), data, MessageOption::Sync, self.ctx)
            .await?;
        Ok(())
    }
}
