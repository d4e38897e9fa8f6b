//! Load callback: stub and proxy.

use async_trait::async_trait;
use samgr_common::errors::codes;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::codes::{enforce_interface, LOAD_CALLBACK_INTERFACE_TOKEN};
use samgr_ipc::{CallContext, LoadCallbackCode, MessageOption, Parcel, RemoteHandle, RemoteObject};
use std::sync::Arc;
use tracing::warn;

/// Receives the outcome of a load request.
///
/// A local load gets exactly one of `on_load_system_ability_success` or
/// `on_load_system_ability_fail`. A cross-device load gets
/// `on_load_system_ability_complete_for_remote`, with `None` when the peer
/// could not provide the ability.
#[async_trait]
pub trait SystemAbilityLoadCallback: Send + Sync {
    async fn on_load_system_ability_success(&self, id: AbilityId, handle: RemoteHandle);

    async fn on_load_system_ability_fail(&self, id: AbilityId);

    async fn on_load_system_ability_complete_for_remote(
        &self,
        _device_id: &str,
        _id: AbilityId,
        _handle: Option<RemoteHandle>,
    ) {
    }
}

/// Server side of a load callback.
pub struct LoadCallbackStub {
    callback: Arc<dyn SystemAbilityLoadCallback>,
}

impl LoadCallbackStub {
    pub fn new(callback: Arc<dyn SystemAbilityLoadCallback>) -> Self {
        Self { callback }
    }

    /// Wraps `callback` in a handle served by `owner_pid`.
    pub fn into_handle(callback: Arc<dyn SystemAbilityLoadCallback>, owner_pid: i32) -> RemoteHandle {
        RemoteHandle::new(Arc::new(Self::new(callback)), owner_pid)
    }

    async fn dispatch(&self, code: LoadCallbackCode, data: &mut Parcel) -> Result<()> {
        match code {
            LoadCallbackCode::OnLoadSuccess => {
                let id = data.read_ability_id()?;
                let handle = data
                    .read_remote_object()?
                    .ok_or_else(|| Error::invalid_value("load success without a handle"))?;
                self.callback.on_load_system_ability_success(id, handle).await;
            }
            LoadCallbackCode::OnLoadFail => {
                let id = data.read_ability_id()?;
                self.callback.on_load_system_ability_fail(id).await;
            }
            LoadCallbackCode::OnLoadRemote => {
                let device_id = data.read_string()?;
                let id = data.read_ability_id()?;
                let handle = data.read_remote_object()?;
                self.callback
                    .on_load_system_ability_complete_for_remote(&device_id, id, handle)
                    .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteObject for LoadCallbackStub {
    fn descriptor(&self) -> &str {
        LOAD_CALLBACK_INTERFACE_TOKEN
    }

    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        ctx: CallContext,
    ) -> i32 {
        if !enforce_interface(data, LOAD_CALLBACK_INTERFACE_TOKEN) {
            warn!("load callback: interface token mismatch from pid {}", ctx.calling_pid);
            return codes::ERR_PERMISSION_DENIED;
        }
        let Ok(code) = LoadCallbackCode::try_from(code) else {
            return codes::ERR_UNKNOWN_TRANSACTION;
        };
        match self.dispatch(code, data).await {
            Ok(()) => codes::ERR_OK,
            Err(e) => e.code(),
        }
    }
}

/// Client side of a load callback.
#[derive(Debug, Clone)]
pub struct LoadCallbackProxy {
    remote: RemoteHandle,
    ctx: CallContext,
}

impl LoadCallbackProxy {
    pub fn new(remote: RemoteHandle, calling_pid: i32) -> Self {
        Self {
            remote,
            ctx: CallContext::new(calling_pid),
        }
    }

    pub async fn on_load_system_ability_success(
        &self,
        id: AbilityId,
        handle: &RemoteHandle,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_remote_object(Some(handle));
        self.send(LoadCallbackCode::OnLoadSuccess, data).await
    }

    pub async fn on_load_system_ability_fail(&self, id: AbilityId) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        self.send(LoadCallbackCode::OnLoadFail, data).await
    }

    pub async fn on_load_system_ability_complete_for_remote(
        &self,
        device_id: &str,
        id: AbilityId,
        handle: Option<&RemoteHandle>,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_string(device_id);
        data.write_ability_id(id);
        data.write_remote_object(handle);
        self.send(LoadCallbackCode::OnLoadRemote, data).await
    }

    fn request() -> Parcel {
        let mut data = Parcel::new();
        data.write_interface_token(LOAD_CALLBACK_INTERFACE_TOKEN);
        data
    }

    async fn send(&self, code: LoadCallbackCode, data: Parcel) -> Result<()> {
        self.remote
            .transact(code.code(), data, MessageOption::Sync, self.ctx)
            .await?;
        Ok(())
    }
}
