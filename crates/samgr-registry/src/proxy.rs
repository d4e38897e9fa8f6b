//! Client side of the registry interface.

use crate::client::SamgrClient;
use crate::types::SaExtraProp;
use async_trait::async_trait;
use samgr_common::errors::check_code;
use samgr_common::{AbilityId, Result};
use samgr_ipc::codes::SAMGR_INTERFACE_TOKEN;
use samgr_ipc::{CallContext, MessageOption, Parcel, RemoteHandle, SamgrCode};

/// Marshals registry calls over a [`RemoteHandle`] to the registry stub.
#[derive(Debug, Clone)]
pub struct SystemAbilityManagerProxy {
    remote: RemoteHandle,
    ctx: CallContext,
}

impl SystemAbilityManagerProxy {
    /// `calling_pid` is the identity the registry sees for every call.
    pub fn new(remote: RemoteHandle, calling_pid: i32) -> Self {
        Self {
            remote,
            ctx: CallContext::new(calling_pid),
        }
    }

    pub fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    pub fn calling_pid(&self) -> i32 {
        self.ctx.calling_pid
    }

    fn request() -> Parcel {
        let mut data = Parcel::new();
        data.write_interface_token(SAMGR_INTERFACE_TOKEN);
        data
    }

    async fn call(&self, code: SamgrCode, data: Parcel) -> Result<Parcel> {
        self.remote
            .transact(code.code(), data, MessageOption::Sync, self.ctx)
            .await
    }

    /// Sends a request whose reply is a single result code.
    async fn call_for_code(&self, code: SamgrCode, data: Parcel) -> Result<()> {
        let mut reply = self.call(code, data).await?;
        check_code(reply.read_i32()?)
    }
}

#[async_trait]
impl SamgrClient for SystemAbilityManagerProxy {
    async fn check_system_ability(&self, id: AbilityId) -> Result<Option<RemoteHandle>> {
        let mut data = Self::request();
        data.write_ability_id(id);
        let mut reply = self.call(SamgrCode::Check, data).await?;
        reply.read_remote_object()
    }

    async fn check_system_ability_immediate(
        &self,
        id: AbilityId,
    ) -> Result<(Option<RemoteHandle>, bool)> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_bool(false);
        let mut reply = self.call(SamgrCode::CheckImmediate, data).await?;
        let handle = reply.read_remote_object()?;
        let is_exist = reply.read_bool()?;
        Ok((handle, is_exist))
    }

    async fn check_remote_system_ability(
        &self,
        id: AbilityId,
        device_id: &str,
    ) -> Result<Option<RemoteHandle>> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_string(device_id);
        let mut reply = self.call(SamgrCode::CheckRemote, data).await?;
        reply.read_remote_object()
    }

    async fn add_system_ability(
        &self,
        id: AbilityId,
        handle: &RemoteHandle,
        extra: SaExtraProp,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_remote_object(Some(handle));
        data.write_bool(extra.is_distributed);
        data.write_i32(extra.dump_flags);
        data.write_string(&extra.capability);
        data.write_string(&extra.permission);
        self.call_for_code(SamgrCode::Add, data).await
    }

    async fn remove_system_ability(&self, id: AbilityId) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        self.call_for_code(SamgrCode::Remove, data).await
    }

    async fn list_system_abilities(&self, dump_flags: i32) -> Result<Vec<String>> {
        let mut data = Self::request();
        data.write_i32(dump_flags);
        let mut reply = self.call(SamgrCode::List, data).await?;
        check_code(reply.read_i32()?)?;
        reply.read_string_vec()
    }

    async fn subscribe_system_ability(&self, id: AbilityId, listener: &RemoteHandle) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_remote_object(Some(listener));
        self.call_for_code(SamgrCode::Subscribe, data).await
    }

    async fn unsubscribe_system_ability(
        &self,
        id: AbilityId,
        listener: &RemoteHandle,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_remote_object(Some(listener));
        self.call_for_code(SamgrCode::Unsubscribe, data).await
    }

    async fn load_system_ability(&self, id: AbilityId, callback: &RemoteHandle) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_remote_object(Some(callback));
        self.call_for_code(SamgrCode::Load, data).await
    }

    async fn load_system_ability_remote(
        &self,
        id: AbilityId,
        device_id: &str,
        callback: &RemoteHandle,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_string(device_id);
        data.write_remote_object(Some(callback));
        self.call_for_code(SamgrCode::LoadRemote, data).await
    }

    async fn add_on_demand_system_ability_info(
        &self,
        id: AbilityId,
        process: &str,
    ) -> Result<()> {
        let mut data = Self::request();
        data.write_ability_id(id);
        data.write_string(process);
        self.call_for_code(SamgrCode::AddOnDemandInfo, data).await
    }

    async fn add_system_process(&self, process: &str, handle: &RemoteHandle) -> Result<()> {
        let mut data = Self::request();
        data.write_string(process);
        data.write_remote_object(Some(handle));
        self.call_for_code(SamgrCode::AddProcess, data).await
    }
}
