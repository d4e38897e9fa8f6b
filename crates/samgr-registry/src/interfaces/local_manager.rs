//! Client side of the per-process manager's start directive.

use samgr_common::{AbilityId, Result};
use samgr_ipc::codes::LOCAL_MANAGER_INTERFACE_TOKEN;
use samgr_ipc::{CallContext, LocalManagerCode, MessageOption, Parcel, RemoteHandle};

/// Sends START_ABILITY to a registered hosting process.
#[derive(Debug, Clone)]
pub struct LocalAbilityManagerProxy {
    remote: RemoteHandle,
    ctx: CallContext,
}

impl LocalAbilityManagerProxy {
    pub fn new(remote: RemoteHandle, calling_pid: i32) -> Self {
        Self {
            remote,
            ctx: CallContext::new(calling_pid),
        }
    }

    /// One-way: returns once the directive is handed to the transport.
    pub async fn start_ability(&self, id: AbilityId) -> Result<()> {
        let mut data = Parcel::new();
        data.write_interface_token(LOCAL_MANAGER_INTERFACE_TOKEN);
        data.write_ability_id(id);
        self.remote
            .transact(
                LocalManagerCode::StartAbility.code(),
                data,
                MessageOption::OneWay,
                self.ctx,
            )
            .await?;
        Ok(())
    }
}
