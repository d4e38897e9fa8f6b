//! Server side of the per-process manager interface.

use crate::manager::LocalAbilityManager;
use async_trait::async_trait;
use samgr_common::errors::codes;
use samgr_common::Result;
use samgr_ipc::codes::{enforce_interface, LOCAL_MANAGER_INTERFACE_TOKEN};
use samgr_ipc::{CallContext, LocalManagerCode, Parcel, RemoteHandle, RemoteObject};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Answers START_ABILITY from the registry.
///
/// Holds the manager weakly; the manager owns the handle to this stub.
pub struct LocalAbilityManagerStub {
    manager: Weak<LocalAbilityManager>,
}

impl LocalAbilityManagerStub {
    pub fn new(manager: Weak<LocalAbilityManager>) -> Self {
        Self { manager }
    }

    pub fn into_handle(manager: Weak<LocalAbilityManager>, pid: i32) -> RemoteHandle {
        RemoteHandle::new(Arc::new(Self::new(manager)), pid)
    }

    fn start_ability(&self, data: &mut Parcel) -> Result<()> {
        let id = data.read_ability_id()?;
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| samgr_common::Error::transport("local ability manager is gone"))?;
        manager.start_on_demand(id)
    }
}

#[async_trait]
impl RemoteObject for LocalAbilityManagerStub {
    fn descriptor(&self) -> &str {
        LOCAL_MANAGER_INTERFACE_TOKEN
    }

    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        ctx: CallContext,
    ) -> i32 {
        if !enforce_interface(data, LOCAL_MANAGER_INTERFACE_TOKEN) {
            warn!("local manager: interface token mismatch from pid {}", ctx.calling_pid);
            return codes::ERR_PERMISSION_DENIED;
        }
        match LocalManagerCode::try_from(code) {
            Ok(LocalManagerCode::StartAbility) => match self.start_ability(data) {
                Ok(()) => codes::ERR_OK,
                Err(e) => {
                    warn!("local manager: start directive rejected: {}", e);
                    e.code()
                }
            },
            Err(code) => {
                warn!("local manager: unknown code {} from pid {}", code, ctx.calling_pid);
                codes::ERR_UNKNOWN_TRANSACTION
            }
        }
    }
}
