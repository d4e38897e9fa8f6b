//! Server side of the registry interface.
//!
//! Every request starts with the interface token, checked before any
//! argument is read. Requests that cannot be read (bad token, out-of-range
//! id, short parcel, missing handle) are rejected with a transport status;
//! everything else gets a reply, with the operation's own result code where
//! the operation can fail.

use crate::manager::SystemAbilityManager;
use crate::types::SaExtraProp;
use async_trait::async_trait;
use samgr_common::errors::{codes, to_code};
use samgr_common::{Error, Result};
use samgr_ipc::codes::{enforce_interface, SAMGR_INTERFACE_TOKEN};
use samgr_ipc::{CallContext, Parcel, RemoteHandle, RemoteObject, SamgrCode};
use std::sync::Arc;
use tracing::{trace, warn};

pub struct SystemAbilityManagerStub {
    manager: SystemAbilityManager,
}

impl SystemAbilityManagerStub {
    pub fn new(manager: SystemAbilityManager) -> Self {
        Self { manager }
    }

    /// Handle through which other processes reach `manager`.
    pub fn into_handle(manager: SystemAbilityManager) -> RemoteHandle {
        let pid = manager.pid();
        RemoteHandle::new(Arc::new(Self::new(manager)), pid)
    }

    async fn dispatch(
        &self,
        code: SamgrCode,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: CallContext,
    ) -> Result<()> {
        let manager = &self.manager;
        let pid = ctx.calling_pid;

        match code {
            SamgrCode::Get | SamgrCode::Check => {
                let id = data.read_ability_id()?;
                let handle = manager.check_system_ability(id, pid);
                reply.write_remote_object(handle.as_ref());
            }
            SamgrCode::CheckImmediate => {
                let id = data.read_ability_id()?;
                // The caller's flag carries no information.
                let _ = data.read_bool()?;
                let (handle, is_exist) = manager.check_system_ability_immediate(id, pid).await;
                reply.write_remote_object(handle.as_ref());
                reply.write_bool(is_exist);
            }
            SamgrCode::CheckRemote => {
                let id = data.read_ability_id()?;
                let device_id = data.read_string()?;
                let handle = manager.check_remote_system_ability(id, &device_id, pid).await;
                reply.write_remote_object(handle.as_ref());
            }
            SamgrCode::Add => {
                let id = data.read_ability_id()?;
                let handle = read_required_handle(data, "ability")?;
                let extra = SaExtraProp {
                    is_distributed: data.read_bool()?,
                    dump_flags: data.read_i32()?,
                    capability: data.read_string()?,
                    permission: data.read_string()?,
                };
                reply.write_i32(to_code(&manager.add_system_ability(id, handle, extra)));
            }
            SamgrCode::Remove => {
                let id = data.read_ability_id()?;
                reply.write_i32(to_code(&manager.remove_system_ability(id)));
            }
            SamgrCode::List => {
                let dump_flags = data.read_i32()?;
                let ids = manager.list_system_abilities(dump_flags);
                reply.write_i32(codes::ERR_OK);
                reply.write_string_vec(&ids);
            }
            SamgrCode::Subscribe => {
                let id = data.read_ability_id()?;
                let listener = read_required_handle(data, "listener")?;
                reply.write_i32(to_code(&manager.subscribe_system_ability(id, listener, pid)));
            }
            SamgrCode::Unsubscribe => {
                let id = data.read_ability_id()?;
                let listener = read_required_handle(data, "listener")?;
                reply.write_i32(to_code(&manager.unsubscribe_system_ability(id, &listener)));
            }
            SamgrCode::Load => {
                let id = data.read_ability_id()?;
                let callback = read_required_handle(data, "load callback")?;
                let result = manager.load_system_ability(id, callback, pid).await;
                reply.write_i32(to_code(&result));
            }
            SamgrCode::LoadRemote => {
                let id = data.read_ability_id()?;
                let device_id = data.read_string()?;
                let callback = read_required_handle(data, "load callback")?;
                let result = manager.load_system_ability_remote(id, &device_id, callback, pid);
                reply.write_i32(to_code(&result));
            }
            SamgrCode::AddOnDemandInfo => {
                let id = data.read_ability_id()?;
                let process = data.read_string()?;
                let result = manager.add_on_demand_system_ability_info(id, &process).await;
                reply.write_i32(to_code(&result));
            }
            SamgrCode::AddProcess => {
                let process = data.read_string()?;
                let handle = read_required_handle(data, "process")?;
                reply.write_i32(to_code(&manager.add_system_process(&process, handle)));
            }
        }
        Ok(())
    }
}

fn read_required_handle(data: &mut Parcel, what: &str) -> Result<RemoteHandle> {
    data.read_remote_object()?
        .ok_or_else(|| Error::invalid_value(format!("null {} handle", what)))
}

#[async_trait]
impl RemoteObject for SystemAbilityManagerStub {
    fn descriptor(&self) -> &str {
        SAMGR_INTERFACE_TOKEN
    }

    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: CallContext,
    ) -> i32 {
        if !enforce_interface(data, SAMGR_INTERFACE_TOKEN) {
            warn!("samgr: interface token mismatch from pid {}", ctx.calling_pid);
            return codes::ERR_PERMISSION_DENIED;
        }
        let Ok(op) = SamgrCode::try_from(code) else {
            warn!("samgr: unknown code {} from pid {}", code, ctx.calling_pid);
            return codes::ERR_UNKNOWN_TRANSACTION;
        };
        trace!("samgr: {:?} from pid {}", op, ctx.calling_pid);

        match self.dispatch(op, data, reply, ctx).await {
            Ok(()) => codes::ERR_OK,
            Err(e) => {
                warn!("samgr: {:?} from pid {} rejected: {}", op, ctx.calling_pid, e);
                e.code()
            }
        }
    }
}
