//! The registry as seen by its clients.

use crate::types::SaExtraProp;
use async_trait::async_trait;
use samgr_common::{AbilityId, Result};
use samgr_ipc::RemoteHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts made by [`SamgrClient::get_system_ability`] once a start is
/// under way.
pub const GET_RETRY_TIMES: u32 = 10;

/// Delay between those attempts.
pub const GET_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Registry operations available to other processes.
///
/// Implemented by [`SystemAbilityManagerProxy`](crate::SystemAbilityManagerProxy);
/// abilities and per-process managers hold it as `Arc<dyn SamgrClient>`.
#[async_trait]
pub trait SamgrClient: Send + Sync {
    /// Non-blocking lookup.
    async fn check_system_ability(&self, id: AbilityId) -> Result<Option<RemoteHandle>>;

    /// Lookup that also starts an on-demand ability. The flag reports whether
    /// the ability exists or is being started.
    async fn check_system_ability_immediate(
        &self,
        id: AbilityId,
    ) -> Result<(Option<RemoteHandle>, bool)>;

    async fn check_remote_system_ability(
        &self,
        id: AbilityId,
        device_id: &str,
    ) -> Result<Option<RemoteHandle>>;

    async fn add_system_ability(
        &self,
        id: AbilityId,
        handle: &RemoteHandle,
        extra: SaExtraProp,
    ) -> Result<()>;

    async fn remove_system_ability(&self, id: AbilityId) -> Result<()>;

    async fn list_system_abilities(&self, dump_flags: i32) -> Result<Vec<String>>;

    async fn subscribe_system_ability(&self, id: AbilityId, listener: &RemoteHandle) -> Result<()>;

    async fn unsubscribe_system_ability(
        &self,
        id: AbilityId,
        listener: &RemoteHandle,
    ) -> Result<()>;

    async fn load_system_ability(&self, id: AbilityId, callback: &RemoteHandle) -> Result<()>;

    async fn load_system_ability_remote(
        &self,
        id: AbilityId,
        device_id: &str,
        callback: &RemoteHandle,
    ) -> Result<()>;

    async fn add_on_demand_system_ability_info(&self, id: AbilityId, process: &str)
        -> Result<()>;

    async fn add_system_process(&self, process: &str, handle: &RemoteHandle) -> Result<()>;

    /// Blocking get: starts the ability if needed and polls for it.
    ///
    /// Returns `None` straight away when the ability neither exists nor can
    /// be started, and after [`GET_RETRY_TIMES`] polls otherwise.
    async fn get_system_ability(&self, id: AbilityId) -> Option<RemoteHandle> {
        match self.check_system_ability_immediate(id).await {
            Ok((Some(handle), _)) => return Some(handle),
            Ok((None, false)) => {
                debug!("ability {} is neither present nor startable", id);
                return None;
            }
            Ok((None, true)) => {}
            Err(e) => {
                warn!("check immediate for ability {} failed: {}", id, e);
                return None;
            }
        }

        for _ in 0..GET_RETRY_TIMES {
            tokio::time::sleep(GET_RETRY_INTERVAL).await;
            match self.check_system_ability(id).await {
                Ok(Some(handle)) => return Some(handle),
                Ok(None) => {}
                Err(e) => debug!("check for ability {} failed: {}", id, e),
            }
        }
        warn!("ability {} did not appear after {} attempts", id, GET_RETRY_TIMES);
        None
    }
}
