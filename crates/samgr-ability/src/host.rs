//! The seam between an ability and the manager hosting it.

use async_trait::async_trait;
use samgr_common::{AbilityId, Result};

/// Implemented by the per-process manager so abilities can ask to hear
/// about peers without talking to the registry themselves.
#[async_trait]
pub trait AbilityHost: Send + Sync {
    /// Tells `listener` (an ability hosted here) when `target` is published
    /// or withdrawn.
    async fn add_system_ability_listener(&self, target: AbilityId, listener: AbilityId)
        -> Result<()>;

    async fn remove_system_ability_listener(
        &self,
        target: AbilityId,
        listener: AbilityId,
    ) -> Result<()>;
}
