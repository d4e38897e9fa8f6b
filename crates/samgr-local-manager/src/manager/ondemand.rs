//! Start directives from the registry.

use super::LocalAbilityManager;
use samgr_ability::{SystemAbility, SystemAbilityExt};
use samgr_common::{AbilityId, Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl LocalAbilityManager {
    /// Queues the start of `id` on the on-demand pool and returns.
    ///
    /// A directive for an id that is already being started, or is already
    /// running, does nothing.
    pub fn start_on_demand(&self, id: AbilityId) -> Result<()> {
        info!("Received start directive for ability {}", id);
        if !self.starting.lock().insert(id) {
            debug!("Ability {} is already starting", id);
            return Ok(());
        }

        let Some(manager) = self.self_ref.upgrade() else {
            self.starting.lock().remove(&id);
            return Err(Error::transport("local ability manager is shutting down"));
        };
        let submitted = self.ondemand_pool.submit(async move {
            manager.start_on_demand_task(id).await;
            manager.starting.lock().remove(&id);
        });
        if let Err(e) = submitted {
            warn!("Start of ability {} not queued: {}", id, e);
            self.starting.lock().remove(&id);
            return Err(e);
        }
        Ok(())
    }

    async fn start_on_demand_task(&self, id: AbilityId) {
        if self.profile(id).is_none() {
            warn!("No profile for on-demand ability {}", id);
            return;
        }
        match self.load_module(id) {
            Ok(true) => debug!("Loaded module for on-demand ability {}", id),
            Ok(false) => {}
            // The ability may have been added directly.
            Err(e) if e.is_not_found() => debug!("No module for ability {}: {}", id, e),
            Err(e) => {
                warn!("Module for ability {} failed to load: {}", id, e);
                return;
            }
        }

        let Some(ability) = self.wait_for_local_ability(id).await else {
            warn!(
                "Ability {} did not register within {} attempts",
                id, self.config.ondemand_retry_times
            );
            return;
        };
        if ability.base().is_running() {
            debug!("Ability {} is already running", id);
            return;
        }
        if let Err(e) = ability.start().await {
            warn!("On-demand start of ability {} failed: {}", id, e);
        }
    }

    async fn wait_for_local_ability(&self, id: AbilityId) -> Option<Arc<dyn SystemAbility>> {
        let mut attempts = 0;
        loop {
            if let Some(ability) = self.get_ability(id) {
                return Some(ability);
            }
            if attempts >= self.config.ondemand_retry_times {
                return None;
            }
            attempts += 1;
            debug!("Waiting for ability {} ({})", id, attempts);
            tokio::time::sleep(self.config.ondemand_retry_interval).await;
        }
    }

    /// Whether a start directive for `id` is being worked on.
    pub fn is_starting(&self, id: AbilityId) -> bool {
        self.starting.lock().contains(&id)
    }
}
