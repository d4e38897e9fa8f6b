//! # samgr local manager
//!
//! The per-process half of the system ability manager. A hosting process
//! creates one [`LocalAbilityManager`], installs its profiles, registers its
//! module constructors and calls [`run`](LocalAbilityManager::run):
//!
//! ```no_run
//! use samgr_ability::ModuleRegistry;
//! use samgr_local_manager::{LocalAbilityManager, LocalManagerConfig};
//! use samgr_profile::ProfileSet;
//! use samgr_registry::SamgrClient;
//! use std::sync::Arc;
//!
//! # async fn example(samgr: Arc<dyn SamgrClient>, profiles: ProfileSet) -> samgr_common::Result<()> {
//! let modules = Arc::new(ModuleRegistry::new());
//! // modules.register(...) for every ability the process can host
//! let manager = LocalAbilityManager::new(LocalManagerConfig::default(), samgr, modules);
//! manager.init_profiles(&profiles, "media_service")?;
//! manager.run(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod stub;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::LocalManagerConfig;
pub use manager::LocalAbilityManager;
pub use stub::LocalAbilityManagerStub;
