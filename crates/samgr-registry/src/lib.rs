//! # samgr registry
//!
//! The per-machine system ability registry: which ability lives where,
//! who wants to hear about changes, and how an ability that is not running
//! yet gets started.
//!
//! ## Example
//!
//! ```no_run
//! use samgr_registry::{DisabledLauncher, RegistryConfig, SystemAbilityManager};
//! use samgr_registry::SystemAbilityManagerStub;
//! use samgr_profile::ProfileSet;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let manager = SystemAbilityManager::new(
//!     RegistryConfig::default(),
//!     ProfileSet::new(),
//!     Arc::new(DisabledLauncher),
//! );
//! // Other processes reach the registry through this handle.
//! let handle = SystemAbilityManagerStub::into_handle(manager.clone());
//! # let _ = handle;
//! # }
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod interfaces;
pub mod manager;
pub mod proxy;
pub mod stub;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{CommandLauncher, DisabledLauncher, DistributedBridge, ProcessLauncher};
pub use client::SamgrClient;
pub use config::RegistryConfig;
pub use interfaces::{
    LoadCallbackProxy, LoadCallbackStub, LocalAbilityManagerProxy, StatusListenerProxy,
    StatusListenerStub, SystemAbilityLoadCallback, SystemAbilityStatusListener,
};
pub use manager::SystemAbilityManager;
pub use proxy::SystemAbilityManagerProxy;
pub use stub::SystemAbilityManagerStub;
pub use types::{FrequencyEntry, PendingState, PendingSummary, RegistrySnapshot, SaExtraProp};
