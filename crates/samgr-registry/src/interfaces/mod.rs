//! Interfaces the registry calls back into: status listeners, load
//! callbacks and the per-process manager's start directive.

mod listener;
mod load_callback;
mod local_manager;

pub use listener::{StatusListenerProxy, StatusListenerStub, SystemAbilityStatusListener};
pub use load_callback::{LoadCallbackProxy, LoadCallbackStub, SystemAbilityLoadCallback};
pub use local_manager::LocalAbilityManagerProxy;
