//! # samgr ability
//!
//! What a hosted ability is made of: the [`SystemAbility`] trait with its
//! optional hooks, the [`AbilityBase`] every implementation embeds (state
//! machine, profile attributes, publishing to the registry), and the
//! [`ModuleRegistry`] of constructors a hosting process loads abilities
//! from.

pub mod ability;
pub mod host;
pub mod module_registry;

pub use ability::{
    AbilityAttrs, AbilityBase, AbilityContext, AbilityState, SystemAbility, SystemAbilityExt,
};
pub use host::AbilityHost;
pub use module_registry::{AbilityFactory, ModuleRegistry};
