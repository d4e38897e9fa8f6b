//! Constructor registry standing in for loadable ability libraries.
//!
//! A hosting process registers one factory per ability id at startup. The
//! per-process manager "loads the module" by running the factory the first
//! time the ability is needed, and unloads everything on shutdown.

use crate::ability::SystemAbility;
use parking_lot::{Mutex, RwLock};
use samgr_common::{AbilityId, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Builds the ability instance for an id.
pub type AbilityFactory = Arc<dyn Fn(AbilityId) -> Result<Arc<dyn SystemAbility>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleState {
    /// The factory is running; no lock is held meanwhile.
    Loading,
    Loaded,
}

/// Factories by ability id plus the load state of each id.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: RwLock<HashMap<AbilityId, AbilityFactory>>,
    loaded: Mutex<HashMap<AbilityId, ModuleState>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory for `id`. Each id takes one factory.
    ///
    /// # Example
    ///
    /// ```
    /// use samgr_ability::{AbilityBase, ModuleRegistry, SystemAbility};
    /// use samgr_common::AbilityId;
    /// use std::sync::Arc;
    ///
    /// struct Echo(AbilityBase);
    ///
    /// impl SystemAbility for Echo {
    ///     fn base(&self) -> &AbilityBase {
    ///         &self.0
    ///     }
    /// }
    ///
    /// let modules = ModuleRegistry::new();
    /// let id = AbilityId::new(1201).unwrap();
    /// modules
    ///     .register(id, |id| Ok(Arc::new(Echo(AbilityBase::new(id, false))) as _))
    ///     .unwrap();
    /// let ability = modules.load(id).unwrap().unwrap();
    /// assert_eq!(ability.base().id(), id);
    /// assert!(modules.load(id).unwrap().is_none());
    /// ```
    pub fn register<F>(&self, id: AbilityId, factory: F) -> Result<()>
    where
        F: Fn(AbilityId) -> Result<Arc<dyn SystemAbility>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write();
        if factories.contains_key(&id) {
            return Err(Error::already_exists(format!("module for ability {}", id)));
        }
        factories.insert(id, Arc::new(factory));
        debug!("Registered module for ability {}", id);
        Ok(())
    }

    pub fn contains(&self, id: AbilityId) -> bool {
        self.factories.read().contains_key(&id)
    }

    pub fn is_loaded(&self, id: AbilityId) -> bool {
        self.loaded.lock().get(&id) == Some(&ModuleState::Loaded)
    }

    /// Runs the factory for `id` unless it already ran.
    ///
    /// Returns the new instance, or `None` if the module was loaded before or
    /// is being loaded right now. The factory runs without any lock held, so
    /// it may call back into the registry.
    pub fn load(&self, id: AbilityId) -> Result<Option<Arc<dyn SystemAbility>>> {
        let factory = self
            .factories
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("module for ability {}", id)))?;

        {
            let mut loaded = self.loaded.lock();
            if loaded.contains_key(&id) {
                return Ok(None);
            }
            loaded.insert(id, ModuleState::Loading);
        }

        let built = factory(id).and_then(|ability| {
            if ability.base().id() == id {
                Ok(ability)
            } else {
                Err(Error::invalid_value(format!(
                    "module for ability {} built ability {}",
                    id,
                    ability.base().id()
                )))
            }
        });

        let mut loaded = self.loaded.lock();
        match built {
            Ok(ability) => {
                loaded.insert(id, ModuleState::Loaded);
                info!("Loaded module for ability {}", id);
                Ok(Some(ability))
            }
            Err(e) => {
                loaded.remove(&id);
                error!("Module for ability {} failed to load: {}", id, e);
                Err(e)
            }
        }
    }

    /// Forgets that `id` was loaded. Returns false if it was not.
    pub fn unload(&self, id: AbilityId) -> bool {
        self.loaded.lock().remove(&id).is_some()
    }

    /// Unloads every module; returns how many were loaded.
    pub fn unload_all(&self) -> usize {
        let count = std::mem::take(&mut *self.loaded.lock()).len();
        if count > 0 {
            info!("Unloaded {} modules", count);
        }
        count
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<AbilityId> {
        let mut ids: Vec<AbilityId> = self.factories.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
