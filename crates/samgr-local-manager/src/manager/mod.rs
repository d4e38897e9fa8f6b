//! The per-process ability manager.
//!
//! One [`LocalAbilityManager`] lives in every hosting process. It owns the
//! abilities the process hosts, brings the boot-time ones up phase by phase,
//! starts on-demand ones when the registry asks, and relays status changes
//! of peer abilities to the local abilities that asked for them.

mod boot;
mod ondemand;
mod relay;


use crate::config::LocalManagerConfig;
use crate::stub::LocalAbilityManagerStub;
use parking_lot::{Mutex, RwLock};
use relay::RelayListener;
use samgr_ability::{AbilityContext, AbilityHost, ModuleRegistry, SystemAbility, SystemAbilityExt};
use samgr_common::{validate_process_name, AbilityId, Error, Result, TaskPool};
use samgr_ipc::RemoteHandle;
use samgr_profile::{ProfileSet, SaProfile};
use samgr_registry::{SamgrClient, StatusListenerStub};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Manager of the abilities hosted in one process.
///
/// Created with [`LocalAbilityManager::new`], which hands back an `Arc`:
/// the abilities and the stub the registry calls keep weak references to it.
pub struct LocalAbilityManager {
    config: LocalManagerConfig,
    samgr: Arc<dyn SamgrClient>,
    modules: Arc<ModuleRegistry>,
    process_name: RwLock<String>,
    profiles: RwLock<BTreeMap<AbilityId, SaProfile>>,
    abilities: RwLock<HashMap<AbilityId, Arc<dyn SystemAbility>>>,
    /// On-demand ids between the start directive and the end of their start.
    starting: Mutex<HashSet<AbilityId>>,
    /// Target id → local listener ids, in registration order.
    relay: Mutex<HashMap<AbilityId, Vec<AbilityId>>>,
    boot_pool: TaskPool,
    ondemand_pool: TaskPool,
    /// What the registry calls to start abilities.
    handle: RemoteHandle,
    /// Identity under which this process subscribes to the registry.
    relay_handle: RemoteHandle,
    self_ref: Weak<LocalAbilityManager>,
}

impl LocalAbilityManager {
    /// Creates the manager. Must be called from within a tokio runtime.
    pub fn new(
        config: LocalManagerConfig,
        samgr: Arc<dyn SamgrClient>,
        modules: Arc<ModuleRegistry>,
    ) -> Arc<Self> {
        let pid = std::process::id() as i32;
        let boot_pool = TaskPool::new(
            "samgr-boot",
            config.boot_pool_size,
            config.pool_queue_capacity,
        );
        let ondemand_pool = TaskPool::new(
            "samgr-ondemand",
            config.ondemand_pool_size,
            config.pool_queue_capacity,
        );

        Arc::new_cyclic(|weak: &Weak<LocalAbilityManager>| Self {
            handle: LocalAbilityManagerStub::into_handle(weak.clone(), pid),
            relay_handle: StatusListenerStub::into_handle(
                Arc::new(RelayListener::new(weak.clone())),
                pid,
            ),
            config,
            samgr,
            modules,
            process_name: RwLock::new(String::new()),
            profiles: RwLock::new(BTreeMap::new()),
            abilities: RwLock::new(HashMap::new()),
            starting: Mutex::new(HashSet::new()),
            relay: Mutex::new(HashMap::new()),
            boot_pool,
            ondemand_pool,
            self_ref: weak.clone(),
        })
    }

    pub fn config(&self) -> &LocalManagerConfig {
        &self.config
    }

    pub fn process_name(&self) -> String {
        self.process_name.read().clone()
    }

    /// Handle the registry uses to send start directives here.
    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn samgr(&self) -> &Arc<dyn SamgrClient> {
        &self.samgr
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    /// Installs the profiles of `process_name` from `profiles`.
    ///
    /// Profiles of abilities the trust list does not allow in this process
    /// are dropped. Fails if no profile is left.
    pub fn init_profiles(&self, profiles: &ProfileSet, process_name: &str) -> Result<usize> {
        validate_process_name(process_name)?;

        let mut installed = BTreeMap::new();
        for profile in profiles.for_process(process_name) {
            if !self.config.is_trusted(process_name, profile.id) {
                warn!(
                    "Ability {} is not allowed in process {}, dropping its profile",
                    profile.id, process_name
                );
                continue;
            }
            installed.insert(profile.id, profile.clone());
        }
        if installed.is_empty() {
            return Err(Error::not_found(format!("profiles for process {}", process_name)));
        }

        let count = installed.len();
        *self.process_name.write() = process_name.to_string();
        *self.profiles.write() = installed;
        info!("Installed {} profiles for process {}", count, process_name);
        Ok(count)
    }

    pub fn profile(&self, id: AbilityId) -> Option<SaProfile> {
        self.profiles.read().get(&id).cloned()
    }

    /// Takes ownership of `ability`.
    ///
    /// The ability's profile must be installed and its id not yet taken. The
    /// profile attributes are copied onto the instance and it is connected
    /// to the registry and to this manager.
    pub fn add_ability(&self, ability: Arc<dyn SystemAbility>) -> Result<()> {
        let id = ability.base().id();
        let profile = self
            .profile(id)
            .ok_or_else(|| Error::not_found(format!("profile for ability {}", id)))?;

        let mut abilities = self.abilities.write();
        if abilities.contains_key(&id) {
            warn!("Ability {} is already added", id);
            return Err(Error::already_exists(format!("ability {}", id)));
        }

        let host: Weak<dyn AbilityHost> = self.self_ref.clone();
        let base = ability.base();
        base.apply_profile(&profile);
        base.attach(AbilityContext {
            samgr: Arc::clone(&self.samgr),
            host,
        });
        abilities.insert(id, ability);
        debug!("Added ability {} ({})", id, profile.boot_phase);
        Ok(())
    }

    /// Forgets `id`. Returns false if it was not there.
    pub fn remove_ability(&self, id: AbilityId) -> bool {
        self.abilities.write().remove(&id).is_some()
    }

    pub fn get_ability(&self, id: AbilityId) -> Option<Arc<dyn SystemAbility>> {
        self.abilities.read().get(&id).cloned()
    }

    /// Local ability ids in ascending order.
    pub fn ability_ids(&self) -> Vec<AbilityId> {
        let mut ids: Vec<AbilityId> = self.abilities.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn dump(&self, id: AbilityId) -> Result<String> {
        let ability = self
            .get_ability(id)
            .ok_or_else(|| Error::not_found(format!("ability {}", id)))?;
        Ok(ability.dump().await)
    }

    /// Runs the module factory for `id` and adds what it builds.
    ///
    /// Returns false if the module was loaded before.
    pub fn load_module(&self, id: AbilityId) -> Result<bool> {
        match self.modules.load(id)? {
            Some(ability) => {
                if let Err(e) = self.add_ability(ability) {
                    self.modules.unload(id);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Brings the process up.
    ///
    /// Registers with the registry, loads and starts the boot targets phase
    /// by phase, then tells the registry which abilities it can start on
    /// demand. With `start_id` the process was launched for that one
    /// ability, which then is the only boot target.
    pub async fn run(&self, start_id: Option<AbilityId>) -> Result<()> {
        let process = self.process_name();
        if process.is_empty() {
            return Err(Error::invalid_value("no profiles installed"));
        }
        info!("Local ability manager for {} is running", process);

        self.register_process(&process).await?;

        for id in self.boot_targets(start_id) {
            if let Err(e) = self.load_module(id) {
                warn!("Module for boot ability {} not loaded: {}", id, e);
            }
        }
        self.start_phased_boot(start_id).await;
        self.register_on_demand(&process, start_id).await;
        Ok(())
    }

    /// `AddProcess`, retried while the registry cannot be reached.
    async fn register_process(&self, process: &str) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.samgr.add_system_process(process, &self.handle).await {
                Ok(()) => {
                    info!("Registered process {} with the registry", process);
                    return Ok(());
                }
                Err(e @ Error::Transport(_)) if attempts < self.config.samgr_retry_times => {
                    attempts += 1;
                    debug!("Waiting for the registry ({}): {}", attempts, e);
                    tokio::time::sleep(self.config.samgr_retry_interval).await;
                }
                Err(e) => {
                    warn!("Failed to register process {}: {}", process, e);
                    return Err(e);
                }
            }
        }
    }

    /// Profiles started at boot: every run-on-create one, or only `start_id`.
    fn boot_targets(&self, start_id: Option<AbilityId>) -> Vec<AbilityId> {
        self.profiles
            .read()
            .values()
            .filter(|profile| match start_id {
                None => profile.run_on_create,
                Some(target) => profile.id == target,
            })
            .map(|profile| profile.id)
            .collect()
    }

    async fn register_on_demand(&self, process: &str, start_id: Option<AbilityId>) {
        let ids: Vec<AbilityId> = self
            .profiles
            .read()
            .values()
            .filter(|profile| need_register_on_demand(profile, start_id))
            .map(|profile| profile.id)
            .collect();

        for id in ids {
            match self.samgr.add_on_demand_system_ability_info(id, process).await {
                Ok(()) => debug!("Registered on-demand ability {}", id),
                Err(e) => warn!("Failed to register on-demand ability {}: {}", id, e),
            }
        }
    }

    /// Stops every running ability and unloads all modules.
    pub async fn shutdown(&self) {
        let abilities: Vec<Arc<dyn SystemAbility>> = {
            let mut abilities: Vec<_> = self.abilities.read().values().cloned().collect();
            abilities.sort_by_key(|a| a.base().id());
            abilities
        };
        info!("Stopping {} abilities", abilities.len());
        for ability in abilities {
            ability.stop().await;
        }
        self.modules.unload_all();
    }
}

/// On a plain start every ability that is not run-on-create is registered
/// for on-demand start. A process launched for one ability registers all
/// the others, run-on-create or not.
fn need_register_on_demand(profile: &SaProfile, start_id: Option<AbilityId>) -> bool {
    match start_id {
        None => !profile.run_on_create,
        Some(target) => profile.id != target,
    }
}
