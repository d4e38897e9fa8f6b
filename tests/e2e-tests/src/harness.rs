//! In-process registry plus on-demand hosting processes.

use crate::services::{EchoAbility, EventLog, RecordingCallback, RecordingListener};
use async_trait::async_trait;
use parking_lot::Mutex;
use samgr_ability::{ModuleRegistry, SystemAbility};
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::RemoteHandle;
use samgr_local_manager::{LocalAbilityManager, LocalManagerConfig};
use samgr_profile::{ProcessProfile, ProfileSet};
use samgr_registry::{
    LoadCallbackStub, ProcessLauncher, RegistryConfig, SamgrClient, StatusListenerStub,
    SystemAbilityManager, SystemAbilityManagerProxy, SystemAbilityManagerStub,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

/// First pid handed to a simulated hosting process.
const FIRST_PROCESS_PID: i32 = 20_000;

/// Registry configuration with short timeouts for scenarios.
pub fn registry_config() -> RegistryConfig {
    RegistryConfig {
        load_timeout: Duration::from_secs(2),
        notify_timeout: Duration::from_secs(2),
        load_pool_size: 2,
        ..RegistryConfig::default()
    }
}

/// Per-process manager configuration with short retry periods.
pub fn manager_config() -> LocalManagerConfig {
    LocalManagerConfig {
        boot_pool_size: 4,
        ondemand_pool_size: 2,
        ondemand_retry_interval: Duration::from_millis(20),
        samgr_retry_times: 5,
        samgr_retry_interval: Duration::from_millis(20),
        max_phase_wait: Duration::from_secs(10),
        dependency_check_interval: Duration::from_millis(20),
        ..LocalManagerConfig::default()
    }
}

/// Parses profile documents into one set.
pub fn parse_profiles(docs: &[&str]) -> std::result::Result<ProfileSet, String> {
    let mut profiles = ProfileSet::new();
    for doc in docs {
        let doc = ProcessProfile::load_from_string(doc).map_err(|e| format!("{:#}", e))?;
        profiles.merge(doc).map_err(|e| format!("{:#}", e))?;
    }
    Ok(profiles)
}

/// State the launcher needs to bring a hosting process up.
struct Hosting {
    registry_handle: Mutex<Option<RemoteHandle>>,
    profiles: ProfileSet,
    manager_config: LocalManagerConfig,
    events: EventLog,
    start_delays: Mutex<HashMap<AbilityId, Duration>>,
    peers: Mutex<HashMap<AbilityId, Vec<AbilityId>>>,
    processes: Mutex<HashMap<String, Arc<LocalAbilityManager>>>,
    launched: Mutex<Vec<(String, AbilityId)>>,
    refuse_launch: AtomicBool,
    next_pid: AtomicI32,
}

impl Hosting {
    fn build_ability(&self, id: AbilityId) -> Arc<dyn SystemAbility> {
        let mut ability = EchoAbility::new(id, self.events.clone());
        if let Some(delay) = self.start_delays.lock().get(&id) {
            ability = ability.with_start_delay(*delay);
        }
        if let Some(peers) = self.peers.lock().get(&id) {
            ability = ability.listening_for(peers.clone());
        }
        Arc::new(ability)
    }

    /// Creates the manager of `process` with a module for each of its
    /// profiles, and records it as running.
    fn build_process(self: &Arc<Self>, process: &str) -> Result<Arc<LocalAbilityManager>> {
        let remote = self
            .registry_handle
            .lock()
            .clone()
            .ok_or_else(|| Error::Internal("registry is not up".to_string()))?;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let samgr: Arc<dyn SamgrClient> = Arc::new(SystemAbilityManagerProxy::new(remote, pid));

        let modules = Arc::new(ModuleRegistry::new());
        for profile in self.profiles.for_process(process) {
            let hosting = Arc::downgrade(self);
            modules.register(profile.id, move |id| {
                let hosting = hosting
                    .upgrade()
                    .ok_or_else(|| Error::Internal("harness is gone".to_string()))?;
                Ok(hosting.build_ability(id))
            })?;
        }

        let manager = LocalAbilityManager::new(self.manager_config.clone(), samgr, modules);
        manager.init_profiles(&self.profiles, process)?;
        self.processes
            .lock()
            .insert(process.to_string(), Arc::clone(&manager));
        info!("Hosting process {} as pid {}", process, pid);
        Ok(manager)
    }
}

/// Launcher that boots hosting processes inside the test process, each
/// one for the ability it was launched for.
struct HarnessLauncher {
    hosting: Weak<Hosting>,
}

#[async_trait]
impl ProcessLauncher for HarnessLauncher {
    async fn launch(&self, process: &str, id: AbilityId) -> Result<()> {
        let hosting = self
            .hosting
            .upgrade()
            .ok_or_else(|| Error::transport("harness is gone"))?;
        hosting.launched.lock().push((process.to_string(), id));
        if hosting.refuse_launch.load(Ordering::SeqCst) {
            return Err(Error::transport(format!("launch of {} refused", process)));
        }

        let manager = hosting.build_process(process)?;
        let name = process.to_string();
        tokio::spawn(async move {
            if let Err(e) = manager.run(Some(id)).await {
                warn!("Hosting process {} failed to run: {}", name, e);
            }
        });
        Ok(())
    }
}

/// A registry with its stub, plus the hosting processes it launched.
pub struct SamgrHarness {
    pub registry: SystemAbilityManager,
    pub events: EventLog,
    registry_handle: RemoteHandle,
    hosting: Arc<Hosting>,
}

impl SamgrHarness {
    /// Sets up a registry for the abilities described by `docs`.
    /// Must be called from within a tokio runtime.
    pub fn new(docs: &[&str]) -> std::result::Result<Self, String> {
        Self::with_configs(registry_config(), manager_config(), docs)
    }

    pub fn with_configs(
        config: RegistryConfig,
        manager_config: LocalManagerConfig,
        docs: &[&str],
    ) -> std::result::Result<Self, String> {
        crate::init_test_logging();
        let profiles = parse_profiles(docs)?;
        let events = EventLog::new();
        let hosting = Arc::new(Hosting {
            registry_handle: Mutex::new(None),
            profiles: profiles.clone(),
            manager_config,
            events: events.clone(),
            start_delays: Mutex::new(HashMap::new()),
            peers: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            launched: Mutex::new(Vec::new()),
            refuse_launch: AtomicBool::new(false),
            next_pid: AtomicI32::new(FIRST_PROCESS_PID),
        });

        let launcher = Arc::new(HarnessLauncher {
            hosting: Arc::downgrade(&hosting),
        });
        let registry = SystemAbilityManager::new(config, profiles, launcher);
        let registry_handle = SystemAbilityManagerStub::into_handle(registry.clone());
        *hosting.registry_handle.lock() = Some(registry_handle.clone());

        Ok(Self {
            registry,
            events,
            registry_handle,
            hosting,
        })
    }

    /// A client of the registry calling as `pid`.
    pub fn client(&self, pid: i32) -> SystemAbilityManagerProxy {
        SystemAbilityManagerProxy::new(self.registry_handle.clone(), pid)
    }

    /// Delays the start hook of `id` in every process that hosts it.
    pub fn set_start_delay(&self, id: AbilityId, delay: Duration) {
        self.hosting.start_delays.lock().insert(id, delay);
    }

    /// Makes `id` listen for `peers` once started.
    pub fn set_peers(&self, id: AbilityId, peers: Vec<AbilityId>) {
        self.hosting.peers.lock().insert(id, peers);
    }

    /// Makes the launcher fail every launch until cleared.
    pub fn refuse_launches(&self, refuse: bool) {
        self.hosting.refuse_launch.store(refuse, Ordering::SeqCst);
    }

    /// Process names the registry asked to launch, in order.
    pub fn launched(&self) -> Vec<String> {
        self.hosting
            .launched
            .lock()
            .iter()
            .map(|(process, _)| process.clone())
            .collect()
    }

    /// Launches with the ability each one was issued for.
    pub fn launches(&self) -> Vec<(String, AbilityId)> {
        self.hosting.launched.lock().clone()
    }

    pub fn process(&self, name: &str) -> Option<Arc<LocalAbilityManager>> {
        self.hosting.processes.lock().get(name).cloned()
    }

    /// Boots `name` the way init does at startup and waits for its run to
    /// finish.
    pub async fn start_process(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<LocalAbilityManager>, String> {
        let manager = self
            .hosting
            .build_process(name)
            .map_err(|e| format!("cannot host {}: {}", name, e))?;
        manager
            .run(None)
            .await
            .map_err(|e| format!("{} failed to run: {}", name, e))?;
        Ok(manager)
    }

    /// Simulates the abrupt exit of `name`: every handle it served dies.
    pub fn kill_process(&self, name: &str) -> std::result::Result<(), String> {
        let manager = self
            .hosting
            .processes
            .lock()
            .remove(name)
            .ok_or_else(|| format!("process {} is not running", name))?;
        for id in manager.ability_ids() {
            if let Some(handle) = manager.get_ability(id).and_then(|a| a.base().published()) {
                handle.notify_died();
            }
        }
        manager.handle().notify_died();
        info!("Killed hosting process {}", name);
        Ok(())
    }

    /// Loads `id` through the registry proxy with a callback logging under
    /// `name`. Returns the callback handle.
    pub async fn load(
        &self,
        id: AbilityId,
        name: &str,
        pid: i32,
    ) -> std::result::Result<RemoteHandle, String> {
        let callback = LoadCallbackStub::into_handle(
            RecordingCallback::new(name, self.events.clone()),
            pid,
        );
        self.client(pid)
            .load_system_ability(id, &callback)
            .await
            .map_err(|e| format!("load of {} rejected: {}", id, e))?;
        Ok(callback)
    }

    /// Subscribes a listener logging under `name`. Returns its handle.
    pub async fn subscribe(
        &self,
        id: AbilityId,
        name: &str,
        pid: i32,
    ) -> std::result::Result<RemoteHandle, String> {
        let listener = StatusListenerStub::into_handle(
            RecordingListener::new(name, self.events.clone()),
            pid,
        );
        self.client(pid)
            .subscribe_system_ability(id, &listener)
            .await
            .map_err(|e| format!("subscribe to {} rejected: {}", id, e))?;
        Ok(listener)
    }

    /// Stops every hosting process, then the registry.
    pub async fn shutdown(&self) {
        let processes: Vec<Arc<LocalAbilityManager>> =
            self.hosting.processes.lock().drain().map(|(_, m)| m).collect();
        for manager in processes {
            manager.shutdown().await;
        }
        self.registry.shutdown();
    }
}
