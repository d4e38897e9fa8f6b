//! Fakes shared by the local manager's unit tests.

use crate::{LocalAbilityManager, LocalManagerConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use samgr_ability::{AbilityBase, ModuleRegistry, SystemAbility};
use samgr_common::errors::codes;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::{CallContext, Parcel, RemoteHandle, RemoteObject};
use samgr_profile::{BootPhase, ProfileSet, SaProfile};
use samgr_registry::{
    DisabledLauncher, LoadCallbackStub, RegistryConfig, SamgrClient, SystemAbilityLoadCallback,
    SystemAbilityManager, SystemAbilityManagerProxy, SystemAbilityManagerStub,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const PROCESS: &str = "media_service";
pub(crate) const CLIENT_PID: i32 = 4242;

pub(crate) fn id(raw: i32) -> AbilityId {
    AbilityId::new(raw).unwrap()
}

/// Polls `predicate` every 5ms, panicking after `timeout`.
pub(crate) async fn wait_for(what: &str, timeout: Duration, predicate: impl Fn() -> bool) {
    let result = tokio::time::timeout(timeout, async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if result.is_err() {
        panic!("wait_for '{}' timed out after {:?}", what, timeout);
    }
}

/// Object behind a published ability handle.
struct ServiceStub;

#[async_trait]
impl RemoteObject for ServiceStub {
    fn descriptor(&self) -> &str {
        "test.IService"
    }

    async fn on_remote_request(
        &self,
        _code: u32,
        _data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: CallContext,
    ) -> i32 {
        codes::ERR_OK
    }
}

/// Ability that publishes itself on start and writes its lifecycle into a
/// log shared with other test abilities, as `"<id> start"` and the like.
pub(crate) struct TestAbility {
    base: AbilityBase,
    log: Arc<Mutex<Vec<String>>>,
    start_delay: Duration,
    pub(crate) fail_start: AtomicBool,
}

impl TestAbility {
    pub(crate) fn new(raw: i32, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Self::with_delay(raw, log, Duration::ZERO)
    }

    pub(crate) fn with_delay(
        raw: i32,
        log: &Arc<Mutex<Vec<String>>>,
        start_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: AbilityBase::new(id(raw), false),
            log: Arc::clone(log),
            start_delay,
            fail_start: AtomicBool::new(false),
        })
    }

    fn record(&self, event: String) {
        self.log.lock().push(event);
    }
}

#[async_trait]
impl SystemAbility for TestAbility {
    fn base(&self) -> &AbilityBase {
        &self.base
    }

    async fn on_start(&self) -> Result<()> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.record(format!("{} start", self.base.id()));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::transport("backend unavailable"));
        }
        self.base
            .publish(Some(RemoteHandle::new(Arc::new(ServiceStub), 1)))
            .await
    }

    async fn on_stop(&self) {
        self.record(format!("{} stop", self.base.id()));
    }

    async fn on_add_system_ability(&self, target: AbilityId, _device_id: &str) {
        self.record(format!("{} peer-added:{}", self.base.id(), target));
    }

    async fn on_remove_system_ability(&self, target: AbilityId, _device_id: &str) {
        self.record(format!("{} peer-removed:{}", self.base.id(), target));
    }
}

pub(crate) fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().clone()
}

pub(crate) fn profile(raw: i32, phase: BootPhase, run_on_create: bool) -> SaProfile {
    let mut profile = SaProfile::new(id(raw), PROCESS);
    profile.boot_phase = phase;
    profile.run_on_create = run_on_create;
    profile
}

/// 1201 run-on-create in Other, 1202 run-on-create in Boot, 1203 run-on-create
/// in Core, 1301 and 1302 on demand, all in `media_service`. 3001 lives in
/// `audio_service`.
pub(crate) fn test_profiles() -> ProfileSet {
    ProfileSet::from_profiles(vec![
        profile(1201, BootPhase::Other, true),
        profile(1202, BootPhase::Boot, true),
        profile(1203, BootPhase::Core, true),
        profile(1301, BootPhase::Other, false),
        profile(1302, BootPhase::Other, false),
        SaProfile::new(id(3001), "audio_service"),
    ])
    .unwrap()
}

pub(crate) fn test_config() -> LocalManagerConfig {
    LocalManagerConfig {
        boot_pool_size: 4,
        ondemand_retry_times: 5,
        ondemand_retry_interval: Duration::from_millis(20),
        samgr_retry_times: 3,
        samgr_retry_interval: Duration::from_millis(10),
        max_phase_wait: Duration::from_secs(5),
        dependency_check_interval: Duration::from_millis(10),
        ..LocalManagerConfig::default()
    }
}

/// A registry plus a client proxy to it.
pub(crate) fn registry(profiles: ProfileSet) -> (SystemAbilityManager, Arc<dyn SamgrClient>) {
    let registry = SystemAbilityManager::new(
        RegistryConfig {
            load_timeout: Duration::from_secs(2),
            ..RegistryConfig::default()
        },
        profiles,
        Arc::new(DisabledLauncher),
    );
    let proxy = SystemAbilityManagerProxy::new(
        SystemAbilityManagerStub::into_handle(registry.clone()),
        CLIENT_PID,
    );
    (registry, Arc::new(proxy))
}

/// A manager for `media_service` connected to a fresh registry.
pub(crate) fn manager() -> (Arc<LocalAbilityManager>, SystemAbilityManager) {
    manager_with(test_config(), test_profiles())
}

pub(crate) fn manager_with(
    config: LocalManagerConfig,
    profiles: ProfileSet,
) -> (Arc<LocalAbilityManager>, SystemAbilityManager) {
    let (registry, samgr) = registry(profiles.clone());
    let manager = LocalAbilityManager::new(config, samgr, Arc::new(ModuleRegistry::new()));
    manager.init_profiles(&profiles, PROCESS).unwrap();
    (manager, registry)
}

/// Records load outcomes as `"success:<id>"` / `"fail:<id>"`.
#[derive(Default)]
pub(crate) struct RecordingCallback {
    pub(crate) events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl SystemAbilityLoadCallback for RecordingCallback {
    async fn on_load_system_ability_success(&self, id: AbilityId, _handle: RemoteHandle) {
        self.events.lock().push(format!("success:{}", id));
    }

    async fn on_load_system_ability_fail(&self, id: AbilityId) {
        self.events.lock().push(format!("fail:{}", id));
    }
}

pub(crate) fn load_callback() -> (Arc<RecordingCallback>, RemoteHandle) {
    let recorder = Arc::new(RecordingCallback::default());
    let handle = LoadCallbackStub::into_handle(recorder.clone(), CLIENT_PID);
    (recorder, handle)
}
