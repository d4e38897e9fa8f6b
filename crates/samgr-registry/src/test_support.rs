//! Fakes shared by the registry's unit tests.

use crate::bridge::{DistributedBridge, ProcessLauncher};
use crate::interfaces::{
    LoadCallbackStub, StatusListenerStub, SystemAbilityLoadCallback, SystemAbilityStatusListener,
};
use crate::{RegistryConfig, SystemAbilityManager};
use async_trait::async_trait;
use parking_lot::Mutex;
use samgr_common::errors::codes;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::codes::{enforce_interface, LOCAL_MANAGER_INTERFACE_TOKEN};
use samgr_ipc::{CallContext, Parcel, RemoteHandle, RemoteObject};
use samgr_profile::{ProfileSet, SaProfile};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

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

/// Object behind an ability handle. Answers everything with success.
pub(crate) struct DummyAbility;

#[async_trait]
impl RemoteObject for DummyAbility {
    fn descriptor(&self) -> &str {
        "test.IDummyAbility"
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

pub(crate) fn ability_handle(pid: i32) -> RemoteHandle {
    RemoteHandle::new(Arc::new(DummyAbility), pid)
}

/// Records listener notifications as `"add:<id>"` / `"remove:<id>"`.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

#[async_trait]
impl SystemAbilityStatusListener for RecordingListener {
    async fn on_add_system_ability(&self, id: AbilityId, _device_id: &str) {
        self.events.lock().push(format!("add:{}", id));
    }

    async fn on_remove_system_ability(&self, id: AbilityId, _device_id: &str) {
        self.events.lock().push(format!("remove:{}", id));
    }
}

pub(crate) fn listener(pid: i32) -> (Arc<RecordingListener>, RemoteHandle) {
    let recorder = Arc::new(RecordingListener::default());
    let handle = StatusListenerStub::into_handle(recorder.clone(), pid);
    (recorder, handle)
}

/// Records load outcomes as `"<name> success:<id>"` and the like into a log
/// that may be shared between callbacks.
pub(crate) struct RecordingCallback {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SystemAbilityLoadCallback for RecordingCallback {
    async fn on_load_system_ability_success(&self, id: AbilityId, _handle: RemoteHandle) {
        self.log.lock().push(format!("{} success:{}", self.name, id));
    }

    async fn on_load_system_ability_fail(&self, id: AbilityId) {
        self.log.lock().push(format!("{} fail:{}", self.name, id));
    }

    async fn on_load_system_ability_complete_for_remote(
        &self,
        device_id: &str,
        id: AbilityId,
        handle: Option<RemoteHandle>,
    ) {
        self.log.lock().push(format!(
            "{} remote:{}:{}:{}",
            self.name,
            device_id,
            id,
            handle.is_some()
        ));
    }
}

pub(crate) fn callback(name: &str, log: &Arc<Mutex<Vec<String>>>, pid: i32) -> RemoteHandle {
    LoadCallbackStub::into_handle(
        Arc::new(RecordingCallback {
            name: name.to_string(),
            log: Arc::clone(log),
        }),
        pid,
    )
}

/// Per-process manager stand-in that records START_ABILITY ids.
#[derive(Default)]
pub(crate) struct StartRecorder {
    pub(crate) started: Mutex<Vec<i32>>,
}

#[async_trait]
impl RemoteObject for StartRecorder {
    fn descriptor(&self) -> &str {
        LOCAL_MANAGER_INTERFACE_TOKEN
    }

    async fn on_remote_request(
        &self,
        _code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: CallContext,
    ) -> i32 {
        if !enforce_interface(data, LOCAL_MANAGER_INTERFACE_TOKEN) {
            return codes::ERR_PERMISSION_DENIED;
        }
        match data.read_i32() {
            Ok(raw) => {
                self.started.lock().push(raw);
                codes::ERR_OK
            }
            Err(e) => e.code(),
        }
    }
}

pub(crate) fn process(pid: i32) -> (Arc<StartRecorder>, RemoteHandle) {
    let recorder = Arc::new(StartRecorder::default());
    let handle = RemoteHandle::new(recorder.clone(), pid);
    (recorder, handle)
}

#[derive(Default)]
pub(crate) struct RecordingLauncher {
    pub(crate) launches: Mutex<Vec<(String, AbilityId)>>,
    pub(crate) fail: AtomicBool,
}

impl RecordingLauncher {
    /// Launched process names in order.
    pub(crate) fn launched(&self) -> Vec<String> {
        self.launches.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Launches with the ability each one was issued for.
    pub(crate) fn launches(&self) -> Vec<(String, AbilityId)> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl ProcessLauncher for RecordingLauncher {
    async fn launch(&self, process: &str, id: AbilityId) -> Result<()> {
        self.launches.lock().push((process.to_string(), id));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::transport("launch refused"));
        }
        Ok(())
    }
}

/// Bridge that resolves every remote lookup to one fixed handle.
#[derive(Default)]
pub(crate) struct FakeBridge {
    pub(crate) remote: Mutex<Option<RemoteHandle>>,
    pub(crate) events: Mutex<Vec<String>>,
}

#[async_trait]
impl DistributedBridge for FakeBridge {
    async fn make_remote_binder(
        &self,
        id: AbilityId,
        device_id: &str,
        calling_pid: i32,
    ) -> Option<RemoteHandle> {
        self.events
            .lock()
            .push(format!("binder:{}:{}:{}", id, device_id, calling_pid));
        self.remote.lock().clone()
    }

    fn on_ability_added(&self, id: AbilityId, _handle: &RemoteHandle) {
        self.events.lock().push(format!("added:{}", id));
    }

    fn on_ability_removed(&self, id: AbilityId) {
        self.events.lock().push(format!("removed:{}", id));
    }

    fn on_remote_ability_died(&self, device_id: &str, id: AbilityId) {
        self.events.lock().push(format!("died:{}:{}", device_id, id));
    }

    fn on_device_offline(&self, device_id: &str) {
        self.events.lock().push(format!("offline:{}", device_id));
    }
}

/// Profiles used throughout: 1201 and 1202 (distributed) in
/// `media_service`, 3001 in `audio_service`, 4001 run-on-create in
/// `foundation`.
pub(crate) fn test_profiles() -> ProfileSet {
    let mut distributed = SaProfile::new(id(1202), "media_service");
    distributed.distributed = true;
    let mut boot = SaProfile::new(id(4001), "foundation");
    boot.run_on_create = true;
    ProfileSet::from_profiles(vec![
        SaProfile::new(id(1201), "media_service"),
        distributed,
        SaProfile::new(id(3001), "audio_service"),
        boot,
    ])
    .unwrap()
}

pub(crate) fn test_config() -> RegistryConfig {
    RegistryConfig {
        load_timeout: Duration::from_millis(400),
        notify_timeout: Duration::from_secs(2),
        load_pool_size: 2,
        ..RegistryConfig::default()
    }
}

pub(crate) fn registry_with(config: RegistryConfig) -> (SystemAbilityManager, Arc<RecordingLauncher>) {
    let launcher = Arc::new(RecordingLauncher::default());
    let manager = SystemAbilityManager::new(config, test_profiles(), launcher.clone());
    (manager, launcher)
}

pub(crate) fn registry() -> (SystemAbilityManager, Arc<RecordingLauncher>) {
    registry_with(test_config())
}
