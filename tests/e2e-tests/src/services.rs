//! Abilities, listeners and callbacks the scenarios are built from.

use async_trait::async_trait;
use parking_lot::Mutex;
use samgr_ability::{AbilityBase, SystemAbility};
use samgr_common::errors::codes;
use samgr_common::{AbilityId, Result};
use samgr_ipc::{CallContext, Parcel, RemoteHandle, RemoteObject};
use samgr_registry::{SystemAbilityLoadCallback, SystemAbilityStatusListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared, ordered record of what happened during a scenario.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.inner.lock().push((Instant::now(), event.into()));
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.inner.lock().iter().any(|(_, e)| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.inner.lock().iter().filter(|(_, e)| e == event).count()
    }

    /// When `event` was first recorded.
    pub fn time_of(&self, event: &str) -> Option<Instant> {
        self.inner
            .lock()
            .iter()
            .find(|(_, e)| e == event)
            .map(|(at, _)| *at)
    }
}

/// Object behind every published echo handle.
struct EchoStub {
    id: AbilityId,
}

#[async_trait]
impl RemoteObject for EchoStub {
    fn descriptor(&self) -> &str {
        "e2e.IEcho"
    }

    async fn on_remote_request(
        &self,
        _code: u32,
        _data: &mut Parcel,
        reply: &mut Parcel,
        _ctx: CallContext,
    ) -> i32 {
        reply.write_ability_id(self.id);
        codes::ERR_OK
    }
}

/// Ability that publishes an echo stub on start and logs its lifecycle as
/// `"<id> start"`, `"<id> stop"`, `"<id> peer-added:<target>"` and
/// `"<id> peer-removed:<target>"`.
pub struct EchoAbility {
    base: AbilityBase,
    events: EventLog,
    start_delay: Duration,
    /// Peers this ability listens for once started.
    peers: Vec<AbilityId>,
}

impl EchoAbility {
    pub fn new(id: AbilityId, events: EventLog) -> Self {
        Self {
            base: AbilityBase::new(id, false),
            events,
            start_delay: Duration::ZERO,
            peers: Vec::new(),
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn listening_for(mut self, peers: Vec<AbilityId>) -> Self {
        self.peers = peers;
        self
    }
}

#[async_trait]
impl SystemAbility for EchoAbility {
    fn base(&self) -> &AbilityBase {
        &self.base
    }

    async fn on_start(&self) -> Result<()> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        let id = self.base.id();
        self.events.push(format!("{} start", id));
        self.base
            .publish(Some(RemoteHandle::new(
                Arc::new(EchoStub { id }),
                std::process::id() as i32,
            )))
            .await?;
        for peer in &self.peers {
            self.base.add_system_ability_listener(*peer).await?;
        }
        Ok(())
    }

    async fn on_stop(&self) {
        self.events.push(format!("{} stop", self.base.id()));
    }

    async fn on_add_system_ability(&self, target: AbilityId, _device_id: &str) {
        self.events
            .push(format!("{} peer-added:{}", self.base.id(), target));
    }

    async fn on_remove_system_ability(&self, target: AbilityId, _device_id: &str) {
        self.events
            .push(format!("{} peer-removed:{}", self.base.id(), target));
    }
}

/// Client-side listener logging `"<name> added:<id>"` / `"<name> removed:<id>"`.
pub struct RecordingListener {
    name: String,
    events: EventLog,
}

impl RecordingListener {
    pub fn new(name: &str, events: EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events,
        })
    }
}

#[async_trait]
impl SystemAbilityStatusListener for RecordingListener {
    async fn on_add_system_ability(&self, id: AbilityId, _device_id: &str) {
        self.events.push(format!("{} added:{}", self.name, id));
    }

    async fn on_remove_system_ability(&self, id: AbilityId, _device_id: &str) {
        self.events.push(format!("{} removed:{}", self.name, id));
    }
}

/// Load callback logging `"<name> success:<id>"` / `"<name> fail:<id>"`.
pub struct RecordingCallback {
    name: String,
    events: EventLog,
}

impl RecordingCallback {
    pub fn new(name: &str, events: EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events,
        })
    }
}

#[async_trait]
impl SystemAbilityLoadCallback for RecordingCallback {
    async fn on_load_system_ability_success(&self, id: AbilityId, _handle: RemoteHandle) {
        self.events.push(format!("{} success:{}", self.name, id));
    }

    async fn on_load_system_ability_fail(&self, id: AbilityId) {
        self.events.push(format!("{} fail:{}", self.name, id));
    }
}
