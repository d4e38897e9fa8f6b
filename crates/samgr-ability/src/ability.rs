//! The ability trait and the state every ability carries.

use crate::host::AbilityHost;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::RemoteHandle;
use samgr_profile::{BootPhase, SaProfile, DEFAULT_DEPEND_TIMEOUT};
use samgr_registry::{SaExtraProp, SamgrClient};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of an ability instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityState {
    Created,
    Started,
    Stopped,
}

impl fmt::Display for AbilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbilityState::Created => write!(f, "created"),
            AbilityState::Started => write!(f, "started"),
            AbilityState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Profile attributes copied onto an instance when its manager adds it.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityAttrs {
    pub lib_path: String,
    pub depends: Vec<AbilityId>,
    pub depend_timeout: Duration,
    pub run_on_create: bool,
    pub distributed: bool,
    pub dump_level: i32,
    pub capability: String,
    pub permission: String,
    pub boot_phase: BootPhase,
}

impl AbilityAttrs {
    fn new(run_on_create: bool) -> Self {
        Self {
            lib_path: String::new(),
            depends: Vec::new(),
            depend_timeout: DEFAULT_DEPEND_TIMEOUT,
            run_on_create,
            distributed: false,
            dump_level: 0,
            capability: String::new(),
            permission: String::new(),
            boot_phase: BootPhase::Other,
        }
    }
}

impl From<&SaProfile> for AbilityAttrs {
    fn from(profile: &SaProfile) -> Self {
        Self {
            lib_path: profile.lib_path.clone(),
            depends: profile.depends.clone(),
            depend_timeout: profile.depend_timeout,
            run_on_create: profile.run_on_create,
            distributed: profile.distributed,
            dump_level: profile.dump_level,
            capability: profile.capability.clone(),
            permission: profile.permission.clone(),
            boot_phase: profile.boot_phase,
        }
    }
}

/// What an ability needs from the process it lives in: the registry and the
/// manager that hosts it.
#[derive(Clone)]
pub struct AbilityContext {
    pub samgr: Arc<dyn SamgrClient>,
    pub host: Weak<dyn AbilityHost>,
}

/// State shared by every ability implementation.
///
/// Implementations embed one and hand it out through
/// [`SystemAbility::base`].
pub struct AbilityBase {
    id: AbilityId,
    state: Mutex<AbilityState>,
    attrs: RwLock<AbilityAttrs>,
    context: RwLock<Option<AbilityContext>>,
    published: Mutex<Option<RemoteHandle>>,
}

impl AbilityBase {
    pub fn new(id: AbilityId, run_on_create: bool) -> Self {
        Self {
            id,
            state: Mutex::new(AbilityState::Created),
            attrs: RwLock::new(AbilityAttrs::new(run_on_create)),
            context: RwLock::new(None),
            published: Mutex::new(None),
        }
    }

    pub fn id(&self) -> AbilityId {
        self.id
    }

    pub fn state(&self) -> AbilityState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == AbilityState::Started
    }

    pub fn attrs(&self) -> AbilityAttrs {
        self.attrs.read().clone()
    }

    /// Copies the profile attributes of `profile` onto this instance.
    pub fn apply_profile(&self, profile: &SaProfile) {
        *self.attrs.write() = AbilityAttrs::from(profile);
    }

    /// Connects the instance to its registry and hosting manager.
    pub fn attach(&self, context: AbilityContext) {
        *self.context.write() = Some(context);
    }

    pub fn context(&self) -> Option<AbilityContext> {
        self.context.read().clone()
    }

    /// Handle currently registered with the registry, if any.
    pub fn published(&self) -> Option<RemoteHandle> {
        self.published.lock().clone()
    }

    fn samgr(&self) -> Result<Arc<dyn SamgrClient>> {
        self.context
            .read()
            .as_ref()
            .map(|ctx| Arc::clone(&ctx.samgr))
            .ok_or_else(|| Error::Internal(format!("ability {} is not attached", self.id)))
    }

    fn host(&self) -> Result<Arc<dyn AbilityHost>> {
        let host = self
            .context
            .read()
            .as_ref()
            .map(|ctx| ctx.host.clone())
            .ok_or_else(|| Error::Internal(format!("ability {} is not attached", self.id)))?;
        host.upgrade()
            .ok_or_else(|| Error::transport(format!("manager of ability {} is gone", self.id)))
    }

    /// Registers `handle` with the registry under this ability's id.
    ///
    /// The registry record carries the distributed, dump, capability and
    /// permission attributes from the profile.
    pub async fn publish(&self, handle: Option<RemoteHandle>) -> Result<()> {
        let handle = handle
            .ok_or_else(|| Error::invalid_value(format!("null handle for ability {}", self.id)))?;
        let samgr = self.samgr()?;
        let attrs = self.attrs();
        let extra = SaExtraProp {
            is_distributed: attrs.distributed,
            dump_flags: attrs.dump_level,
            capability: attrs.capability,
            permission: attrs.permission,
        };

        samgr.add_system_ability(self.id, &handle, extra).await?;
        info!("Published ability {} ({})", self.id, handle.token());
        *self.published.lock() = Some(handle);
        Ok(())
    }

    /// Withdraws the published handle. Failures are logged.
    async fn withdraw(&self) {
        let Some(handle) = self.published.lock().take() else {
            return;
        };
        let samgr = match self.samgr() {
            Ok(samgr) => samgr,
            Err(e) => {
                warn!("Cannot withdraw ability {}: {}", self.id, e);
                return;
            }
        };
        match samgr.remove_system_ability(self.id).await {
            Ok(()) => debug!("Withdrew ability {} ({})", self.id, handle.token()),
            Err(e) => warn!("Failed to withdraw ability {}: {}", self.id, e),
        }
    }

    /// Asks the hosting manager to tell this ability about `target`.
    pub async fn add_system_ability_listener(&self, target: AbilityId) -> Result<()> {
        self.host()?
            .add_system_ability_listener(target, self.id)
            .await
    }

    pub async fn remove_system_ability_listener(&self, target: AbilityId) -> Result<()> {
        self.host()?
            .remove_system_ability_listener(target, self.id)
            .await
    }

    /// Created/Stopped → Started. Returns the previous state, or `None` if
    /// the instance is already running.
    fn enter_started(&self) -> Option<AbilityState> {
        let mut state = self.state.lock();
        if *state == AbilityState::Started {
            return None;
        }
        let previous = *state;
        *state = AbilityState::Started;
        Some(previous)
    }

    fn enter_stopped(&self) -> bool {
        let mut state = self.state.lock();
        if *state != AbilityState::Started {
            return false;
        }
        *state = AbilityState::Stopped;
        true
    }

    fn restore(&self, previous: AbilityState) {
        *self.state.lock() = previous;
    }
}

impl fmt::Debug for AbilityBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbilityBase")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("attrs", &self.attrs())
            .finish()
    }
}

/// A unit of service logic hosted by a process.
///
/// Implementors provide [`base`](Self::base) and whichever hooks they need;
/// the lifecycle itself is driven through [`SystemAbilityExt`].
#[async_trait]
pub trait SystemAbility: Send + Sync {
    fn base(&self) -> &AbilityBase;

    /// Called once per start. A typical implementation publishes its stub.
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self) {}

    async fn on_dump(&self) -> String {
        let base = self.base();
        format!("ability {}: {}", base.id(), base.state())
    }

    /// A peer ability this one listens for was published.
    async fn on_add_system_ability(&self, _id: AbilityId, _device_id: &str) {}

    /// A peer ability this one listens for was withdrawn.
    async fn on_remove_system_ability(&self, _id: AbilityId, _device_id: &str) {}
}

/// Lifecycle operations available on every [`SystemAbility`].
#[async_trait]
pub trait SystemAbilityExt: SystemAbility {
    /// Runs the start hook. Starting a running instance does nothing; a
    /// failed hook leaves the previous state in place.
    async fn start(&self) -> Result<()>;

    /// Runs the stop hook and withdraws the published handle. Stopping an
    /// instance that is not running does nothing.
    async fn stop(&self);

    async fn dump(&self) -> String;
}

#[async_trait]
impl<T> SystemAbilityExt for T
where
    T: SystemAbility + ?Sized,
{
    async fn start(&self) -> Result<()> {
        let base = self.base();
        let Some(previous) = base.enter_started() else {
            debug!("Ability {} is already running", base.id());
            return Ok(());
        };
        if let Err(e) = self.on_start().await {
            warn!("Ability {} failed to start: {}", base.id(), e);
            base.restore(previous);
            return Err(e);
        }
        info!("Ability {} started", base.id());
        Ok(())
    }

    async fn stop(&self) {
        let base = self.base();
        if !base.enter_stopped() {
            debug!("Ability {} is not running", base.id());
            return;
        }
        self.on_stop().await;
        base.withdraw().await;
        info!("Ability {} stopped", base.id());
    }

    async fn dump(&self) -> String {
        self.on_dump().await
    }
}
