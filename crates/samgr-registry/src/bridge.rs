//! Collaborator seams: the distributed bridge and the process launcher.

use async_trait::async_trait;
use samgr_common::{AbilityId, Error, Result};
use samgr_ipc::RemoteHandle;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Link to registries on other devices.
///
/// Only `make_remote_binder` is required; the notification hooks default to
/// doing nothing.
#[async_trait]
pub trait DistributedBridge: Send + Sync {
    /// Resolves `id` on `device_id` on behalf of `calling_pid`.
    async fn make_remote_binder(
        &self,
        id: AbilityId,
        device_id: &str,
        calling_pid: i32,
    ) -> Option<RemoteHandle>;

    /// A distributed ability was published on this device.
    fn on_ability_added(&self, _id: AbilityId, _handle: &RemoteHandle) {}

    /// A distributed ability was withdrawn from this device.
    fn on_ability_removed(&self, _id: AbilityId) {}

    fn on_remote_ability_died(&self, _device_id: &str, _id: AbilityId) {}

    fn on_device_offline(&self, _device_id: &str) {}
}

/// Starts a hosting process by name for the ability `id`, which the process
/// boots on its own instead of its run-on-create set.
///
/// Success means the launch was issued; the process announces itself later
/// through `add_system_process`.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, process: &str, id: AbilityId) -> Result<()>;
}

/// Launches processes by running a command template.
///
/// Every `{process}` in the template is replaced by the process name and
/// every `{ability}` by the requested ability id. The result is split on
/// whitespace into program and arguments.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    template: String,
}

impl CommandLauncher {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    fn command_line(&self, process: &str, id: AbilityId) -> Result<(String, Vec<String>)> {
        let ability = id.to_string();
        let mut parts = self.template.split_whitespace().map(|part| {
            part.replace("{process}", process)
                .replace("{ability}", &ability)
        });
        let program = parts
            .next()
            .ok_or_else(|| Error::invalid_value("launcher command is empty"))?;
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self, process: &str, id: AbilityId) -> Result<()> {
        let (program, args) = self.command_line(process, id)?;
        debug!("Launching {} for ability {}: {} {:?}", process, id, program, args);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::transport(format!("failed to launch {}: {}", process, e)))?;
        info!("Launched process {} (PID: {})", process, child.id().unwrap_or(0));

        // Reap the child so it does not linger as a zombie.
        let name = process.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("Process {} exited: {}", name, status),
                Err(e) => warn!("Failed to wait for process {}: {}", name, e),
            }
        });
        Ok(())
    }
}

/// Launcher for registries that never start processes themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLauncher;

#[async_trait]
impl ProcessLauncher for DisabledLauncher {
    async fn launch(&self, process: &str, id: AbilityId) -> Result<()> {
        Err(Error::transport(format!(
            "no launcher configured, cannot start {} for ability {}",
            process, id
        )))
    }
}
