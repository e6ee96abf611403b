//! Service manager driven by shell commands from stagehand.toml.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use super::{ServiceManager, ServiceStatus};
use crate::config::{ServiceConfig, StagehandConfig};
use crate::types::Component;

#[derive(Debug, Clone)]
pub struct CommandServiceManager {
    config: StagehandConfig,
}

impl CommandServiceManager {
    pub fn new(config: StagehandConfig) -> Self {
        Self { config }
    }

    fn run(&self, label: &str, command: &str) -> anyhow::Result<bool> {
        debug!(label, command, "running service command");
        let status = shell(command)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("Failed to run {} command: {}", label, command))?;
        if !status.success() {
            warn!(label, command, code = ?status.code(), "service command failed");
        }
        Ok(status.success())
    }

    fn is_running(&self, component: Component, service: &ServiceConfig) -> anyhow::Result<bool> {
        match &service.status {
            Some(command) => self.run(&format!("{} status", component), command),
            None => Ok(is_listening(
                &service.host,
                service.port,
                self.config.health.connect_timeout(),
            )),
        }
    }
}

impl ServiceManager for CommandServiceManager {
    fn start(&self, component: Component) -> anyhow::Result<bool> {
        if component.needs_datastore()
            && let Some(command) = &self.config.datastore.start
            && !self.run("datastore start", command)?
        {
            return Ok(false);
        }

        for member in component.members() {
            let service = self.config.service(*member);
            let Some(command) = &service.start else {
                anyhow::bail!(
                    "No start command configured for {}; set services.{}.start in stagehand.toml",
                    member,
                    member
                );
            };
            if !self.run(&format!("{} start", member), command)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn stop(&self, component: Component) -> anyhow::Result<bool> {
        let mut all_stopped = true;
        for member in component.members().iter().rev() {
            let service = self.config.service(*member);
            match &service.stop {
                Some(command) => all_stopped &= self.run(&format!("{} stop", member), command)?,
                None => debug!(%member, "no stop command configured"),
            }
        }
        // The datastore is shared; only a full teardown stops it.
        if component == Component::All
            && let Some(command) = &self.config.datastore.stop
        {
            all_stopped &= self.run("datastore stop", command)?;
        }
        Ok(all_stopped)
    }

    fn status(&self, component: Component) -> anyhow::Result<ServiceStatus> {
        for member in component.members() {
            let service = self.config.service(*member);
            if !self.is_running(*member, &service)? {
                return Ok(ServiceStatus::Stopped);
            }
        }
        Ok(ServiceStatus::Running)
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        // Own process group, so a terminal Ctrl-C reaches only stagehand.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

/// Whether something accepts TCP connections on host:port.
pub fn is_listening(host: &str, port: u16, timeout: Duration) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}
