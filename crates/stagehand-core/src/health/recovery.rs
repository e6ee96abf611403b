//! Bounded recovery for unhealthy datastore and endpoint facets.
//!
//! The action list is fixed and runs at most once per facet: port-conflict
//! detection, a restart, then config regeneration plus a second restart. The
//! checker re-measures once afterwards; nothing here loops.

use tracing::{info, warn};

use super::probe::HealthProbe;
use crate::types::Component;

/// Service-side actions the checker may take while recovering.
pub trait RecoveryHooks {
    /// Stop and start `component`; `Ok(false)` when the service refused.
    fn restart(&self, component: Component) -> anyhow::Result<bool>;

    /// Rewrite the generated configuration of `component`.
    fn regenerate_config(&self, component: Component) -> anyhow::Result<()>;

    /// Whether the service manager believes `component` is up.
    fn is_running(&self, component: Component) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Something that is not our service holds the port; nothing was restarted.
    PortConflict { host: String, port: u16 },
    Restarted,
    Regenerated,
    Failed { reason: String },
}

impl RecoveryOutcome {
    /// Whether it is worth re-measuring the facet.
    pub fn should_recheck(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::Restarted | RecoveryOutcome::Regenerated
        )
    }
}

/// What is being recovered and where it is expected to listen.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryTarget<'a> {
    pub component: Component,
    pub host: &'a str,
    pub port: u16,
    /// Endpoint facets check for a foreign listener before restarting.
    pub check_port_conflict: bool,
}

pub fn attempt(
    hooks: &dyn RecoveryHooks,
    probe: &dyn HealthProbe,
    target: RecoveryTarget<'_>,
) -> RecoveryOutcome {
    if target.check_port_conflict
        && probe.port_in_use(target.host, target.port)
        && !hooks.is_running(target.component)
    {
        warn!(
            component = %target.component,
            host = target.host,
            port = target.port,
            "port held by another process"
        );
        return RecoveryOutcome::PortConflict {
            host: target.host.to_string(),
            port: target.port,
        };
    }

    match hooks.restart(target.component) {
        Ok(true) => {
            info!(component = %target.component, "restarted during recovery");
            return RecoveryOutcome::Restarted;
        }
        Ok(false) => warn!(component = %target.component, "restart refused"),
        Err(err) => warn!(component = %target.component, error = %format!("{err:#}"), "restart failed"),
    }

    if let Err(err) = hooks.regenerate_config(target.component) {
        return RecoveryOutcome::Failed {
            reason: format!("config regeneration failed: {err:#}"),
        };
    }
    match hooks.restart(target.component) {
        Ok(true) => {
            info!(component = %target.component, "restarted with regenerated config");
            RecoveryOutcome::Regenerated
        }
        Ok(false) => RecoveryOutcome::Failed {
            reason: "service refused to restart after config regeneration".to_string(),
        },
        Err(err) => RecoveryOutcome::Failed {
            reason: format!("restart failed: {err:#}"),
        },
    }
}
