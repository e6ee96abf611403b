//! Multi-facet health checking.
//!
//! A component's health is the worst status over its facets: datastore
//! connectivity, one HTTP endpoint per started service, host resources, and
//! inter-service reachability. Each facet is retried on its own budget and,
//! when it stays unhealthy, gets one bounded recovery pass.

pub mod probe;
pub mod recovery;
pub mod retry;

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{HealthConfig, StagehandConfig, Threshold};
use crate::types::{Component, HealthStatus};
use crate::workflow::Interrupt;

pub use probe::{DatastoreSample, HealthProbe, HttpSample, ResourceSample, SystemProbe};
pub use recovery::{RecoveryHooks, RecoveryOutcome};
pub use retry::{Measurement, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Datastore,
    Endpoint,
    Resources,
    Reachability,
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Facet::Datastore => "datastore",
            Facet::Endpoint => "endpoint",
            Facet::Resources => "resources",
            Facet::Reachability => "reachability",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetReport {
    pub facet: Facet,
    pub target: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub detail: Option<String>,
    pub attempts: u32,
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub component: Component,
    pub overall: HealthStatus,
    pub facets: Vec<FacetReport>,
    pub recommendations: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report; `overall` is the worst facet status.
    pub fn new(component: Component, facets: Vec<FacetReport>, recommendations: Vec<String>) -> Self {
        Self {
            component,
            overall: HealthStatus::worst(facets.iter().map(|f| f.status)),
            facets,
            recommendations,
            checked_at: Utc::now(),
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.overall == HealthStatus::Unhealthy
    }

    pub fn facets_with(&self, status: HealthStatus) -> impl Iterator<Item = &FacetReport> {
        self.facets.iter().filter(move |f| f.status == status)
    }
}

/// One concrete thing to measure.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Datastore,
    Endpoint(Component),
    Resources,
    /// `from` must reach `host:port`.
    Reachability {
        from: Component,
        to: String,
        host: String,
        port: u16,
    },
}

pub struct HealthChecker<'a> {
    probe: &'a dyn HealthProbe,
    config: StagehandConfig,
    data_dir: PathBuf,
    recovery: Option<&'a dyn RecoveryHooks>,
    interrupt: Option<Interrupt>,
    last: RefCell<Option<(Instant, HealthReport)>>,
}

impl<'a> HealthChecker<'a> {
    pub fn new(probe: &'a dyn HealthProbe, config: StagehandConfig, data_dir: PathBuf) -> Self {
        Self {
            probe,
            config,
            data_dir,
            recovery: None,
            interrupt: None,
            last: RefCell::new(None),
        }
    }

    pub fn with_recovery(mut self, hooks: &'a dyn RecoveryHooks) -> Self {
        self.recovery = Some(hooks);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn check_with_defaults(&self, component: Component) -> HealthReport {
        self.check(
            component,
            self.config.health.timeout(),
            self.config.health.retries,
        )
    }

    /// Reuse the previous report for `component` when it is younger than
    /// `max_age`; otherwise run a fresh check.
    pub fn check_cached(&self, component: Component, max_age: Duration) -> HealthReport {
        if let Some((at, report)) = self.last.borrow().as_ref()
            && report.component == component
            && at.elapsed() < max_age
        {
            debug!(%component, "reusing cached health report");
            return report.clone();
        }
        self.check_with_defaults(component)
    }

    pub fn last_report(&self) -> Option<HealthReport> {
        self.last.borrow().as_ref().map(|(_, r)| r.clone())
    }

    /// Measure every facet of `component`. `timeout` bounds each facet's
    /// attempts; `retries` is the number of extra attempts per facet.
    pub fn check(&self, component: Component, timeout: Duration, retries: u32) -> HealthReport {
        let policy = RetryPolicy::from_config(&self.config.health, timeout, retries);
        let mut facets = Vec::new();
        let mut recommendations = Vec::new();

        for target in self.plan(component) {
            if self.interrupted() {
                debug!(%component, "health check interrupted");
                break;
            }

            let (measurement, attempts) =
                retry::with_retries(&policy, self.interrupt.as_ref(), |remaining| {
                    self.measure(&target, remaining)
                });
            let mut report = self.facet_report(&target, measurement, attempts);

            if report.status == HealthStatus::Unhealthy
                && let Some(hooks) = self.recovery
            {
                self.recover(
                    component,
                    &target,
                    hooks,
                    timeout,
                    &mut report,
                    &mut recommendations,
                );
            }
            if report.status != HealthStatus::Healthy {
                warn!(
                    facet = %report.facet,
                    target = %report.target,
                    status = %report.status,
                    detail = report.detail.as_deref().unwrap_or(""),
                    "facet not healthy"
                );
                recommendations.extend(self.recommend(&target, &report));
            }
            facets.push(report);
        }

        if facets.iter().any(|f| f.status == HealthStatus::Unhealthy) {
            recommendations.push(
                "Re-run with RUST_LOG=stagehand=debug for probe details, then `stagehand resume`"
                    .to_string(),
            );
        }
        recommendations.dedup();

        let report = HealthReport::new(component, facets, recommendations);
        debug!(%component, overall = %report.overall, "health check finished");
        *self.last.borrow_mut() = Some((Instant::now(), report.clone()));
        report
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(Interrupt::is_triggered)
    }

    fn plan(&self, component: Component) -> Vec<Target> {
        let mut targets = Vec::new();
        if component.needs_datastore() {
            targets.push(Target::Datastore);
        }
        for member in component.members() {
            targets.push(Target::Endpoint(*member));
        }
        targets.push(Target::Resources);

        let ds = &self.config.datastore;
        for member in component.members() {
            if member.needs_datastore() {
                targets.push(Target::Reachability {
                    from: *member,
                    to: "datastore".to_string(),
                    host: ds.host.clone(),
                    port: ds.port,
                });
            }
        }
        // Auxiliary services talk to the workspace service when deployed together.
        if component == Component::All {
            let workspace = self.config.service(Component::Workspace);
            for member in [Component::AuxiliaryA, Component::AuxiliaryB] {
                targets.push(Target::Reachability {
                    from: member,
                    to: Component::Workspace.to_string(),
                    host: workspace.host.clone(),
                    port: workspace.port,
                });
            }
        }
        targets
    }

    fn measure(&self, target: &Target, remaining: Duration) -> Measurement {
        let health = &self.config.health;
        let timeout = remaining.min(health.connect_timeout());
        match target {
            Target::Datastore => match self.probe.datastore(&self.config.datastore, timeout) {
                Ok(sample) => classify_datastore(&sample, health),
                Err(err) => Measurement::unhealthy(format!("{err:#}")),
            },
            Target::Endpoint(member) => {
                let url = endpoint_url(&self.config, *member);
                match self.probe.http(&url, timeout) {
                    Ok(sample) => classify_http(&sample, health.slow_threshold()),
                    Err(err) => Measurement::unhealthy(format!("{err:#}")),
                }
            }
            Target::Resources => match self.probe.resources(&self.data_dir) {
                Ok(sample) => classify_resources(&sample, health),
                Err(err) => Measurement {
                    status: HealthStatus::Healthy,
                    latency: None,
                    detail: Some(format!("not measured: {err:#}")),
                },
            },
            Target::Reachability { host, port, .. } => {
                match self.probe.reachable(host, *port, timeout) {
                    Ok(latency) => Measurement::healthy(Some(latency), None),
                    Err(err) => Measurement::unhealthy(format!("{err:#}")),
                }
            }
        }
    }

    fn facet_report(&self, target: &Target, measurement: Measurement, attempts: u32) -> FacetReport {
        let (facet, label) = match target {
            Target::Datastore => (
                Facet::Datastore,
                format!(
                    "{}:{}",
                    self.config.datastore.host, self.config.datastore.port
                ),
            ),
            Target::Endpoint(member) => (Facet::Endpoint, endpoint_url(&self.config, *member)),
            Target::Resources => (Facet::Resources, self.data_dir.display().to_string()),
            Target::Reachability { from, to, .. } => {
                (Facet::Reachability, format!("{} -> {}", from, to))
            }
        };
        FacetReport {
            facet,
            target: label,
            status: measurement.status,
            latency_ms: measurement.latency.map(|d| d.as_millis() as u64),
            detail: measurement.detail,
            attempts,
            recovered: false,
        }
    }

    fn recover(
        &self,
        checked: Component,
        target: &Target,
        hooks: &dyn RecoveryHooks,
        timeout: Duration,
        report: &mut FacetReport,
        recommendations: &mut Vec<String>,
    ) {
        let (component, host, port, check_port_conflict) = match target {
            // Starting a dependent service brings its datastore up.
            Target::Datastore => (
                checked,
                self.config.datastore.host.clone(),
                self.config.datastore.port,
                false,
            ),
            Target::Endpoint(member) => {
                let service = self.config.service(*member);
                (*member, service.host, service.port, true)
            }
            Target::Resources | Target::Reachability { .. } => return,
        };

        let outcome = recovery::attempt(
            hooks,
            self.probe,
            recovery::RecoveryTarget {
                component,
                host: &host,
                port,
                check_port_conflict,
            },
        );
        match &outcome {
            RecoveryOutcome::PortConflict { host, port } => {
                recommendations.push(format!(
                    "Port {port} on {host} is held by another process; stop it or change services.{component}.port in stagehand.toml"
                ));
            }
            RecoveryOutcome::Failed { reason } => {
                recommendations.push(format!("Automatic recovery of {component} failed: {reason}"));
            }
            RecoveryOutcome::Restarted | RecoveryOutcome::Regenerated => {}
        }
        if !outcome.should_recheck() {
            return;
        }

        let (measurement, attempts) =
            retry::with_retries(&RetryPolicy::once(timeout), self.interrupt.as_ref(), |remaining| {
                self.measure(target, remaining)
            });
        report.attempts += attempts;
        if measurement.status != HealthStatus::Unhealthy {
            debug!(target = %report.target, "facet recovered");
            report.status = measurement.status;
            report.latency_ms = measurement.latency.map(|d| d.as_millis() as u64);
            report.detail = measurement.detail;
            report.recovered = true;
        }
    }

    fn recommend(&self, target: &Target, report: &FacetReport) -> Vec<String> {
        let unhealthy = report.status == HealthStatus::Unhealthy;
        match target {
            Target::Datastore if unhealthy => {
                let ds = &self.config.datastore;
                vec![format!(
                    "Datastore at {}:{} is unreachable; start it (datastore.start in stagehand.toml) and run `stagehand resume`",
                    ds.host, ds.port
                )]
            }
            Target::Datastore => vec![format!(
                "Datastore is responding slowly or its pool is near capacity; consider raising datastore.pool_size (currently {})",
                self.config.datastore.pool_size
            )],
            Target::Endpoint(member) if unhealthy => vec![format!(
                "{} did not answer on {}; check its logs and run `stagehand resume`",
                member, report.target
            )],
            Target::Endpoint(member) => vec![format!(
                "{} answered on {} but not cleanly ({})",
                member,
                report.target,
                report.detail.as_deref().unwrap_or("slow response")
            )],
            Target::Resources => vec![format!(
                "Host resources are under pressure ({}); free capacity before adding workload",
                report.detail.as_deref().unwrap_or("see report")
            )],
            Target::Reachability {
                from, host, port, ..
            } => vec![format!(
                "{} cannot reach {}:{}; check firewall rules and that the target is listening",
                from, host, port
            )],
        }
    }
}

pub fn endpoint_url(config: &StagehandConfig, member: Component) -> String {
    let service = config.service(member);
    format!(
        "http://{}:{}{}",
        service.host, service.port, service.health_path
    )
}

pub fn classify_datastore(sample: &DatastoreSample, config: &HealthConfig) -> Measurement {
    let mut status = HealthStatus::Healthy;
    let mut notes = Vec::new();

    if sample.round_trip > config.slow_threshold() {
        status = HealthStatus::Degraded;
        notes.push(format!("slow round trip {:?}", sample.round_trip));
    }
    if let Some(saturation) = sample.saturation() {
        if saturation >= 1.0 {
            status = HealthStatus::Unhealthy;
            notes.push("connection pool exhausted".to_string());
        } else if saturation >= config.pool_saturation_warn {
            status = status.max(HealthStatus::Degraded);
            notes.push(format!("pool {:.0}% in use", saturation * 100.0));
        }
    }

    Measurement {
        status,
        latency: Some(sample.round_trip),
        detail: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

pub fn classify_http(sample: &HttpSample, slow: Duration) -> Measurement {
    let (status, detail) = match sample.status {
        200..=299 if sample.latency > slow => (
            HealthStatus::Degraded,
            Some(format!("HTTP {} after {:?}", sample.status, sample.latency)),
        ),
        200..=299 => (HealthStatus::Healthy, None),
        500..=599 => (
            HealthStatus::Unhealthy,
            Some(format!("HTTP {}", sample.status)),
        ),
        code => (HealthStatus::Degraded, Some(format!("HTTP {}", code))),
    };
    Measurement {
        status,
        latency: Some(sample.latency),
        detail,
    }
}

pub fn classify_resources(sample: &ResourceSample, config: &HealthConfig) -> Measurement {
    let readings = [
        ("cpu", sample.cpu, config.cpu),
        ("memory", sample.memory, config.memory),
        ("disk", sample.disk, config.disk),
    ];

    let mut status = HealthStatus::Healthy;
    let mut parts = Vec::new();
    for (label, value, threshold) in readings {
        match value {
            Some(percent) => {
                status = status.max(classify_threshold(percent, threshold));
                parts.push(format!("{label} {percent:.0}%"));
            }
            None => parts.push(format!("{label} not measured")),
        }
    }
    Measurement {
        status,
        latency: None,
        detail: Some(parts.join(", ")),
    }
}

fn classify_threshold(percent: f64, threshold: Threshold) -> HealthStatus {
    if percent >= threshold.critical {
        HealthStatus::Unhealthy
    } else if percent >= threshold.warn {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
