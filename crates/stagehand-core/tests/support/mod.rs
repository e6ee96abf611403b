#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stagehand_core::config::{DatastoreConfig, StagehandConfig};
use stagehand_core::context::AppContext;
use stagehand_core::health::{DatastoreSample, HealthProbe, HttpSample, ResourceSample};
use stagehand_core::services::{
    ConfigSecretsProvider, PlaceholderRenderer, ServiceManager, ServiceStatus,
};
use stagehand_core::types::Component;
use stagehand_core::workflow::{Collaborators, Interrupt};
use tempfile::TempDir;

/// In-memory machine: a service manager and a health probe sharing one view
/// of which services run and which ports answer.
#[derive(Default)]
pub struct FakeWorld {
    pub calls: RefCell<Vec<String>>,
    pub running: RefCell<BTreeSet<Component>>,
    /// Ports that refuse connections.
    pub down_ports: RefCell<BTreeSet<u16>>,
    /// Ports held by something that is not a managed service.
    pub foreign_ports: RefCell<BTreeSet<u16>>,
    pub http_status: Cell<Option<u16>>,
    pub refuse_start: Cell<bool>,
    pub fail_stop: Cell<bool>,
    /// Starting a service brings every down port back.
    pub heal_on_start: Cell<bool>,
    pub interrupt_on_start: RefCell<Option<Interrupt>>,
    pub resources: Cell<ResourceSample>,
    pub datastore_probes: Cell<u32>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn take_down(&self, port: u16) {
        self.down_ports.borrow_mut().insert(port);
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn check_port(&self, port: u16) -> anyhow::Result<()> {
        if self.down_ports.borrow().contains(&port) {
            anyhow::bail!("connection refused on port {}", port);
        }
        Ok(())
    }
}

impl ServiceManager for FakeWorld {
    fn start(&self, component: Component) -> anyhow::Result<bool> {
        self.record(format!("start {component}"));
        if let Some(interrupt) = self.interrupt_on_start.borrow().as_ref() {
            interrupt.trigger();
        }
        if self.refuse_start.get() {
            return Ok(false);
        }
        if self.heal_on_start.get() {
            self.down_ports.borrow_mut().clear();
        }
        let mut running = self.running.borrow_mut();
        running.insert(component);
        running.extend(component.members().iter().copied());
        Ok(true)
    }

    fn stop(&self, component: Component) -> anyhow::Result<bool> {
        self.record(format!("stop {component}"));
        if self.fail_stop.get() {
            anyhow::bail!("stop exploded");
        }
        let mut running = self.running.borrow_mut();
        running.remove(&component);
        for member in component.members() {
            running.remove(member);
        }
        Ok(true)
    }

    fn status(&self, component: Component) -> anyhow::Result<ServiceStatus> {
        let running = self.running.borrow();
        if component.members().iter().all(|m| running.contains(m)) {
            Ok(ServiceStatus::Running)
        } else {
            Ok(ServiceStatus::Stopped)
        }
    }
}

impl HealthProbe for FakeWorld {
    fn datastore(
        &self,
        config: &DatastoreConfig,
        _timeout: Duration,
    ) -> anyhow::Result<DatastoreSample> {
        self.datastore_probes.set(self.datastore_probes.get() + 1);
        self.check_port(config.port)?;
        Ok(DatastoreSample {
            round_trip: Duration::from_millis(2),
            pool: Some((1, config.pool_size)),
        })
    }

    fn http(&self, url: &str, _timeout: Duration) -> anyhow::Result<HttpSample> {
        let port = url::Url::parse(url)?.port().unwrap_or(80);
        self.check_port(port)?;
        Ok(HttpSample {
            status: self.http_status.get().unwrap_or(200),
            latency: Duration::from_millis(3),
        })
    }

    fn resources(&self, _data_dir: &Path) -> anyhow::Result<ResourceSample> {
        Ok(self.resources.get())
    }

    fn reachable(&self, _host: &str, port: u16, _timeout: Duration) -> anyhow::Result<Duration> {
        self.check_port(port)?;
        Ok(Duration::from_millis(1))
    }

    fn port_in_use(&self, _host: &str, port: u16) -> bool {
        self.foreign_ports.borrow().contains(&port)
    }
}

/// Config that never sleeps: no retry delay, tight readiness polling.
pub fn fast_config() -> StagehandConfig {
    let mut config = StagehandConfig::default();
    config.health.retries = 1;
    config.health.retry_delay_ms = 0;
    config.health.max_delay_ms = 0;
    config.health.timeout_secs = 5;
    config.workflow.readiness_timeout_secs = 1;
    config.workflow.poll_interval_ms = 1;
    config
}

pub struct TestEnv {
    pub temp: TempDir,
    pub context: AppContext,
    pub world: FakeWorld,
    pub secrets: ConfigSecretsProvider,
    pub renderer: PlaceholderRenderer,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("projects");
        std::fs::create_dir_all(&base).unwrap();
        let context = AppContext::new(
            temp.path().join("state"),
            temp.path().join("config"),
            base,
        );
        Self {
            temp,
            context,
            world: FakeWorld::new(),
            secrets: ConfigSecretsProvider::new(DatastoreConfig::default()),
            renderer: PlaceholderRenderer::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            services: &self.world,
            secrets: &self.secrets,
            renderer: &self.renderer,
            probe: &self.world,
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.context.base_dir().to_path_buf()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.context.state_dir().join("data")
    }
}
