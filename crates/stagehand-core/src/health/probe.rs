//! Measurement side of the health checker.
//!
//! [`HealthProbe`] takes raw samples; classification into healthy/degraded/
//! unhealthy happens in the checker so it can be tested without a network.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::TcpStream;

use crate::config::DatastoreConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatastoreSample {
    pub round_trip: Duration,
    /// Connections in use and pool size, when the probe can see them.
    pub pool: Option<(u32, u32)>,
}

impl DatastoreSample {
    pub fn saturation(&self) -> Option<f64> {
        self.pool
            .filter(|(_, max)| *max > 0)
            .map(|(in_use, max)| f64::from(in_use) / f64::from(max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSample {
    pub status: u16,
    pub latency: Duration,
}

/// Resource usage in percent; `None` where the platform offers no sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSample {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
}

pub trait HealthProbe {
    fn datastore(&self, config: &DatastoreConfig, timeout: Duration)
    -> anyhow::Result<DatastoreSample>;

    /// GET `url`; any HTTP response is a sample, transport failure is an error.
    fn http(&self, url: &str, timeout: Duration) -> anyhow::Result<HttpSample>;

    fn resources(&self, data_dir: &Path) -> anyhow::Result<ResourceSample>;

    /// TCP connect time from this host to `host:port`.
    fn reachable(&self, host: &str, port: u16, timeout: Duration) -> anyhow::Result<Duration>;

    /// Whether something already listens on `host:port`.
    fn port_in_use(&self, host: &str, port: u16) -> bool;
}

/// Probe backed by real sockets, reqwest and /proc.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> anyhow::Result<F::Output> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;
        Ok(runtime.block_on(future))
    }

    async fn connect(host: &str, port: u16, timeout: Duration) -> anyhow::Result<Duration> {
        let start = Instant::now();
        tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out connecting to {}:{}", host, port))?
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
        Ok(start.elapsed())
    }
}

impl HealthProbe for SystemProbe {
    fn datastore(
        &self,
        config: &DatastoreConfig,
        timeout: Duration,
    ) -> anyhow::Result<DatastoreSample> {
        let round_trip = self.block_on(Self::connect(&config.host, config.port, timeout))??;
        // A bare TCP probe cannot see pool usage.
        Ok(DatastoreSample {
            round_trip,
            pool: None,
        })
    }

    fn http(&self, url: &str, timeout: Duration) -> anyhow::Result<HttpSample> {
        self.block_on(async {
            let client = reqwest::Client::builder()
                .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?;
            let start = Instant::now();
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            Ok::<_, anyhow::Error>(HttpSample {
                status: response.status().as_u16(),
                latency: start.elapsed(),
            })
        })?
    }

    fn resources(&self, data_dir: &Path) -> anyhow::Result<ResourceSample> {
        Ok(ResourceSample {
            cpu: cpu_percent(),
            memory: memory_percent(),
            disk: disk_percent(data_dir),
        })
    }

    fn reachable(&self, host: &str, port: u16, timeout: Duration) -> anyhow::Result<Duration> {
        self.block_on(Self::connect(host, port, timeout))?
    }

    fn port_in_use(&self, host: &str, port: u16) -> bool {
        crate::services::command::is_listening(host, port, Duration::from_millis(250))
    }
}

/// One-minute load average relative to the number of cores.
fn cpu_percent() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    let load: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cores = std::thread::available_parallelism().ok()?.get() as f64;
    Some((load / cores * 100.0).min(100.0))
}

fn memory_percent() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    (total > 0.0).then(|| (total - available) / total * 100.0)
}

fn disk_percent(dir: &Path) -> Option<f64> {
    if cfg!(windows) {
        return None;
    }
    // The data dir may not exist yet; measure the nearest existing ancestor.
    let existing = dir.ancestors().find(|p| p.exists())?;
    let output = Command::new("df").arg("-Pk").arg(existing).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df(&String::from_utf8_lossy(&output.stdout))
}

fn parse_df(output: &str) -> Option<f64> {
    let line = output.lines().nth(1)?;
    let capacity = line.split_whitespace().nth(4)?;
    capacity.trim_end_matches('%').parse().ok()
}
