//! Per-facet retry loop with fixed or exponential backoff.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{Backoff, HealthConfig};
use crate::types::HealthStatus;
use crate::workflow::Interrupt;

/// Outcome of a single facet measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub status: HealthStatus,
    pub latency: Option<Duration>,
    pub detail: Option<String>,
}

impl Measurement {
    pub fn healthy(latency: Option<Duration>, detail: Option<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency,
            detail,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency: None,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
    /// Cumulative budget for all attempts on one facet.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HealthConfig, timeout: Duration, retries: u32) -> Self {
        Self {
            retries,
            base_delay: config.retry_delay(),
            backoff: config.backoff,
            max_delay: config.max_delay(),
            timeout,
        }
    }

    /// A single attempt with no waiting, used for post-recovery re-checks.
    pub fn once(timeout: Duration) -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            max_delay: Duration::ZERO,
            timeout,
        }
    }
}

/// Measure until healthy or degraded, retries run out, the cumulative timeout
/// passes, or the run is interrupted. `attempt` receives the remaining budget.
///
/// Returns the last measurement and the number of attempts made.
pub fn with_retries<F>(
    policy: &RetryPolicy,
    interrupt: Option<&Interrupt>,
    mut attempt: F,
) -> (Measurement, u32)
where
    F: FnMut(Duration) -> Measurement,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let remaining = policy.timeout.saturating_sub(started.elapsed());
        let measurement = attempt(remaining);

        // Degraded is an answer, not a transient failure.
        if measurement.status != HealthStatus::Unhealthy {
            return (measurement, attempts);
        }
        if started.elapsed() >= policy.timeout {
            let detail = measurement.detail.unwrap_or_else(|| "no response".to_string());
            return (
                Measurement::unhealthy(format!(
                    "{} (gave up after {:?} and {} attempt(s))",
                    detail, policy.timeout, attempts
                )),
                attempts,
            );
        }
        if attempts > policy.retries || interrupt.is_some_and(Interrupt::is_triggered) {
            return (measurement, attempts);
        }

        let delay = policy
            .backoff
            .delay(policy.base_delay, attempts, policy.max_delay)
            .min(policy.timeout.saturating_sub(started.elapsed()));
        debug!(attempt = attempts, ?delay, "facet unhealthy, retrying");
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(retries: u32, timeout: Duration) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::ZERO,
            backoff: Backoff::Exponential,
            max_delay: Duration::ZERO,
            timeout,
        }
    }

    #[test]
    fn retries_until_healthy() {
        let mut calls = 0;
        let (measurement, attempts) = with_retries(&policy(3, Duration::from_secs(5)), None, |_| {
            calls += 1;
            if calls < 3 {
                Measurement::unhealthy("refused")
            } else {
                Measurement::healthy(None, None)
            }
        });
        assert_eq!(measurement.status, HealthStatus::Healthy);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn stops_after_retry_budget() {
        let (measurement, attempts) = with_retries(&policy(2, Duration::from_secs(5)), None, |_| {
            Measurement::unhealthy("refused")
        });
        assert_eq!(measurement.status, HealthStatus::Unhealthy);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn degraded_is_not_retried() {
        let (measurement, attempts) = with_retries(&policy(5, Duration::from_secs(5)), None, |_| {
            Measurement {
                status: HealthStatus::Degraded,
                latency: None,
                detail: Some("slow".into()),
            }
        });
        assert_eq!(measurement.status, HealthStatus::Degraded);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn exhausted_timeout_forfeits_remaining_retries() {
        let (measurement, attempts) =
            with_retries(&policy(10, Duration::ZERO), None, |_| {
                Measurement::unhealthy("refused")
            });
        assert_eq!(attempts, 1);
        assert!(measurement.detail.unwrap().contains("gave up"));
    }

    #[test]
    fn interrupt_stops_retrying() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let (_, attempts) = with_retries(
            &policy(10, Duration::from_secs(5)),
            Some(&interrupt),
            |_| Measurement::unhealthy("refused"),
        );
        assert_eq!(attempts, 1);
    }
}
