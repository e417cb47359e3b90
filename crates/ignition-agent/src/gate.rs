//! Readiness gating for dependencies
//!
//! A [`ReadinessGate`] polls a probe at a fixed interval for a bounded number
//! of attempts. It either returns as soon as the probe succeeds or gives up
//! with [`AgentError::DependencyTimeout`] after exactly `max_attempts`
//! probe calls. There is no sleep after the final failed attempt.

use crate::error::{AgentError, Result};
use ignition_probes::Probe;
use ignition_spec::DependsSpec;
use std::time::{Duration, Instant};

/// Outcome of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Probe calls made, including the successful one
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Bounded poll loop over a probe
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    service: String,
    dependency: String,
    interval: Duration,
    max_attempts: u32,
}

impl ReadinessGate {
    /// Create a gate for `dependency` of `service`
    pub fn new(
        service: impl Into<String>,
        dependency: impl Into<String>,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            service: service.into(),
            dependency: dependency.into(),
            interval,
            max_attempts,
        }
    }

    /// Create a gate from a dependency spec
    pub fn for_dependency(service: &str, dep: &DependsSpec) -> Self {
        Self::new(service, dep.name.clone(), dep.interval, dep.max_attempts)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait until `probe` succeeds or the attempt budget is spent
    pub async fn wait(&self, probe: &dyn Probe) -> Result<Ready> {
        let start = Instant::now();
        let target = probe.target();

        tracing::info!(
            service = %self.service,
            dependency = %self.dependency,
            target = %target,
            interval = ?self.interval,
            max_attempts = self.max_attempts,
            "Waiting for dependency"
        );

        for attempt in 1..=self.max_attempts {
            match probe.check().await {
                Ok(()) => {
                    tracing::info!(
                        service = %self.service,
                        dependency = %self.dependency,
                        attempt,
                        elapsed = ?start.elapsed(),
                        "Dependency ready"
                    );
                    return Ok(Ready {
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        service = %self.service,
                        dependency = %self.dependency,
                        attempt,
                        error = %e,
                        "Dependency not ready yet"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        tracing::error!(
            service = %self.service,
            dependency = %self.dependency,
            attempts = self.max_attempts,
            elapsed = ?start.elapsed(),
            "Dependency never became ready"
        );

        Err(AgentError::DependencyTimeout {
            service: self.service.clone(),
            dependency: self.dependency.clone(),
            target,
            attempts: self.max_attempts,
            interval: self.interval,
        })
    }
}
