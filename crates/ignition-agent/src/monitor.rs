//! One-shot dependency health board
//!
//! Runs every dependency probe of a spec exactly once, independently of
//! each other, and reports the outcome. No retries and no gating.

use ignition_probes::{from_spec, Probe};
use ignition_spec::{BootstrapSpec, DependsSpec};
use serde::Serialize;
use std::time::Instant;

/// Result of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub service: String,
    pub dependency: String,
    pub kind: String,
    pub target: String,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// Probe every dependency of `spec` once, in declared order
pub async fn check_dependencies(spec: &BootstrapSpec) -> Vec<ProbeReport> {
    let mut reports = Vec::with_capacity(spec.depends.len());
    for dep in &spec.depends {
        let report = match from_spec(&dep.probe, dep.probe_timeout) {
            Ok(probe) => check_once(&spec.service, dep, probe.as_ref()).await,
            Err(e) => ProbeReport {
                service: spec.service.clone(),
                dependency: dep.name.clone(),
                kind: dep.probe.kind().to_string(),
                target: String::new(),
                up: false,
                detail: Some(e.to_string()),
                elapsed_ms: 0,
            },
        };
        reports.push(report);
    }
    reports
}

/// Run a single attempt of `probe` for `dep`
pub async fn check_once(service: &str, dep: &DependsSpec, probe: &dyn Probe) -> ProbeReport {
    let start = Instant::now();
    let result = probe.check().await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (up, detail) = match result {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    tracing::debug!(service = %service, dependency = %dep.name, up, elapsed_ms, "Probe checked");

    ProbeReport {
        service: service.to_string(),
        dependency: dep.name.clone(),
        kind: dep.probe.kind().to_string(),
        target: probe.target(),
        up,
        detail,
        elapsed_ms,
    }
}
