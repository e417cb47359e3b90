//! The bootstrap pipeline
//!
//! [`Bootstrapper`] runs the fixed sequence for one service:
//!
//! 1. load every declared secret
//! 2. assemble and check the service config
//! 3. wait for each dependency, in declared order
//! 4. check the bootstrap marker
//! 5. run the init procedure if the marker is absent
//! 6. apply permission fix-ups
//! 7. hand off to the daemon
//!
//! Every step is fail-fast. Nothing after a failed step runs.

use crate::config::{EnvSnapshot, ServiceConfig};
use crate::context::RenderContext;
use crate::error::{AgentError, Result};
use crate::fixup;
use crate::gate::ReadinessGate;
use crate::guard::BootstrapGuard;
use crate::init::InitProcedure;
use crate::launch::{LaunchPlan, Launcher, ProcessLauncher};
use ignition_probes::{from_spec, Probe};
use ignition_secrets::{FileSecretStore, SecretsProvider};
use ignition_spec::BootstrapSpec;
use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Instant;
use zeroize::Zeroize;

/// Snapshot of the process environment, non-UTF-8 entries included
pub fn env_snapshot() -> EnvSnapshot {
    std::env::vars_os().collect()
}

/// Drives one service from container start to daemon handoff
pub struct Bootstrapper {
    spec: BootstrapSpec,
    secrets: Arc<dyn SecretsProvider>,
    env: EnvSnapshot,
    probes: HashMap<String, Box<dyn Probe>>,
    launcher: Arc<dyn Launcher>,
}

impl Bootstrapper {
    /// Bootstrapper with file-backed secrets, the current environment and
    /// real processes
    pub fn new(spec: BootstrapSpec) -> Self {
        let secrets = Arc::new(FileSecretStore::new(spec.secrets.dir.clone()));
        Self {
            spec,
            secrets,
            env: env_snapshot(),
            probes: HashMap::new(),
            launcher: Arc::new(ProcessLauncher),
        }
    }

    pub fn with_secrets(mut self, provider: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = provider;
        self
    }

    /// Replace the environment snapshot
    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.env = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Use `probe` instead of the one built from the spec for `dependency`
    pub fn with_probe(mut self, dependency: impl Into<String>, probe: Box<dyn Probe>) -> Self {
        self.probes.insert(dependency.into(), probe);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn spec(&self) -> &BootstrapSpec {
        &self.spec
    }

    /// Run every step up to (not including) the handoff
    pub async fn prepare(&self) -> Result<LaunchPlan> {
        let start = Instant::now();
        let service = self.spec.service.as_str();
        tracing::info!(service = %service, "Bootstrapping service");

        let mut secrets = self.secrets.load_all(&self.spec.secrets.names).await?;
        let config = ServiceConfig::assemble(&self.spec.config, &self.env)?;

        self.wait_for_dependencies().await?;

        let guard = BootstrapGuard::new(&self.spec.marker.path);
        if guard.is_initialized()? {
            tracing::info!(
                service = %service,
                marker = %guard.marker().display(),
                "Already initialized, skipping init"
            );
        } else {
            let procedure = InitProcedure::new(
                service,
                self.spec.init.steps.clone(),
                self.spec.marker.clone(),
            );
            procedure
                .run(&RenderContext::new(&config, &secrets))
                .await?;
        }

        fixup::apply_all(&self.spec.fixups)?;

        let plan = LaunchPlan::build(&self.spec.launch, &config, &secrets, &self.env);
        secrets.zeroize();
        let plan = plan?;

        tracing::info!(service = %service, elapsed = ?start.elapsed(), "Bootstrap complete");
        Ok(plan)
    }

    /// Prepare, then hand off. Returns the exit status to terminate with.
    pub async fn run(&self) -> Result<i32> {
        let plan = self.prepare().await?;
        self.launcher.launch(plan).await
    }

    async fn wait_for_dependencies(&self) -> Result<()> {
        for dep in &self.spec.depends {
            let gate = ReadinessGate::for_dependency(&self.spec.service, dep);
            match self.probes.get(&dep.name) {
                Some(probe) => {
                    gate.wait(probe.as_ref()).await?;
                }
                None => {
                    let probe = from_spec(&dep.probe, dep.probe_timeout).map_err(|e| {
                        AgentError::InvalidSpec(format!("depends '{}': {}", dep.name, e))
                    })?;
                    gate.wait(probe.as_ref()).await?;
                }
            }
        }
        Ok(())
    }
}
