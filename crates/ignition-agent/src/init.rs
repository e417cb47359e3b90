//! One-time initialization
//!
//! Runs the declared init steps in order. Each step is a single program
//! invocation built from typed argv elements; values from config and
//! secrets are substituted per element and never reach a shell.

use crate::context::RenderContext;
use crate::error::{AgentError, Result};
use crate::guard::BootstrapGuard;
use ignition_spec::{InitStep, MarkerSpec};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for a single init step
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Bytes of stderr kept in error messages
const STDERR_TAIL: usize = 2048;

/// A step with every template resolved
struct PreparedStep {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(String, OsString)>,
    stdin: Option<Vec<u8>>,
    workdir: Option<PathBuf>,
}

/// The ordered init sequence for one service
pub struct InitProcedure {
    service: String,
    steps: Vec<InitStep>,
    marker: MarkerSpec,
}

impl InitProcedure {
    pub fn new(service: impl Into<String>, steps: Vec<InitStep>, marker: MarkerSpec) -> Self {
        Self {
            service: service.into(),
            steps,
            marker,
        }
    }

    pub fn steps(&self) -> &[InitStep] {
        &self.steps
    }

    /// Run all steps, then make sure the marker exists.
    ///
    /// The first failing step aborts the procedure; the marker is not
    /// written in that case, so the next start runs the procedure again.
    pub async fn run(&self, ctx: &RenderContext<'_>) -> Result<()> {
        let start = Instant::now();
        tracing::info!(
            service = %self.service,
            steps = self.steps.len(),
            "Running first-time initialization"
        );

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(path) = &step.unless_exists {
                let present = path.try_exists().map_err(|e| AgentError::InitFailed {
                    service: self.service.clone(),
                    step: step.id.clone(),
                    reason: format!("cannot check {}: {}", path.display(), e),
                })?;
                if present {
                    tracing::info!(
                        service = %self.service,
                        step = %step.id,
                        path = %path.display(),
                        "Skipping init step, artifact already present"
                    );
                    continue;
                }
            }

            let prepared = self.prepare(index, step, ctx)?;
            let timeout = step.timeout.unwrap_or(DEFAULT_STEP_TIMEOUT);
            let step_start = Instant::now();

            tracing::info!(
                service = %self.service,
                step = %step.id,
                program = %prepared.program.to_string_lossy(),
                "Running init step"
            );
            self.execute(step, prepared, timeout).await?;
            tracing::info!(
                service = %self.service,
                step = %step.id,
                elapsed = ?step_start.elapsed(),
                "Init step completed"
            );
        }

        let guard = BootstrapGuard::new(&self.marker.path);
        if !guard.is_initialized()? {
            if self.marker.create {
                guard.mark(&self.service)?;
            } else {
                return Err(AgentError::InitFailed {
                    service: self.service.clone(),
                    step: "marker".to_string(),
                    reason: format!(
                        "init steps completed but did not produce marker {}",
                        self.marker.path.display()
                    ),
                });
            }
        }

        tracing::info!(
            service = %self.service,
            elapsed = ?start.elapsed(),
            "Initialization complete"
        );
        Ok(())
    }

    fn prepare(
        &self,
        index: usize,
        step: &InitStep,
        ctx: &RenderContext<'_>,
    ) -> Result<PreparedStep> {
        let base = format!("init.steps[{}]", index);
        let mut argv = ctx.render_all(&step.command, &format!("{}.command", base))?;
        if argv.is_empty() {
            return Err(AgentError::InvalidSpec(format!("{}.command is empty", base)));
        }
        let program = argv.remove(0);

        let env = step
            .env
            .iter()
            .map(|(key, raw)| {
                ctx.render_os(raw, &format!("{}.env.{}", base, key))
                    .map(|value| (key.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        let stdin = step
            .stdin
            .as_deref()
            .map(|raw| ctx.render_bytes(raw, &format!("{}.stdin", base)))
            .transpose()?;

        Ok(PreparedStep {
            program,
            args: argv,
            env,
            stdin,
            workdir: step.workdir.clone(),
        })
    }

    async fn execute(&self, step: &InitStep, prepared: PreparedStep, timeout: Duration) -> Result<()> {
        let fail = |reason: String| AgentError::InitFailed {
            service: self.service.clone(),
            step: step.id.clone(),
            reason,
        };

        let program = prepared.program.to_string_lossy().into_owned();
        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .envs(prepared.env.iter().map(|(k, v)| (k, v)))
            .stdin(if prepared.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &prepared.workdir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| fail(format!("cannot start '{}': {}", program, e)))?;

        // stdin is fed while stdout/stderr drain; a child that exits without
        // reading all of it is judged by its exit status alone.
        let stdin_data = prepared.stdin;
        let stdin_pipe = child.stdin.take();
        let feed = async move {
            if let (Some(data), Some(mut pipe)) = (stdin_data, stdin_pipe) {
                match pipe.write_all(&data).await {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let run = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            fed?;
            Ok::<_, std::io::Error>(output)
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(fail(format!("I/O error: {}", e))),
            Err(_) => return Err(fail(format!("timed out after {:?}", timeout))),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(service = %self.service, step = %step.id, output = %stdout.trim(), "Init step output");
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| stderr.len() - i <= STDERR_TAIL)
                .unwrap_or(stderr.len());
            Err(fail(format!(
                "'{}' exited with code {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                &stderr[tail_start..]
            )))
        }
    }
}
