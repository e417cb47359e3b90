//! Process handoff
//!
//! The last bootstrap step. In `exec` mode the agent's process image is
//! replaced by the daemon, which inherits the PID and receives the
//! supervisor's signals directly. `supervise` keeps the agent as a thin
//! parent that forwards signals and mirrors the child's exit status.

use crate::config::{EnvSnapshot, ServiceConfig};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use ignition_secrets::SecretSet;
use ignition_spec::{LaunchMode, LaunchSpec};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// A fully resolved daemon invocation.
///
/// Built from config only; secret values never appear in `args` or `env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment for the daemon (nothing else is inherited)
    pub env: BTreeMap<OsString, OsString>,
    pub workdir: Option<PathBuf>,
    pub mode: LaunchMode,
}

impl LaunchPlan {
    /// Resolve the launch section against the environment snapshot.
    ///
    /// The daemon's environment is `base_env` minus `scrub_env` names minus
    /// every variable whose value equals a loaded secret, plus the rendered
    /// `launch.env`.
    pub fn build(
        spec: &LaunchSpec,
        config: &ServiceConfig,
        secrets: &SecretSet,
        base_env: &EnvSnapshot,
    ) -> Result<Self> {
        let mut argv = spec
            .command
            .iter()
            .enumerate()
            .map(|(i, raw)| config.render(raw, &format!("launch.command[{}]", i)))
            .collect::<Result<Vec<_>>>()?;
        if argv.is_empty() {
            return Err(AgentError::InvalidSpec("launch.command is empty".to_string()));
        }
        let program = argv.remove(0);

        let mut env: BTreeMap<OsString, OsString> = base_env
            .iter()
            .filter(|(key, value)| {
                if spec.scrub_env.iter().any(|s| OsStr::new(s) == key.as_os_str()) {
                    return false;
                }
                if secrets.contains_value(value.as_bytes()) {
                    tracing::debug!(
                        variable = %key.to_string_lossy(),
                        "Dropping variable carrying a secret value"
                    );
                    return false;
                }
                true
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, raw) in &spec.env {
            let value = config.render(raw, &format!("launch.env.{}", key))?;
            if secrets.contains_value(value.as_bytes()) {
                return Err(AgentError::InvalidSpec(format!(
                    "launch.env.{} would expose a secret value",
                    key
                )));
            }
            env.insert(OsString::from(key), OsString::from(value));
        }

        for arg in &argv {
            if secrets.contains_value(arg.as_bytes()) {
                return Err(AgentError::InvalidSpec(
                    "launch.command would expose a secret value".to_string(),
                ));
            }
        }

        Ok(Self {
            program,
            args: argv,
            env,
            workdir: spec.workdir.clone(),
            mode: spec.mode,
        })
    }
}

/// Starts the daemon
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Hand off to the daemon.
    ///
    /// In exec mode this only returns on failure. Otherwise it returns the
    /// exit status the agent should terminate with.
    async fn launch(&self, plan: LaunchPlan) -> Result<i32>;
}

/// Launcher backed by real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, plan: LaunchPlan) -> Result<i32> {
        tracing::info!(
            program = %plan.program,
            args = plan.args.len(),
            mode = ?plan.mode,
            "Launching service"
        );
        match plan.mode {
            LaunchMode::Exec => Err(exec(&plan)),
            LaunchMode::Supervise => supervise(&plan).await,
        }
    }
}

fn launch_failed(program: &str, err: &std::io::Error) -> AgentError {
    AgentError::LaunchFailed {
        program: program.to_string(),
        reason: err.to_string(),
        not_found: err.kind() == std::io::ErrorKind::NotFound,
    }
}

/// Replace the current process image. Returns only on failure.
fn exec(plan: &LaunchPlan) -> AgentError {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new(&plan.program);
    command.args(&plan.args).env_clear().envs(&plan.env);
    if let Some(dir) = &plan.workdir {
        command.current_dir(dir);
    }

    let err = command.exec();
    launch_failed(&plan.program, &err)
}

/// Run the daemon as a child, forwarding termination signals
async fn supervise(plan: &LaunchPlan) -> Result<i32> {
    use std::os::unix::process::ExitStatusExt;
    use tokio::signal::unix::{signal, SignalKind};

    // Handlers go in before the spawn, so a signal arriving in between is
    // queued for the child instead of killing the agent.
    let listen = |kind: SignalKind| {
        signal(kind).map_err(|e| AgentError::Internal(format!("cannot install signal handler: {}", e)))
    };
    let mut term = listen(SignalKind::terminate())?;
    let mut int = listen(SignalKind::interrupt())?;
    let mut hup = listen(SignalKind::hangup())?;
    let mut quit = listen(SignalKind::quit())?;
    let mut usr1 = listen(SignalKind::user_defined1())?;
    let mut usr2 = listen(SignalKind::user_defined2())?;

    let mut command = tokio::process::Command::new(&plan.program);
    command.args(&plan.args).env_clear().envs(&plan.env);
    if let Some(dir) = &plan.workdir {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| launch_failed(&plan.program, &e))?;
    let pid = child
        .id()
        .ok_or_else(|| AgentError::Internal("child exited before its pid was read".to_string()))?;
    tracing::info!(program = %plan.program, pid, "Supervising service");

    let status = loop {
        let forwarded = tokio::select! {
            status = child.wait() => {
                break status.map_err(|e| AgentError::Internal(format!("wait failed: {}", e)))?;
            }
            _ = term.recv() => Signal::SIGTERM,
            _ = int.recv() => Signal::SIGINT,
            _ = hup.recv() => Signal::SIGHUP,
            _ = quit.recv() => Signal::SIGQUIT,
            _ = usr1.recv() => Signal::SIGUSR1,
            _ = usr2.recv() => Signal::SIGUSR2,
        };

        tracing::debug!(pid, signal = %forwarded, "Forwarding signal");
        if let Err(e) = kill(Pid::from_raw(pid as i32), forwarded) {
            tracing::warn!(pid, signal = %forwarded, error = %e, "Failed to forward signal");
        }
    };

    let code = match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    };
    tracing::info!(program = %plan.program, code, "Service exited");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignition_secrets::Secret;
    use ignition_spec::ConfigSpec;
    use serial_test::serial;
    use std::os::unix::ffi::OsStringExt;

    fn config() -> ServiceConfig {
        let spec = ConfigSpec {
            required: vec!["DOMAIN_NAME".to_string()],
            ..Default::default()
        };
        let env = EnvSnapshot::from([("DOMAIN_NAME".into(), "login.42.fr".into())]);
        ServiceConfig::assemble(&spec, &env).unwrap()
    }

    fn secrets() -> SecretSet {
        let mut set = SecretSet::new();
        set.insert(Secret::new("db_password", "/run/secrets/db_password", b"hunter2".to_vec()));
        set
    }

    fn launch(command: &[&str]) -> LaunchSpec {
        LaunchSpec {
            command: command.iter().map(|s| s.to_string()).collect(),
            mode: LaunchMode::Supervise,
            env: BTreeMap::new(),
            scrub_env: Vec::new(),
            workdir: None,
        }
    }

    #[test]
    fn test_plan_scrubs_environment() {
        let mut spec = launch(&["nginx", "-g", "daemon off;"]);
        spec.scrub_env = vec!["MYSQL_ROOT_PASSWORD_FILE".to_string()];
        spec.env
            .insert("SERVER_NAME".to_string(), "${config:DOMAIN_NAME}".to_string());

        let base = EnvSnapshot::from([
            ("PATH".into(), "/usr/bin".into()),
            ("MYSQL_ROOT_PASSWORD_FILE".into(), "/run/secrets/root".into()),
            ("LEAKED".into(), "hunter2".into()),
        ]);
        let plan = LaunchPlan::build(&spec, &config(), &secrets(), &base).unwrap();

        assert_eq!(plan.program, "nginx");
        assert_eq!(plan.args, vec!["-g", "daemon off;"]);
        assert_eq!(plan.env.get(OsStr::new("PATH")), Some(&OsString::from("/usr/bin")));
        assert_eq!(
            plan.env.get(OsStr::new("SERVER_NAME")),
            Some(&OsString::from("login.42.fr"))
        );
        assert!(!plan.env.contains_key(OsStr::new("MYSQL_ROOT_PASSWORD_FILE")));
        assert!(!plan.env.contains_key(OsStr::new("LEAKED")));
        assert!(plan.env.values().all(|v| v != "hunter2"));
    }

    #[test]
    fn test_plan_rejects_secret_reference() {
        let mut spec = launch(&["php-fpm"]);
        spec.env
            .insert("PASS".to_string(), "${secret:db_password}".to_string());
        let err = LaunchPlan::build(&spec, &config(), &secrets(), &EnvSnapshot::new()).unwrap_err();
        assert!(matches!(err, AgentError::Template { .. }));
    }

    #[test]
    fn test_plan_rejects_literal_secret_value() {
        let mut spec = launch(&["php-fpm"]);
        spec.env.insert("PASS".to_string(), "hunter2".to_string());
        let err = LaunchPlan::build(&spec, &config(), &secrets(), &EnvSnapshot::new()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidSpec(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_supervise_exit_code() {
        let plan =
            LaunchPlan::build(&launch(&["/bin/sh", "-c", "exit 3"]), &config(), &secrets(), &EnvSnapshot::new())
                .unwrap();
        assert_eq!(ProcessLauncher.launch(plan).await.unwrap(), 3);
    }

    #[tokio::test]
    #[serial]
    async fn test_supervise_signal_death() {
        let plan = LaunchPlan::build(
            &launch(&["/bin/sh", "-c", "kill -TERM $$"]),
            &config(),
            &secrets(),
            &EnvSnapshot::new(),
        )
        .unwrap();
        assert_eq!(ProcessLauncher.launch(plan).await.unwrap(), 128 + 15);
    }

    #[tokio::test]
    #[serial]
    async fn test_supervise_forwards_early_signal() {
        // The child signals the agent as its very first action.
        let plan = LaunchPlan::build(
            &launch(&["/bin/sh", "-c", "kill -TERM $PPID; exec sleep 5"]),
            &config(),
            &secrets(),
            &EnvSnapshot::new(),
        )
        .unwrap();
        assert_eq!(ProcessLauncher.launch(plan).await.unwrap(), 128 + 15);
    }

    #[tokio::test]
    #[serial]
    async fn test_supervise_env_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env");
        let script = format!("env > {}", out.display());
        let spec = launch(&["/bin/sh", "-c", &script]);
        let raw = OsString::from_vec(vec![b'r', 0xff]);
        let base = EnvSnapshot::from([
            ("ONLY".into(), "this".into()),
            ("RAW".into(), raw),
        ]);
        let plan = LaunchPlan::build(&spec, &config(), &secrets(), &base).unwrap();

        assert_eq!(ProcessLauncher.launch(plan).await.unwrap(), 0);
        let env = std::fs::read(&out).unwrap();
        let has = |needle: &[u8]| env.windows(needle.len()).any(|w| w == needle);
        assert!(has(b"ONLY=this"));
        assert!(has(b"RAW=r\xff"));
        assert!(!has(b"hunter2"));
    }

    #[tokio::test]
    #[serial]
    async fn test_not_found() {
        for mode in [LaunchMode::Exec, LaunchMode::Supervise] {
            let mut spec = launch(&["/nonexistent/daemon"]);
            spec.mode = mode;
            let plan = LaunchPlan::build(&spec, &config(), &secrets(), &EnvSnapshot::new()).unwrap();
            let err = ProcessLauncher.launch(plan).await.unwrap_err();
            assert_eq!(err.exit_code(), crate::error::EXIT_NOT_FOUND);
        }
    }
}
