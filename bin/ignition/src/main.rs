//! Ignition CLI
//!
//! Container entrypoint: `ignition run /etc/ignition/<service>.yml`.
//! Exit status follows sysexits.h for bootstrap failures; once the daemon
//! takes over, its status is the container's status.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use ignition_agent::AgentError;
use ignition_observability::{
    init_logging, FileLoggingConfig, LogLevel, LoggingConfig, RotationStrategy,
};
use ignition_spec::SpecError;

use crate::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // No subscriber yet, so this one goes straight to stderr.
    if let Err(err) = setup_logging(&cli) {
        eprintln!("ignition: {:#}", err);
        std::process::exit(1);
    }

    let code = match start(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Bootstrap failed");
            exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn start(cli: Cli) -> Result<i32> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?
        .block_on(run(cli))
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let config = LoggingConfig {
        level: LogLevel::Info.raised(cli.verbose),
        format: cli.log_format,
        file: cli.log_dir.as_ref().map(|dir| FileLoggingConfig {
            directory: dir.clone(),
            prefix: "ignition.log".to_string(),
            rotation: RotationStrategy::Never,
        }),
        ..Default::default()
    };
    init_logging(&config).context("Failed to initialize logging")
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            spec,
            secrets_dir,
            supervise,
        } => commands::run::run(&spec, secrets_dir, supervise).await,
        Commands::Validate { spec } => commands::validate::validate(&spec),
        Commands::Check { specs, json } => commands::check::check(&specs, json).await,
        Commands::Status { spec } => commands::status::status(&spec),
    }
}

/// Map an error to the process exit status
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(agent) = cause.downcast_ref::<AgentError>() {
            return agent.exit_code();
        }
        if cause.downcast_ref::<SpecError>().is_some() {
            return ignition_agent::EXIT_CONFIG;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_from_agent_error() {
        let err = anyhow::Error::new(AgentError::MissingConfig {
            key: "DOMAIN_NAME".to_string(),
        })
        .context("Bootstrap of nginx failed");
        assert_eq!(exit_code(&err), ignition_agent::EXIT_CONFIG);
    }

    #[test]
    fn test_exit_code_from_spec_error() {
        let err = anyhow::Error::new(ignition_spec::from_yaml_str("version: [").unwrap_err())
            .context("Failed to load spec");
        assert_eq!(exit_code(&err), ignition_agent::EXIT_CONFIG);
    }

    #[test]
    fn test_exit_code_other() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
