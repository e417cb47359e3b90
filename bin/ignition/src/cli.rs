use clap::{Parser, Subcommand};
use ignition_observability::LogFormat;
use std::path::PathBuf;

/// Container service bootstrap
#[derive(Parser)]
#[command(name = "ignition")]
#[command(version, about = "Wait for dependencies, initialize once, hand off to the service")]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Enable verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Log output format: compact, pretty or json
    #[arg(long, global = true, default_value = "compact", env = "IGNITION_LOG_FORMAT")]
    pub(crate) log_format: LogFormat,

    /// Also write JSON logs to this directory
    #[arg(long, global = true, env = "IGNITION_LOG_DIR")]
    pub(crate) log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// CLI subcommands
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Bootstrap the service and hand off to it
    Run {
        /// Path to the bootstrap spec
        #[arg(env = "IGNITION_SPEC")]
        spec: PathBuf,

        /// Override the secrets directory from the spec
        #[arg(long, env = "IGNITION_SECRETS_DIR")]
        secrets_dir: Option<PathBuf>,

        /// Keep ignition as the parent process instead of exec'ing
        #[arg(long)]
        supervise: bool,
    },

    /// Parse and validate a spec without running anything
    Validate {
        /// Path to the bootstrap spec
        #[arg(env = "IGNITION_SPEC")]
        spec: PathBuf,
    },

    /// Probe every dependency once and print a status table
    Check {
        /// Bootstrap specs to check
        #[arg(required = true)]
        specs: Vec<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show whether the service has been initialized
    Status {
        /// Path to the bootstrap spec
        #[arg(env = "IGNITION_SPEC")]
        spec: PathBuf,
    },
}
