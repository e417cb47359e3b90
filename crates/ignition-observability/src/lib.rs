//! Ignition Observability - Logging
//!
//! Structured logging for the bootstrap agent. Output goes to stderr so the
//! daemon's stdout is left to the daemon.
//!
//! ```no_run
//! use ignition_observability::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to init logging");
//! tracing::info!("Bootstrap started");
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::{ObservabilityError, Result};
pub use logging::init_logging;
