//! Readiness probes for Ignition
//!
//! Probes check whether a dependency can accept requests: a TCP connect,
//! an HTTP status, a command's exit status/output, or a server banner.

pub mod error;
pub mod probes;

pub use error::*;
pub use probes::*;
