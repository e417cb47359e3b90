//! Ignition Agent - Service Bootstrap
//!
//! Waits for dependencies, runs one-time initialization guarded by a
//! marker, repairs permissions and hands off to the service daemon.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod fixup;
pub mod gate;
pub mod guard;
pub mod init;
pub mod launch;
pub mod monitor;

pub use bootstrap::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use fixup::{Fixup, FixupReport};
pub use gate::*;
pub use guard::*;
pub use init::*;
pub use launch::*;
pub use monitor::*;
