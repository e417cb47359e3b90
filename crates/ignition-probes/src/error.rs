//! Probe error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Reasons a probe attempt did not report ready
#[derive(Debug, Error)]
pub enum ProbeError {
    /// TCP connection failed
    #[error("TCP connection to {host}:{port} failed: {reason}")]
    TcpFailed {
        host: String,
        port: u16,
        reason: String,
    },

    /// Unix socket connection failed
    #[error("Connection to socket {path} failed: {reason}")]
    SocketFailed { path: PathBuf, reason: String },

    /// HTTP request failed or returned the wrong status
    #[error("HTTP request to {url} failed: {reason}")]
    HttpFailed { url: String, reason: String },

    /// Command could not be started
    #[error("Command '{command}' could not be started: {reason}")]
    SpawnFailed { command: String, reason: String },

    /// Command exited non-zero
    #[error("Command '{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Command succeeded but its output lacked the expected text
    #[error("Command '{command}' output did not contain '{expected}'")]
    UnexpectedOutput { command: String, expected: String },

    /// Server greeting did not match
    #[error("Banner from {host}:{port} did not start with '{expected}' (got '{received}')")]
    BannerMismatch {
        host: String,
        port: u16,
        expected: String,
        received: String,
    },

    /// Attempt exceeded its time budget
    #[error("Probe timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Probe could not be built
    #[error("Invalid probe configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = ProbeError> = std::result::Result<T, E>;
