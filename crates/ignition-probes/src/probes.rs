//! Built-in readiness probes
//!
//! Every probe performs exactly one attempt per `check` call; retrying is
//! the readiness gate's job.

use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use ignition_spec::ProbeSpec;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Maximum number of banner bytes read from a server greeting
const BANNER_LIMIT: usize = 1024;

/// A single readiness check against a dependency
#[async_trait]
pub trait Probe: Send + Sync {
    /// Human-readable target (host:port, URL or command line)
    fn target(&self) -> String;

    /// Run one attempt. `Ok(())` means the dependency is ready.
    async fn check(&self) -> Result<()>;
}

/// TCP port accepts connections
pub struct TcpProbe {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

#[async_trait]
impl Probe for TcpProbe {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn check(&self) -> Result<()> {
        let addr = self.target();
        match timeout(self.timeout, tokio::net::TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::TcpFailed {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}

/// HTTP endpoint responds with a 2xx (or an exact status)
pub struct HttpProbe {
    url: String,
    expect_status: Option<u16>,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Build the probe. `insecure` skips certificate verification for
    /// self-signed endpoints.
    pub fn new(
        url: impl Into<String>,
        expect_status: Option<u16>,
        insecure: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| ProbeError::HttpFailed {
                url: url.clone(),
                reason: format!("failed to create client: {}", e),
            })?;

        Ok(Self {
            url,
            expect_status,
            client,
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn check(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProbeError::HttpFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let ok = match self.expect_status {
            Some(expected) => status == expected,
            None => (200..300).contains(&status),
        };

        if ok {
            Ok(())
        } else {
            Err(ProbeError::HttpFailed {
                url: self.url.clone(),
                reason: match self.expect_status {
                    Some(expected) => format!("status {} (expected {})", status, expected),
                    None => format!("status {}", status),
                },
            })
        }
    }
}

/// Command exits 0, optionally printing an expected token
pub struct CommandProbe {
    pub command: Vec<String>,
    pub expect_output: Option<String>,
    pub timeout: Duration,
}

#[async_trait]
impl Probe for CommandProbe {
    fn target(&self) -> String {
        self.command.join(" ")
    }

    async fn check(&self) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ProbeError::InvalidConfig("empty command".to_string()))?;

        match timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    return Err(ProbeError::CommandFailed {
                        command: self.target(),
                        code: output.status.code().unwrap_or(-1),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                if let Some(expected) = &self.expect_output {
                    if !String::from_utf8_lossy(&output.stdout).contains(expected.as_str()) {
                        return Err(ProbeError::UnexpectedOutput {
                            command: self.target(),
                            expected: expected.clone(),
                        });
                    }
                }
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::SpawnFailed {
                command: self.target(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}

/// Unix domain socket accepts connections (e.g. `/run/mysqld/mysqld.sock`)
pub struct UnixSocketProbe {
    pub path: PathBuf,
    pub timeout: Duration,
}

#[async_trait]
impl Probe for UnixSocketProbe {
    fn target(&self) -> String {
        format!("unix:{}", self.path.display())
    }

    async fn check(&self) -> Result<()> {
        match timeout(self.timeout, tokio::net::UnixStream::connect(&self.path)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::SocketFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}

/// Server sends a greeting line starting with a known prefix (FTP "220")
pub struct BannerProbe {
    pub host: String,
    pub port: u16,
    pub prefix: String,
    pub timeout: Duration,
}

impl BannerProbe {
    async fn read_banner(&self) -> Result<String> {
        let mut stream = tokio::net::TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ProbeError::TcpFailed {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })?;

        let mut buf = vec![0u8; BANNER_LIMIT];
        let mut filled = 0;
        while filled < buf.len() {
            let n = stream
                .read(&mut buf[filled..])
                .await
                .map_err(|e| ProbeError::TcpFailed {
                    host: self.host.clone(),
                    port: self.port,
                    reason: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            filled += n;
            if buf[..filled].contains(&b'\n') {
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf[..filled]);
        Ok(text.lines().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Probe for BannerProbe {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn check(&self) -> Result<()> {
        let banner = timeout(self.timeout, self.read_banner())
            .await
            .map_err(|_| ProbeError::Timeout {
                timeout: self.timeout,
            })??;

        if banner.starts_with(&self.prefix) {
            Ok(())
        } else {
            Err(ProbeError::BannerMismatch {
                host: self.host.clone(),
                port: self.port,
                expected: self.prefix.clone(),
                received: banner,
            })
        }
    }
}

/// Build a probe from its spec. `probe_timeout` bounds each attempt.
pub fn from_spec(spec: &ProbeSpec, probe_timeout: Duration) -> Result<Box<dyn Probe>> {
    let probe: Box<dyn Probe> = match spec {
        ProbeSpec::Tcp { host, port } => Box::new(TcpProbe {
            host: host.clone(),
            port: *port,
            timeout: probe_timeout,
        }),
        ProbeSpec::Http {
            url,
            expect_status,
            insecure,
        } => Box::new(HttpProbe::new(
            url.clone(),
            *expect_status,
            *insecure,
            probe_timeout,
        )?),
        ProbeSpec::Command {
            command,
            expect_output,
        } => {
            if command.is_empty() {
                return Err(ProbeError::InvalidConfig("empty command".to_string()));
            }
            Box::new(CommandProbe {
                command: command.clone(),
                expect_output: expect_output.clone(),
                timeout: probe_timeout,
            })
        }
        ProbeSpec::Unix { path } => Box::new(UnixSocketProbe {
            path: path.clone(),
            timeout: probe_timeout,
        }),
        ProbeSpec::Banner { host, port, prefix } => Box::new(BannerProbe {
            host: host.clone(),
            port: *port,
            prefix: prefix.clone(),
            timeout: probe_timeout,
        }),
    };
    Ok(probe)
}
