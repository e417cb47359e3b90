//! Ignition bootstrap spec types
//!
//! One spec file describes the bootstrap of one service container: which
//! secrets it reads, which config keys it requires, which dependencies it
//! waits for, how it initializes a fresh volume and what it finally execs.

mod duration {
    use humantime::format_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid duration: {}", e))),
            None => Ok(None),
        }
    }

    pub mod option {
        pub use super::*;
    }

    /// Serde module for required (non-Option) Duration fields
    pub mod required {
        use humantime::format_duration;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&format_duration(*duration).to_string())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where
            D: Deserializer<'de>,
        {
            use serde::de::Error;
            let s: String = String::deserialize(deserializer)?;
            humantime::parse_duration(&s)
                .map_err(|e| D::Error::custom(format!("invalid duration: {}", e)))
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default mount directory for container secrets
pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Top-level bootstrap spec for a single service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSpec {
    /// Spec version (only "v1" is accepted)
    pub version: String,

    /// Service name, used in logs and the marker file
    #[validate(length(min = 1, max = 63))]
    pub service: String,

    /// Secrets to load before anything else happens
    #[serde(default)]
    pub secrets: SecretsSpec,

    /// Required configuration keys
    #[serde(default)]
    pub config: ConfigSpec,

    /// Dependencies to wait for, in order
    #[serde(default)]
    #[validate(nested)]
    pub depends: Vec<DependsSpec>,

    /// Marker whose existence means the volume is already initialized
    pub marker: MarkerSpec,

    /// One-time initialization steps
    #[serde(default)]
    #[validate(nested)]
    pub init: InitSpec,

    /// Ownership and permission repairs applied on every start
    #[serde(default)]
    pub fixups: Vec<FixupSpec>,

    /// The long-running daemon to hand off to
    #[validate(nested)]
    pub launch: LaunchSpec,
}

/// Where secrets live and which ones this service needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecretsSpec {
    /// Directory holding one file per secret
    #[serde(default = "default_secrets_dir")]
    pub dir: PathBuf,

    /// Secret names (file names inside `dir`)
    #[serde(default)]
    pub names: Vec<String>,
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SECRETS_DIR)
}

impl Default for SecretsSpec {
    fn default() -> Self {
        Self {
            dir: default_secrets_dir(),
            names: Vec::new(),
        }
    }
}

/// Configuration keys read from the environment at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigSpec {
    /// Keys that must resolve to a non-empty value
    #[serde(default)]
    pub required: Vec<String>,

    /// Fallback values used when the environment does not set a key
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl ConfigSpec {
    /// Whether `key` is declared, either as required or through a default
    pub fn declares(&self, key: &str) -> bool {
        self.required.iter().any(|k| k == key) || self.defaults.contains_key(key)
    }
}

/// A dependency to wait for before initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct DependsSpec {
    /// Dependency name (for logs and reports)
    #[validate(length(min = 1))]
    pub name: String,

    /// How readiness is checked
    pub probe: ProbeSpec,

    /// Delay between failed attempts
    #[serde(default = "default_interval", with = "duration::required")]
    pub interval: Duration,

    /// Total number of probe attempts
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1))]
    pub max_attempts: u32,

    /// Upper bound on a single probe attempt
    #[serde(default = "default_probe_timeout", with = "duration::required")]
    pub probe_timeout: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_attempts() -> u32 {
    30
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Readiness probe type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeSpec {
    /// TCP connect succeeds
    Tcp { host: String, port: u16 },

    /// HTTP GET returns a 2xx, or exactly `expect_status`
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect_status: Option<u16>,
        /// Accept self-signed or otherwise invalid certificates
        #[serde(default)]
        insecure: bool,
    },

    /// Command exits 0 (and prints `expect_output` when set)
    Command {
        command: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect_output: Option<String>,
    },

    /// Unix domain socket accepts connections
    Unix { path: PathBuf },

    /// First line sent by the server starts with `prefix`
    Banner {
        host: String,
        port: u16,
        prefix: String,
    },
}

impl ProbeSpec {
    /// Short type name used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeSpec::Tcp { .. } => "tcp",
            ProbeSpec::Http { .. } => "http",
            ProbeSpec::Command { .. } => "command",
            ProbeSpec::Unix { .. } => "unix",
            ProbeSpec::Banner { .. } => "banner",
        }
    }
}

/// Bootstrap marker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MarkerSpec {
    /// File or directory whose existence means "initialized"
    pub path: PathBuf,

    /// Write the marker after the last init step. When false, a step
    /// must produce it.
    #[serde(default = "default_true")]
    pub create: bool,
}

fn default_true() -> bool {
    true
}

/// One-time initialization sequence
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct InitSpec {
    #[serde(default)]
    #[validate(nested)]
    pub steps: Vec<InitStep>,
}

/// A single init step: one program invocation, no shell involved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct InitStep {
    /// Step identifier
    #[validate(length(min = 1))]
    pub id: String,

    /// Program followed by its arguments; each element may use templates
    #[validate(length(min = 1))]
    pub command: Vec<String>,

    /// Extra environment for this step only
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Data written to the program's stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,

    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Step timeout (default 5 minutes)
    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Skip the step when this path already exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_exists: Option<PathBuf>,
}

/// Ownership/permission repair for a shared path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FixupSpec {
    pub path: PathBuf,

    /// User name or numeric uid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Group name or numeric gid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Octal mode for `path` (and directories below it when recursive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Octal mode for regular files below `path` when recursive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<String>,

    #[serde(default)]
    pub recursive: bool,

    /// Do not fail when `path` does not exist
    #[serde(default)]
    pub optional: bool,
}

/// How the daemon takes over
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Replace the current process image
    #[default]
    Exec,
    /// Run as a child, forward signals, exit with its status
    Supervise,
}

/// The long-running daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct LaunchSpec {
    /// Program followed by its arguments
    #[validate(length(min = 1))]
    pub command: Vec<String>,

    #[serde(default)]
    pub mode: LaunchMode,

    /// Extra environment for the daemon (config templates only)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Inherited variables removed before handoff
    #[serde(default)]
    pub scrub_env: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version: v1
service: nginx
marker:
  path: /etc/nginx/ssl/cert.pem
launch:
  command: [nginx, -g, "daemon off;"]
"#;

    #[test]
    fn test_parse_minimal_defaults() {
        let spec: BootstrapSpec = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(spec.service, "nginx");
        assert_eq!(spec.secrets.dir, PathBuf::from(DEFAULT_SECRETS_DIR));
        assert!(spec.secrets.names.is_empty());
        assert!(spec.depends.is_empty());
        assert!(spec.marker.create);
        assert_eq!(spec.launch.mode, LaunchMode::Exec);
    }

    #[test]
    fn test_parse_depends_with_durations() {
        let yaml = r#"
version: v1
service: wordpress
depends:
  - name: mariadb
    probe:
      type: command
      command: [mysqladmin, ping, -h, mariadb, --silent]
    interval: 500ms
    max_attempts: 5
    probe_timeout: 3s
marker:
  path: /var/www/html/wp-config.php
launch:
  command: [php-fpm, -F]
"#;
        let spec: BootstrapSpec = serde_yaml::from_str(yaml).unwrap();
        let dep = &spec.depends[0];
        assert_eq!(dep.interval, Duration::from_millis(500));
        assert_eq!(dep.max_attempts, 5);
        assert_eq!(dep.probe_timeout, Duration::from_secs(3));
        assert_eq!(dep.probe.kind(), "command");
    }

    #[test]
    fn test_depends_defaults() {
        let yaml = r#"
name: redis
probe:
  type: tcp
  host: redis
  port: 6379
"#;
        let dep: DependsSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(dep.interval, Duration::from_secs(2));
        assert_eq!(dep.max_attempts, 30);
        assert_eq!(dep.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_http_probe() {
        let yaml = r#"
type: http
url: https://nginx/wp-login.php
insecure: true
"#;
        let probe: ProbeSpec = serde_yaml::from_str(yaml).unwrap();
        match probe {
            ProbeSpec::Http {
                url,
                expect_status,
                insecure,
            } => {
                assert_eq!(url, "https://nginx/wp-login.php");
                assert!(expect_status.is_none());
                assert!(insecure);
            }
            _ => panic!("Expected HTTP probe"),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{}\nbogus: true\n", MINIMAL);
        assert!(serde_yaml::from_str::<BootstrapSpec>(&yaml).is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let yaml = r#"
name: redis
probe:
  type: tcp
  host: redis
  port: 6379
interval: soon
"#;
        assert!(serde_yaml::from_str::<DependsSpec>(yaml).is_err());
    }

    #[test]
    fn test_config_declares() {
        let mut config = ConfigSpec {
            required: vec!["MYSQL_DATABASE".to_string()],
            ..Default::default()
        };
        config
            .defaults
            .insert("WP_TITLE".to_string(), "Inception".to_string());
        assert!(config.declares("MYSQL_DATABASE"));
        assert!(config.declares("WP_TITLE"));
        assert!(!config.declares("DOMAIN_NAME"));
    }
}
