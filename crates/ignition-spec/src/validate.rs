//! Cross-field validation for bootstrap specs
//!
//! Field-level constraints live on the types through the validator crate;
//! everything that needs to look at more than one field lives here.

use crate::error::{ValidationError, ValidationErrorKind};
use crate::template::{RefSource, Template};
use crate::types::{BootstrapSpec, ProbeSpec};
use std::collections::HashSet;

/// Validate the spec version
pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    if version == "v1" {
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationErrorKind::InvalidVersion {
                found: version.to_string(),
            },
            "version",
        ))
    }
}

/// Validate the service name: alphanumeric start, then alphanumerics, '-' or '_'
pub fn validate_service_name(name: &str) -> Result<(), ValidationError> {
    let invalid = || {
        ValidationError::new(
            ValidationErrorKind::InvalidServiceName {
                name: name.to_string(),
            },
            "service",
        )
    };

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return Err(invalid()),
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Whether `name` can be used as a single file name inside the secrets dir
pub fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0')
}

/// Whether `name` is usable as an environment variable name
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse an octal mode string such as "755" or "0640"
pub fn parse_mode(value: &str) -> Option<u32> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    if digits.is_empty() || digits.len() > 5 {
        return None;
    }
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Some(mode),
        _ => None,
    }
}

/// Validate declared secret names
pub fn validate_secrets(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for (i, name) in spec.secrets.names.iter().enumerate() {
        let path = format!("secrets.names[{}]", i);
        if !is_valid_secret_name(name) {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidSecretName { name: name.clone() },
                path,
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::new(
                ValidationErrorKind::DuplicateSecret { name: name.clone() },
                path,
            ));
        }
    }
    Ok(())
}

/// Validate declared config keys
pub fn validate_config_keys(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    let required = spec
        .config
        .required
        .iter()
        .enumerate()
        .map(|(i, k)| (format!("config.required[{}]", i), k));
    let defaults = spec
        .config
        .defaults
        .keys()
        .map(|k| (format!("config.defaults.{}", k), k));

    for (path, key) in required.chain(defaults) {
        if !is_valid_env_name(key) {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidConfigKey { key: key.clone() },
                path,
            ));
        }
    }
    Ok(())
}

/// Validate dependency names and probe parameters
pub fn validate_dependencies(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for (i, dep) in spec.depends.iter().enumerate() {
        if !seen.insert(dep.name.as_str()) {
            return Err(ValidationError::new(
                ValidationErrorKind::DuplicateDependency {
                    name: dep.name.clone(),
                },
                format!("depends[{}].name", i),
            ));
        }

        let reason = match &dep.probe {
            ProbeSpec::Tcp { host, port } | ProbeSpec::Banner { host, port, .. } => {
                if host.trim().is_empty() {
                    Some("host cannot be empty".to_string())
                } else if *port == 0 {
                    Some("port must be between 1 and 65535".to_string())
                } else {
                    None
                }
            }
            ProbeSpec::Http { url, .. } => {
                if url.starts_with("http://") || url.starts_with("https://") {
                    None
                } else {
                    Some(format!("url '{}' must start with http:// or https://", url))
                }
            }
            ProbeSpec::Command { command, .. } => {
                if command.first().map_or(true, |p| p.trim().is_empty()) {
                    Some("command cannot be empty".to_string())
                } else {
                    None
                }
            }
            ProbeSpec::Unix { path } => {
                if path.is_absolute() {
                    None
                } else {
                    Some(format!("socket path '{}' must be absolute", path.display()))
                }
            }
        };

        if let ProbeSpec::Banner { prefix, .. } = &dep.probe {
            if prefix.is_empty() {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidProbe {
                        reason: "banner prefix cannot be empty".to_string(),
                    },
                    format!("depends[{}].probe.prefix", i),
                ));
            }
        }

        if let Some(reason) = reason {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidProbe { reason },
                format!("depends[{}].probe", i),
            ));
        }
    }
    Ok(())
}

/// Validate that every template parses and only references declared values
pub fn validate_templates(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    let secrets: HashSet<&str> = spec.secrets.names.iter().map(String::as_str).collect();

    let check = |raw: &str, path: String, allow_secrets: bool| -> Result<(), ValidationError> {
        let template =
            Template::parse(raw).map_err(|e| ValidationError::new(e.into(), path.clone()))?;
        for reference in template.references() {
            let kind = match reference.source {
                RefSource::Secret if !allow_secrets => ValidationErrorKind::SecretNotAllowed {
                    name: reference.name.clone(),
                },
                RefSource::Secret if !secrets.contains(reference.name.as_str()) => {
                    ValidationErrorKind::UndeclaredSecret {
                        name: reference.name.clone(),
                    }
                }
                RefSource::Config if !spec.config.declares(&reference.name) => {
                    ValidationErrorKind::UndeclaredConfig {
                        key: reference.name.clone(),
                    }
                }
                _ => continue,
            };
            return Err(ValidationError::new(kind, path));
        }
        Ok(())
    };

    let mut ids = HashSet::new();
    for (i, step) in spec.init.steps.iter().enumerate() {
        if !ids.insert(step.id.as_str()) {
            return Err(ValidationError::new(
                ValidationErrorKind::DuplicateStep {
                    id: step.id.clone(),
                },
                format!("init.steps[{}].id", i),
            ));
        }
        for (j, arg) in step.command.iter().enumerate() {
            check(arg, format!("init.steps[{}].command[{}]", i, j), true)?;
        }
        for (key, value) in &step.env {
            validate_env_name(key, format!("init.steps[{}].env", i))?;
            check(value, format!("init.steps[{}].env.{}", i, key), true)?;
        }
        if let Some(stdin) = &step.stdin {
            check(stdin, format!("init.steps[{}].stdin", i), true)?;
        }
    }

    for (j, arg) in spec.launch.command.iter().enumerate() {
        check(arg, format!("launch.command[{}]", j), false)?;
    }
    for (key, value) in &spec.launch.env {
        validate_env_name(key, "launch.env".to_string())?;
        check(value, format!("launch.env.{}", key), false)?;
    }
    for name in &spec.launch.scrub_env {
        validate_env_name(name, "launch.scrub_env".to_string())?;
    }

    Ok(())
}

fn validate_env_name(name: &str, path: String) -> Result<(), ValidationError> {
    if is_valid_env_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationErrorKind::InvalidEnvName {
                name: name.to_string(),
            },
            path,
        ))
    }
}

/// Validate fix-up modes
pub fn validate_fixups(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    for (i, fixup) in spec.fixups.iter().enumerate() {
        for (field, value) in [("mode", &fixup.mode), ("file_mode", &fixup.file_mode)] {
            if let Some(value) = value {
                if parse_mode(value).is_none() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::InvalidMode {
                            value: value.clone(),
                        },
                        format!("fixups[{}].{}", i, field),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> BootstrapSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
version: v1
service: mariadb
secrets:
  names: [db_password, db_root_password]
config:
  required: [MYSQL_DATABASE, MYSQL_USER]
marker:
  path: /var/lib/mysql/.ignition-initialized
init:
  steps:
    - id: create-database
      command: [mariadb, -uroot]
      stdin: "CREATE DATABASE IF NOT EXISTS ${config:MYSQL_DATABASE|ident};"
launch:
  command: [mysqld_safe]
"#;

    #[test]
    fn test_version() {
        assert!(validate_version("v1").is_ok());
        let err = validate_version("v2").unwrap_err();
        assert_eq!(err.path, "version");
    }

    #[test]
    fn test_service_name() {
        assert!(validate_service_name("wordpress").is_ok());
        assert!(validate_service_name("static-site_2").is_ok());
        assert!(validate_service_name("-bad").is_err());
        assert!(validate_service_name("with space").is_err());
        assert!(validate_service_name("").is_err());
    }

    #[test]
    fn test_secret_names() {
        assert!(is_valid_secret_name("db_password"));
        assert!(is_valid_secret_name(".hidden"));
        assert!(!is_valid_secret_name("../etc/shadow"));
        assert!(!is_valid_secret_name(".."));
        assert!(!is_valid_secret_name(""));
    }

    #[test]
    fn test_duplicate_secret() {
        let mut s = spec(BASE);
        s.secrets.names.push("db_password".to_string());
        let err = validate_secrets(&s).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::DuplicateSecret { .. }));
        assert_eq!(err.path, "secrets.names[2]");
    }

    #[test]
    fn test_env_names() {
        assert!(is_valid_env_name("MYSQL_DATABASE"));
        assert!(is_valid_env_name("_x1"));
        assert!(!is_valid_env_name("1ABC"));
        assert!(!is_valid_env_name("A-B"));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755"), Some(0o755));
        assert_eq!(parse_mode("0640"), Some(0o640));
        assert_eq!(parse_mode("0o2775"), Some(0o2775));
        assert_eq!(parse_mode("888"), None);
        assert_eq!(parse_mode("17777"), None);
        assert_eq!(parse_mode(""), None);
    }

    #[test]
    fn test_templates_valid() {
        assert!(validate_templates(&spec(BASE)).is_ok());
    }

    #[test]
    fn test_template_undeclared_config() {
        let mut s = spec(BASE);
        s.init.steps[0].command.push("--host=${config:DOMAIN_NAME}".to_string());
        let err = validate_templates(&s).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::UndeclaredConfig {
                key: "DOMAIN_NAME".to_string()
            }
        );
        assert_eq!(err.path, "init.steps[0].command[2]");
    }

    #[test]
    fn test_template_undeclared_secret() {
        let mut s = spec(BASE);
        s.init.steps[0].stdin = Some("${secret:ftp_password|sql}".to_string());
        let err = validate_templates(&s).unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::UndeclaredSecret { .. }
        ));
    }

    #[test]
    fn test_secret_in_launch_env_rejected() {
        let mut s = spec(BASE);
        s.launch
            .env
            .insert("PASS".to_string(), "${secret:db_password}".to_string());
        let err = validate_templates(&s).unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::SecretNotAllowed { .. }
        ));
    }

    #[test]
    fn test_duplicate_step_id() {
        let mut s = spec(BASE);
        let step = s.init.steps[0].clone();
        s.init.steps.push(step);
        let err = validate_templates(&s).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::DuplicateStep { .. }));
    }

    #[test]
    fn test_probe_validation() {
        let s = spec(
            r#"
version: v1
service: monitor
depends:
  - name: ftp
    probe:
      type: banner
      host: ftp
      port: 0
      prefix: "220"
marker:
  path: /tmp/marker
launch:
  command: [monitor]
"#,
        );
        let err = validate_dependencies(&s).unwrap_err();
        assert_eq!(err.path, "depends[0].probe");

        let s = spec(
            r#"
version: v1
service: wordpress
depends:
  - name: mariadb
    probe:
      type: unix
      path: run/mysqld/mysqld.sock
marker:
  path: /tmp/marker
launch:
  command: [php-fpm]
"#,
        );
        assert!(validate_dependencies(&s).is_err());
    }

    #[test]
    fn test_fixup_mode_validation() {
        let mut s = spec(BASE);
        s.fixups.push(crate::FixupSpec {
            path: "/var/lib/mysql".into(),
            owner: Some("mysql".to_string()),
            group: None,
            mode: Some("rwx".to_string()),
            file_mode: None,
            recursive: true,
            optional: false,
        });
        let err = validate_fixups(&s).unwrap_err();
        assert_eq!(err.path, "fixups[0].mode");
    }
}
