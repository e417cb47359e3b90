//! Template rendering against loaded config and secrets

use crate::config::ServiceConfig;
use crate::error::{AgentError, Result};
use ignition_secrets::SecretSet;
use ignition_spec::{RefSource, Template};
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

/// Values available to templates
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    config: &'a ServiceConfig,
    secrets: Option<&'a SecretSet>,
}

impl<'a> RenderContext<'a> {
    pub fn new(config: &'a ServiceConfig, secrets: &'a SecretSet) -> Self {
        Self {
            config,
            secrets: Some(secrets),
        }
    }

    /// A context where every secret reference fails to resolve
    pub fn config_only(config: &'a ServiceConfig) -> Self {
        Self {
            config,
            secrets: None,
        }
    }

    /// Render `raw` to bytes; `context` names the field for error messages
    pub fn render_bytes(&self, raw: &str, context: &str) -> Result<Vec<u8>> {
        let template = Template::parse(raw).map_err(|source| AgentError::Template {
            context: context.to_string(),
            source,
        })?;

        template
            .render_bytes(|source, name| match source {
                RefSource::Config => self.config.get(name).map(str::as_bytes),
                RefSource::Secret => self.secrets.and_then(|s| s.expose(name)),
            })
            .map_err(|source| AgentError::Template {
                context: context.to_string(),
                source,
            })
    }

    /// Render an argv element or env value
    pub fn render_os(&self, raw: &str, context: &str) -> Result<OsString> {
        self.render_bytes(raw, context).map(OsString::from_vec)
    }

    /// Render `raw` to text
    pub fn render(&self, raw: &str, context: &str) -> Result<String> {
        String::from_utf8(self.render_bytes(raw, context)?)
            .map_err(|_| AgentError::InvalidSpec(format!("{} does not render to UTF-8 text", context)))
    }

    /// Render every element of a list
    pub fn render_all(&self, raws: &[String], context: &str) -> Result<Vec<OsString>> {
        raws.iter()
            .enumerate()
            .map(|(i, raw)| self.render_os(raw, &format!("{}[{}]", context, i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignition_secrets::Secret;
    use crate::config::EnvSnapshot;
    use ignition_spec::ConfigSpec;

    fn fixtures() -> (ServiceConfig, SecretSet) {
        let spec = ConfigSpec {
            required: vec!["MYSQL_USER".to_string()],
            ..Default::default()
        };
        let env = EnvSnapshot::from([("MYSQL_USER".into(), "wpuser".into())]);
        let config = ServiceConfig::assemble(&spec, &env).unwrap();

        let mut secrets = SecretSet::new();
        secrets.insert(Secret::new("db_password", "/run/secrets/db_password", b"p'w".to_vec()));
        secrets.insert(Secret::new("tls_key", "/run/secrets/tls_key", vec![0xfe, 0x01]));
        (config, secrets)
    }

    #[test]
    fn test_render_with_secrets() {
        let (config, secrets) = fixtures();
        let ctx = RenderContext::new(&config, &secrets);
        let out = ctx
            .render(
                "ALTER USER '${config:MYSQL_USER|sql}' IDENTIFIED BY '${secret:db_password|sql}'",
                "stdin",
            )
            .unwrap();
        assert_eq!(out, "ALTER USER 'wpuser' IDENTIFIED BY 'p''w'");
    }

    #[test]
    fn test_binary_secret_passes_through() {
        use std::os::unix::ffi::OsStrExt;

        let (config, secrets) = fixtures();
        let ctx = RenderContext::new(&config, &secrets);
        let arg = ctx.render_os("--key=${secret:tls_key}", "command[1]").unwrap();
        assert_eq!(arg.as_bytes(), b"--key=\xfe\x01");

        let err = ctx.render("${secret:tls_key|sql}", "stdin").unwrap_err();
        assert!(matches!(err, AgentError::Template { .. }));
    }

    #[test]
    fn test_config_only_rejects_secrets() {
        let (config, _secrets) = fixtures();
        let err = config
            .render("${secret:db_password}", "launch.env.PASS")
            .unwrap_err();
        match err {
            AgentError::Template { context, .. } => assert_eq!(context, "launch.env.PASS"),
            other => panic!("Expected Template error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_all_reports_index() {
        let (config, secrets) = fixtures();
        let ctx = RenderContext::new(&config, &secrets);
        let err = ctx
            .render_all(
                &["ok".to_string(), "${config:NOPE}".to_string()],
                "init.steps[0].command",
            )
            .unwrap_err();
        match err {
            AgentError::Template { context, .. } => {
                assert_eq!(context, "init.steps[0].command[1]")
            }
            other => panic!("Expected Template error, got {:?}", other),
        }
    }
}
