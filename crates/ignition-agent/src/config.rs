//! Service configuration snapshot
//!
//! Required keys are resolved once, at startup, from an environment snapshot
//! and the spec's defaults. The result is immutable; nothing in the agent
//! reads or writes the process environment after this point.

use crate::context::RenderContext;
use crate::error::{AgentError, Result};
use ignition_spec::ConfigSpec;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};

/// Process environment captured at startup, kept as raw OS strings
pub type EnvSnapshot = HashMap<OsString, OsString>;

/// Validated, immutable configuration for one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    values: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// Assemble the configuration from `env` and the spec's defaults.
    ///
    /// A variable that is set but blank counts as unset, so a default can
    /// still apply. Every required key must end up non-blank; the first one
    /// that doesn't aborts with [`AgentError::MissingConfig`].
    pub fn assemble(spec: &ConfigSpec, env: &EnvSnapshot) -> Result<Self> {
        let mut values = BTreeMap::new();

        for (key, default) in &spec.defaults {
            let value = lookup(env, key)?.unwrap_or(default);
            values.insert(key.clone(), value.to_string());
        }

        for key in &spec.required {
            let value = lookup(env, key)?
                .or_else(|| spec.defaults.get(key).map(String::as_str))
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AgentError::MissingConfig { key: key.clone() })?;
            values.insert(key.clone(), value.to_string());
        }

        tracing::debug!(keys = values.len(), "Service config assembled");
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render a template that may only use config references
    pub fn render(&self, raw: &str, context: &str) -> Result<String> {
        RenderContext::config_only(self).render(raw, context)
    }
}

/// Non-blank value of `key`; a config value has to be text
fn lookup<'a>(env: &'a EnvSnapshot, key: &str) -> Result<Option<&'a str>> {
    match env.get(OsStr::new(key)) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| AgentError::InvalidConfig {
                key: key.to_string(),
                reason: "value is not valid UTF-8".to_string(),
            }),
    }
}
