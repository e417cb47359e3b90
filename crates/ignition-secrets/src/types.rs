//! Secret types
//!
//! Values are held in `secrecy` wrappers so they never show up in `Debug`
//! output or logs, and are zeroized when dropped.

use secrecy::{ExposeSecret, SecretBox};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// A credential read from a mounted file.
///
/// The value is an opaque byte string; it only has to be text where a
/// template filter needs it.
///
/// - Debug output shows `[REDACTED]` instead of the value
/// - Memory is zeroized on drop by `SecretBox`
pub struct Secret {
    name: String,
    source: PathBuf,
    inner: SecretBox<Vec<u8>>,
}

impl Secret {
    /// Create a new secret
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            inner: SecretBox::new(Box::new(value)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the value was read from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Expose the secret value for use.
    ///
    /// Only call this where the value is actually handed to a child process.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// The value as text, if it is valid UTF-8
    #[must_use]
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(self.expose()).ok()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.source.clone(), self.expose().to_vec())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl Zeroize for Secret {
    fn zeroize(&mut self) {
        // Dropping the old box wipes it.
        self.inner = SecretBox::new(Box::new(Vec::new()));
    }
}

/// All secrets loaded for one service, keyed by name
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    secrets: BTreeMap<String, Secret>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, secret: Secret) {
        self.secrets.insert(secret.name().to_string(), secret);
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.secrets.get(name)
    }

    /// Look up a value by name
    pub fn expose(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(Secret::expose)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Whether any non-empty secret has exactly this value
    pub fn contains_value(&self, value: &[u8]) -> bool {
        !value.is_empty() && self.secrets.values().any(|s| s.expose() == value)
    }
}

impl Zeroize for SecretSet {
    fn zeroize(&mut self) {
        for secret in self.secrets.values_mut() {
            secret.zeroize();
        }
        self.secrets.clear();
    }
}
