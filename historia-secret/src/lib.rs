#![deny(missing_docs)]
//! Where the historia chat client gets its API key from.
//!
//! `historia-chat` asks a [`CredentialProvider`] for the bearer token once per
//! request, just before the `Authorization` header is built. Where the key
//! comes from is decided here, so the client only ever sees a [`SecretValue`].
//!
//! A resolved key can be read only inside [`SecretValue::with_bytes`], which is
//! how the transport copies it into a sensitive header value. The buffer is
//! wiped when the value drops.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors from credential resolution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential is configured.
    #[error("credential missing: {0}")]
    Missing(String),

    /// The backing store could not be read.
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// A resolved API key.
///
/// Prints as `[REDACTED]` and has no `Clone`, `Display` or serde impls; the
/// bytes are zeroed on drop.
pub struct SecretValue {
    key: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    /// Take ownership of `key` without copying it.
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Run `f` with the raw key bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.key)
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.key.len()
    }

    /// Whether the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Supplies the bearer credential for outbound requests.
///
/// Implementations must be cheap to call repeatedly: the client asks once per
/// request and does not cache the result.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the current credential.
    async fn credential(&self) -> Result<SecretValue, CredentialError>;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn credential(&self) -> Result<SecretValue, CredentialError> {
        (**self).credential().await
    }
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Box<T> {
    async fn credential(&self) -> Result<SecretValue, CredentialError> {
        (**self).credential().await
    }
}

/// A provider that always returns the same credential.
pub struct StaticCredential {
    token: Zeroizing<Vec<u8>>,
}

impl StaticCredential {
    /// Create with a fixed credential.
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<SecretValue, CredentialError> {
        if self.token.is_empty() {
            return Err(CredentialError::Missing("static credential is empty".into()));
        }
        Ok(SecretValue::new(self.token.to_vec()))
    }
}

/// Reads the credential from a process environment variable on every call.
///
/// An unset or empty variable is reported as [`CredentialError::Missing`].
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var_name: String,
}

impl EnvCredential {
    /// Read from the named environment variable.
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }

    /// The environment variable this provider reads.
    pub fn var_name(&self) -> &str {
        &self.var_name
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn credential(&self) -> Result<SecretValue, CredentialError> {
        match std::env::var(&self.var_name) {
            Ok(val) if !val.trim().is_empty() => Ok(SecretValue::new(val.into_bytes())),
            Ok(_) => Err(CredentialError::Missing(format!(
                "env var {} is empty",
                self.var_name
            ))),
            Err(std::env::VarError::NotPresent) => Err(CredentialError::Missing(format!(
                "env var {} not set",
                self.var_name
            ))),
            Err(std::env::VarError::NotUnicode(_)) => Err(CredentialError::Backend(format!(
                "env var {} is not valid unicode",
                self.var_name
            ))),
        }
    }
}

/// Tries providers in order until one succeeds.
///
/// If every provider fails, the last error is returned. An empty chain reports
/// [`CredentialError::Missing`].
#[derive(Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the chain.
    pub fn with(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }
}

#[async_trait]
impl CredentialProvider for CredentialChain {
    async fn credential(&self) -> Result<SecretValue, CredentialError> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.credential().await {
                Ok(value) => return Ok(value),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| CredentialError::Missing("no credential providers configured".into())))
    }
}
