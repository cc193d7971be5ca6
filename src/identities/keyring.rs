//! Identities stored in the OS keyring.
//!
//! Every identity is one credential keyed by its public key within a service.
//! Platform keyrings cannot enumerate their entries, so a separate index
//! credential of the same service lists the stored keys one per line, each
//! followed by a tab and its description.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{default_comment, GenerateIdentity, IdentitiesQuery, IdentitySource};
use crate::crypto::Identity;
use crate::error::{GitAgeError, Result};

/// Account name of the index credential
const INDEX_KEY: &str = "git-age:index";

/// Secret storage scoped to a single service
pub trait KeyringBackend: Send + Sync {
    fn list(&self) -> Result<Vec<String>>;
    fn get(&self, key: &str) -> Result<String>;
    fn set(&self, key: &str, secret: &str, description: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// The platform keyring
pub struct SystemKeyring {
    service: String,
}

impl SystemKeyring {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<::keyring::Entry> {
        ::keyring::Entry::new(&self.service, key).map_err(|e| GitAgeError::Keyring(e.to_string()))
    }

    fn read_index(&self) -> Result<Vec<(String, String)>> {
        match self.entry(INDEX_KEY)?.get_password() {
            Ok(index) => Ok(parse_index(&index)),
            Err(::keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(GitAgeError::Keyring(e.to_string())),
        }
    }

    fn write_index(&self, index: &[(String, String)]) -> Result<()> {
        let entry = self.entry(INDEX_KEY)?;
        if index.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(GitAgeError::Keyring(e.to_string())),
            };
        }
        entry
            .set_password(&format_index(index))
            .map_err(|e| GitAgeError::Keyring(e.to_string()))
    }
}

fn parse_index(index: &str) -> Vec<(String, String)> {
    index
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once('\t') {
            Some((key, description)) => (key.to_string(), description.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

fn format_index(index: &[(String, String)]) -> String {
    index
        .iter()
        .map(|(key, description)| format!("{key}\t{}", description.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

impl KeyringBackend for SystemKeyring {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.read_index()?.into_iter().map(|(key, _)| key).collect())
    }

    fn get(&self, key: &str) -> Result<String> {
        self.entry(key)?
            .get_password()
            .map_err(|e| GitAgeError::Keyring(format!("{key}: {e}")))
    }

    fn set(&self, key: &str, secret: &str, description: &str) -> Result<()> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| GitAgeError::Keyring(e.to_string()))?;

        let mut index = self.read_index()?;
        index.retain(|(existing, _)| existing != key);
        index.push((key.to_string(), description.to_string()));
        self.write_index(&index)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(::keyring::Error::NoEntry) => {}
            Err(e) => return Err(GitAgeError::Keyring(e.to_string())),
        }

        let mut index = self.read_index()?;
        index.retain(|(existing, _)| existing != key);
        self.write_index(&index)
    }
}

pub struct KeyringIdentitySource {
    service: String,
    backend: Arc<dyn KeyringBackend>,
}

impl KeyringIdentitySource {
    /// Source backed by the platform keyring under `service`
    pub fn system(service: impl Into<String>) -> Self {
        let service = service.into();
        let backend = Arc::new(SystemKeyring::new(service.clone()));
        Self { service, backend }
    }

    pub fn with_backend(service: impl Into<String>, backend: Arc<dyn KeyringBackend>) -> Self {
        Self {
            service: service.into(),
            backend,
        }
    }
}

fn load_identities(backend: &dyn KeyringBackend) -> Result<Vec<Identity>> {
    backend
        .list()?
        .iter()
        .map(|key| {
            let secret = backend.get(key)?;
            Identity::parse(secret.trim())
        })
        .collect()
}

#[async_trait]
impl IdentitySource for KeyringIdentitySource {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn is_valid(&self, _cancel: &CancellationToken) -> Result<bool> {
        Ok(!self.service.is_empty())
    }

    async fn identities(
        &self,
        _cancel: &CancellationToken,
        _query: &IdentitiesQuery,
    ) -> Result<Vec<Identity>> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || load_identities(backend.as_ref()))
            .await
            .map_err(|e| GitAgeError::Keyring(format!("Keyring task failed: {e}")))?
    }

    async fn generate(
        &self,
        _cancel: &CancellationToken,
        cmd: &GenerateIdentity,
    ) -> Result<String> {
        let identity = Identity::generate();
        let public_key = identity.to_public().to_string();
        let comment = if cmd.comment.is_empty() {
            default_comment()
        } else {
            cmd.comment.clone()
        };

        let backend = Arc::clone(&self.backend);
        let key = public_key.clone();
        tokio::task::spawn_blocking(move || {
            backend.set(&key, &identity.to_secret_string(), &comment)
        })
        .await
        .map_err(|e| GitAgeError::Keyring(format!("Keyring task failed: {e}")))??;

        debug!(service = %self.service, "Stored new identity in keyring");
        Ok(public_key)
    }
}
