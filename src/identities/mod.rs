//! # Identity Resolution
//!
//! Private keys can live in several places at once: a local identities file,
//! the OS keyring, or a remote agent. Each backend is an [`IdentitySource`];
//! an [`IdentityChain`] holds the valid ones and queries them together.
//!
//! ## Lookup
//!
//! [`IdentityChain::identities`] spawns one task per source and waits for all
//! of them. The result carries every identity that was found together with the
//! joined errors of the sources that failed, so a broken agent does not hide
//! the keys in the local file. The caller decides whether partial results are
//! good enough.
//!
//! ## Generation
//!
//! [`IdentityChain::generate`] only asks the first source of the chain and
//! returns its answer as-is, without falling back to later sources.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{KeysLocation, Settings};
use crate::crypto::Identity;
use crate::error::{GitAgeError, Result};

pub mod agent;
pub mod file;
pub mod keyring;

pub use agent::AgentIdentitySource;
pub use file::FileIdentitySource;
pub use self::keyring::{KeyringBackend, KeyringIdentitySource, SystemKeyring};

/// Parameters of an identity lookup
#[derive(Debug, Clone, Default)]
pub struct IdentitiesQuery {
    /// URLs of the Git remotes of the current repository
    pub remotes: Vec<String>,
}

/// Parameters for generating a new identity
#[derive(Debug, Clone, Default)]
pub struct GenerateIdentity {
    pub comment: String,
    /// Remote the identity is scoped to, only meaningful for the agent
    pub remote: String,
}

/// A backend able to supply and create identities
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this source should be part of the chain at all
    async fn is_valid(&self, cancel: &CancellationToken) -> Result<bool>;

    /// Fetch all identities this source holds for `query`
    async fn identities(
        &self,
        cancel: &CancellationToken,
        query: &IdentitiesQuery,
    ) -> Result<Vec<Identity>>;

    /// Create and persist a new identity, returning its public key
    async fn generate(&self, cancel: &CancellationToken, cmd: &GenerateIdentity)
        -> Result<String>;
}

/// Outcome of a fan-out lookup
#[derive(Debug, Default)]
pub struct Resolution {
    /// Concatenation of every successful batch, in completion order
    pub identities: Vec<Identity>,
    /// Joined errors of the failing sources
    pub error: Option<GitAgeError>,
}

impl Resolution {
    /// Treat any failing source as fatal
    pub fn into_result(self) -> Result<Vec<Identity>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.identities),
        }
    }
}

/// Ordered set of valid identity sources
#[derive(Clone, Default)]
pub struct IdentityChain {
    sources: Vec<Arc<dyn IdentitySource>>,
}

impl IdentityChain {
    /// Build a chain from sources without checking them
    pub fn new(sources: Vec<Arc<dyn IdentitySource>>) -> Self {
        Self { sources }
    }

    /// Build a chain from the candidates that report themselves valid.
    ///
    /// Invalid sources are skipped; an error while checking validity aborts.
    pub async fn assemble(
        cancel: &CancellationToken,
        candidates: Vec<Arc<dyn IdentitySource>>,
    ) -> Result<Self> {
        let mut sources = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.is_valid(cancel).await? {
                debug!(source = candidate.name(), "Using identity source");
                sources.push(candidate);
            } else {
                debug!(source = candidate.name(), "Skipping invalid identity source");
            }
        }
        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Query every source concurrently and gather what they return
    pub async fn identities(
        &self,
        cancel: &CancellationToken,
        query: &IdentitiesQuery,
    ) -> Resolution {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let cancel = cancel.clone();
            let query = query.clone();
            tasks.spawn(async move {
                let result = source.identities(&cancel, &query).await;
                (source.name(), result)
            });
        }

        let mut identities = Vec::new();
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(batch))) => {
                    debug!(source = name, count = batch.len(), "Resolved identities");
                    identities.extend(batch);
                }
                Ok((name, Err(err))) => {
                    warn!(source = name, error = %err, "Identity source failed");
                    errors.push(err);
                }
                Err(err) => {
                    errors.push(GitAgeError::Other(format!(
                        "Identity source task failed: {err}"
                    )));
                }
            }
        }

        Resolution {
            identities,
            error: GitAgeError::join(errors),
        }
    }

    /// Generate a new identity with the first source of the chain
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        cmd: &GenerateIdentity,
    ) -> Result<String> {
        let source = self.sources.first().ok_or(GitAgeError::EmptyChain)?;
        source.generate(cancel, cmd).await
    }
}

/// Candidate sources for `settings`: the agent first, then the configured keys location
pub fn candidates(settings: &Settings) -> Result<Vec<Arc<dyn IdentitySource>>> {
    let mut sources: Vec<Arc<dyn IdentitySource>> = Vec::with_capacity(2);

    if let Some(host) = settings.agent_host.as_deref() {
        sources.push(Arc::new(AgentIdentitySource::new(host)?));
    }

    match settings.keys_location()? {
        KeysLocation::File(path) => sources.push(Arc::new(FileIdentitySource::new(path))),
        KeysLocation::Keyring(service) => {
            sources.push(Arc::new(KeyringIdentitySource::system(service)))
        }
    }

    Ok(sources)
}

/// Comment used when generating an identity without one
pub(crate) fn default_comment() -> String {
    format!("generated on {}", chrono::Local::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticSource {
        valid: bool,
        identities: Vec<Identity>,
        delay: Duration,
        generated: AtomicUsize,
    }

    impl StaticSource {
        fn new(identities: Vec<Identity>) -> Self {
            Self {
                valid: true,
                identities,
                delay: Duration::ZERO,
                generated: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentitySource for StaticSource {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn is_valid(&self, _cancel: &CancellationToken) -> Result<bool> {
            Ok(self.valid)
        }

        async fn identities(
            &self,
            _cancel: &CancellationToken,
            _query: &IdentitiesQuery,
        ) -> Result<Vec<Identity>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.identities.clone())
        }

        async fn generate(
            &self,
            _cancel: &CancellationToken,
            _cmd: &GenerateIdentity,
        ) -> Result<String> {
            self.generated.fetch_add(1, Ordering::SeqCst);
            Ok(Identity::generate().to_public().to_string())
        }
    }

    struct FailingSource {
        validity_error: bool,
    }

    #[async_trait]
    impl IdentitySource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn is_valid(&self, _cancel: &CancellationToken) -> Result<bool> {
            if self.validity_error {
                Err(GitAgeError::Agent("probe failed".into()))
            } else {
                Ok(true)
            }
        }

        async fn identities(
            &self,
            _cancel: &CancellationToken,
            _query: &IdentitiesQuery,
        ) -> Result<Vec<Identity>> {
            Err(GitAgeError::Agent("source unavailable".into()))
        }

        async fn generate(
            &self,
            _cancel: &CancellationToken,
            _cmd: &GenerateIdentity,
        ) -> Result<String> {
            Err(GitAgeError::Agent("cannot store identity".into()))
        }
    }

    fn public_keys(identities: &[Identity]) -> Vec<String> {
        let mut keys: Vec<String> = identities
            .iter()
            .map(|id| id.to_public().to_string())
            .collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_fan_out_partial_success() {
        let first = Identity::generate();
        let second = Identity::generate();
        let chain = IdentityChain::new(vec![
            Arc::new(StaticSource::new(vec![first.clone()])),
            Arc::new(FailingSource {
                validity_error: false,
            }),
            Arc::new(StaticSource::new(vec![second.clone()])),
        ]);

        let resolution = chain
            .identities(&CancellationToken::new(), &IdentitiesQuery::default())
            .await;

        assert_eq!(
            public_keys(&resolution.identities),
            public_keys(&[first, second])
        );
        let err = resolution.error.expect("failing source must be reported");
        assert!(err.to_string().contains("source unavailable"));
    }

    #[tokio::test]
    async fn test_fan_out_joins_all_errors() {
        let chain = IdentityChain::new(vec![
            Arc::new(FailingSource {
                validity_error: false,
            }),
            Arc::new(FailingSource {
                validity_error: false,
            }),
        ]);

        let resolution = chain
            .identities(&CancellationToken::new(), &IdentitiesQuery::default())
            .await;

        assert!(resolution.identities.is_empty());
        match resolution.error {
            Some(GitAgeError::Sources(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected joined errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fan_out_waits_for_slow_sources() {
        let fast = Identity::generate();
        let slow = Identity::generate();
        let mut slow_source = StaticSource::new(vec![slow.clone()]);
        slow_source.delay = Duration::from_millis(50);

        let chain = IdentityChain::new(vec![
            Arc::new(slow_source),
            Arc::new(StaticSource::new(vec![fast.clone()])),
        ]);

        let identities = chain
            .identities(&CancellationToken::new(), &IdentitiesQuery::default())
            .await
            .into_result()
            .unwrap();

        assert_eq!(public_keys(&identities), public_keys(&[fast, slow]));
    }

    #[tokio::test]
    async fn test_empty_chain_resolves_nothing() {
        let chain = IdentityChain::default();
        let identities = chain
            .identities(&CancellationToken::new(), &IdentitiesQuery::default())
            .await
            .into_result()
            .unwrap();
        assert!(identities.is_empty());
    }

    #[tokio::test]
    async fn test_assemble_skips_invalid_sources() {
        let mut invalid = StaticSource::new(Vec::new());
        invalid.valid = false;

        let chain = IdentityChain::assemble(
            &CancellationToken::new(),
            vec![
                Arc::new(invalid),
                Arc::new(StaticSource::new(Vec::new())),
            ],
        )
        .await
        .unwrap();

        assert_eq!(chain.len(), 1);
    }

    #[tokio::test]
    async fn test_assemble_propagates_probe_errors() {
        let result = IdentityChain::assemble(
            &CancellationToken::new(),
            vec![
                Arc::new(StaticSource::new(Vec::new())),
                Arc::new(FailingSource {
                    validity_error: true,
                }),
            ],
        )
        .await;

        assert!(matches!(result, Err(GitAgeError::Agent(_))));
    }

    #[tokio::test]
    async fn test_generate_uses_first_source_only() {
        let first = Arc::new(StaticSource::new(Vec::new()));
        let second = Arc::new(StaticSource::new(Vec::new()));
        let chain = IdentityChain::new(vec![first.clone(), second.clone()]);

        let public_key = chain
            .generate(&CancellationToken::new(), &GenerateIdentity::default())
            .await
            .unwrap();

        assert!(public_key.starts_with("age1"));
        assert_eq!(first.generated.load(Ordering::SeqCst), 1);
        assert_eq!(second.generated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_does_not_fall_back() {
        let fallback = Arc::new(StaticSource::new(Vec::new()));
        let chain = IdentityChain::new(vec![
            Arc::new(FailingSource {
                validity_error: false,
            }),
            fallback.clone(),
        ]);

        let result = chain
            .generate(&CancellationToken::new(), &GenerateIdentity::default())
            .await;

        assert!(result.is_err());
        assert_eq!(fallback.generated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_candidates_put_agent_first() {
        let settings = Settings {
            keys: "/tmp/keys.txt".into(),
            agent_host: Some("http://localhost:3000".into()),
            keyring_service: "git-age".into(),
        };

        let names: Vec<&str> = candidates(&settings)
            .unwrap()
            .iter()
            .map(|source| source.name())
            .collect();
        assert_eq!(names, vec!["agent", "file"]);
    }

    #[test]
    fn test_candidates_keyring_location() {
        let settings = Settings {
            keys: "keychain://team".into(),
            agent_host: None,
            keyring_service: "git-age".into(),
        };

        let names: Vec<&str> = candidates(&settings)
            .unwrap()
            .iter()
            .map(|source| source.name())
            .collect();
        assert_eq!(names, vec!["keyring"]);
    }

    #[tokio::test]
    async fn test_generate_on_empty_chain_fails() {
        let result = IdentityChain::default()
            .generate(&CancellationToken::new(), &GenerateIdentity::default())
            .await;
        assert!(matches!(result, Err(GitAgeError::EmptyChain)));
    }
}
