pub mod add_recipient;
pub mod files;
pub mod filters;
pub mod init;
pub mod install;
pub mod keys;
pub mod version;

pub use add_recipient::add_recipient;
pub use files::{list_files, reencrypt_files, track_files};
pub use filters::{clean, smudge};
pub use init::init;
pub use install::install;
pub use keys::{generate_key, list_keys};
pub use version::version;

use git_age::config::Settings;
use git_age::crypto::{Identity, Sealer};
use git_age::error::{GitAgeError, Result};
use git_age::git::{GitRepo, Repository};
use git_age::identities::{self, IdentitiesQuery, IdentityChain};
use git_age::recipients::RecipientsFile;
use git_age::reencrypt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// State shared by every command of one invocation
pub struct Context {
    /// `--keys` from the command line
    pub keys: Option<String>,
    pub cancel: CancellationToken,
}

impl Context {
    /// Settings are only loaded by commands that resolve identities
    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings::load()?.with_keys(self.keys.clone()))
    }

    /// Chain of the identity sources that are usable right now
    pub async fn identity_chain(&self) -> Result<IdentityChain> {
        let settings = self.settings()?;
        IdentityChain::assemble(&self.cancel, identities::candidates(&settings)?).await
    }

    /// All identities available for `remotes`.
    ///
    /// Failing sources are tolerated as long as another source delivered identities.
    pub async fn identities(&self, remotes: Vec<String>) -> Result<Vec<Identity>> {
        let chain = self.identity_chain().await?;
        let resolution = chain
            .identities(&self.cancel, &IdentitiesQuery { remotes })
            .await;

        match resolution.error {
            Some(err) if resolution.identities.is_empty() => Err(err),
            Some(err) => {
                warn!(error = %err, "Some identity sources failed");
                Ok(resolution.identities)
            }
            None => Ok(resolution.identities),
        }
    }

    /// Sealer with the repository's recipients and every identity for its remotes
    pub async fn sealer(&self, repo: &GitRepo) -> Result<Sealer> {
        let recipients = RecipientsFile::new(repo.root()).all()?;
        let identities = self.identities(repo.remotes()?).await?;
        Ok(Sealer::new(recipients, identities))
    }
}

/// Refuse to run when unrelated changes are already staged
fn ensure_clean_staging(repo: &dyn Repository) -> Result<()> {
    if repo.is_staging_dirty()? {
        return Err(GitAgeError::DirtyStaging);
    }
    Ok(())
}

/// Re-encrypt every tracked file with `sealer` and commit the result.
///
/// Whatever was staged is committed even if some paths failed; the failures
/// are returned afterwards.
fn reencrypt_and_commit(repo: &GitRepo, sealer: &Sealer, message: &str) -> Result<()> {
    let report = reencrypt::reencrypt_tracked_files(repo, repo.root(), sealer)?;
    info!(
        reencrypted = report.reencrypted.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "Re-encrypted tracked files"
    );

    if repo.is_staging_dirty()? {
        info!("Committing changes");
        repo.commit(message)?;
    } else {
        info!("Nothing to commit");
    }

    report.into_result()
}
