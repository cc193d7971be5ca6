use std::path::Path;

use git_age::error::Result;
use git_age::git::{GitRepo, Repository};
use git_age::recipients::{RecipientsFile, RECIPIENTS_FILE_NAME};
use tracing::info;

use super::{ensure_clean_staging, reencrypt_and_commit, Context};

/// Grant `public_key` access to the repository and re-encrypt every tracked file
pub async fn add_recipient(
    ctx: &Context,
    public_key: &str,
    comment: &str,
    message: &str,
) -> Result<()> {
    let repo = GitRepo::discover(".")?;
    ensure_clean_staging(&repo)?;

    let mut sealer = ctx.sealer(&repo).await?;

    info!(recipient = %public_key, "Adding recipient");
    let added = RecipientsFile::new(repo.root()).append(public_key, comment)?;
    if added.is_empty() {
        info!(recipient = %public_key, "Recipient already present");
    }
    sealer.add_recipients(added);

    info!("Staging recipients file");
    repo.stage_file(Path::new(RECIPIENTS_FILE_NAME))?;

    reencrypt_and_commit(&repo, &sealer, message)
}
