use git_age::error::Result;
use git_age::git::GitRepo;
use git_age::identities::GenerateIdentity;
use git_age::recipients::RecipientsFile;
use tracing::info;

use super::Context;

/// Generate an identity and start the recipients file with its public key
pub async fn init(ctx: &Context, comment: &str, remote: &str) -> Result<()> {
    let repo = GitRepo::discover(".")?;
    let recipients = RecipientsFile::new(repo.root());

    if recipients.exists() {
        info!("Repository already initialized");
        return Ok(());
    }

    let chain = ctx.identity_chain().await?;
    let public_key = chain
        .generate(
            &ctx.cancel,
            &GenerateIdentity {
                comment: comment.to_string(),
                remote: remote.to_string(),
            },
        )
        .await?;

    recipients.append(&public_key, comment)?;
    info!(recipient = %public_key, "Initialized repository");

    println!("Initialized git-age with recipient {public_key}");
    println!("\nNext steps:");
    println!("1. Select files to encrypt, e.g. git-age files track '*.env'");
    println!("2. Commit .gitattributes and {}", git_age::recipients::RECIPIENTS_FILE_NAME);

    Ok(())
}
