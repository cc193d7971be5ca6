use std::env;
use std::fs::OpenOptions;
use std::io::Write;

use git_age::error::Result;
use git_age::git::{GitRepo, Repository, GIT_ATTRIBUTES_FILE_NAME, TRACK_ATTRIBUTES};
use tracing::info;

use super::{ensure_clean_staging, reencrypt_and_commit, Context};

/// Print every file selected for encryption
pub fn list_files() -> Result<()> {
    let repo = GitRepo::discover(".")?;
    repo.walk_tracked_files(&mut |path| {
        println!("{}", path.display());
        Ok(())
    })
}

/// Select files matching `pattern` for encryption in the current directory
pub fn track_files(pattern: &str) -> Result<()> {
    // Makes sure we are inside a repository
    GitRepo::discover(".")?;

    let attributes = env::current_dir()?.join(GIT_ATTRIBUTES_FILE_NAME);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&attributes)?;
    writeln!(file, "{pattern} {TRACK_ATTRIBUTES}")?;

    info!(pattern, path = %attributes.display(), "Tracking files");
    Ok(())
}

/// Seal every tracked file again for the current recipients and commit
pub async fn reencrypt_files(ctx: &Context, message: &str) -> Result<()> {
    let repo = GitRepo::discover(".")?;
    ensure_clean_staging(&repo)?;

    let sealer = ctx.sealer(&repo).await?;
    reencrypt_and_commit(&repo, &sealer, message)
}
