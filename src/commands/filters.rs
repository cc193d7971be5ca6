use std::io::{self, BufWriter, IsTerminal};
use std::path::Path;

use git_age::crypto::Sealer;
use git_age::error::{GitAgeError, Result};
use git_age::filter;
use git_age::git::GitRepo;
use tracing::debug;

use super::Context;

/// The filter protocol always pipes content in
fn require_stdin() -> Result<()> {
    if io::stdin().is_terminal() {
        return Err(GitAgeError::StdinIsTerminal);
    }
    Ok(())
}

/// Clean filter implementation (called by git during add)
pub async fn clean(ctx: &Context, file: &Path) -> Result<()> {
    require_stdin()?;

    let repo = GitRepo::discover(".")?;
    let sealer = ctx.sealer(&repo).await?;
    let path = repo.relative(file);

    let outcome = filter::clean(
        &sealer,
        &repo,
        &path,
        io::stdin().lock(),
        BufWriter::new(io::stdout().lock()),
    )?;
    debug!(path = %path.display(), ?outcome, "Cleaned file");
    Ok(())
}

/// Smudge filter implementation (called by git during checkout)
pub async fn smudge(ctx: &Context, file: &Path) -> Result<()> {
    require_stdin()?;

    let repo = GitRepo::discover(".")?;
    let identities = ctx.identities(repo.remotes()?).await?;
    let sealer = Sealer::new(Vec::new(), identities);

    let outcome = filter::smudge(
        &sealer,
        io::stdin().lock(),
        BufWriter::new(io::stdout().lock()),
    )?;
    debug!(path = %file.display(), ?outcome, "Smudged file");
    Ok(())
}
