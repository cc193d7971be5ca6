use git_age::error::Result;
use git_age::git::{global_config_path, install_filter_driver};
use tracing::info;

/// Register the `age` filter driver in the global git config
pub fn install() -> Result<()> {
    let path = global_config_path()?;

    if install_filter_driver(&path, "git-age")? {
        info!(path = %path.display(), "Installed git-age filter");
        println!("Configured git-age filter in {}", path.display());
    } else {
        info!("git-age already installed");
    }
    Ok(())
}
