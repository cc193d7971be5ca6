use git_age::error::Result;
use git_age::version::BuildInfo;

/// Print the version, or all build information unless `short`
pub fn version(info: &BuildInfo, short: bool) -> Result<()> {
    if short {
        println!("{}", info.short());
    } else {
        println!("{info}");
    }
    Ok(())
}
