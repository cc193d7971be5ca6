use std::fmt;

/// Version information baked in at compile time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub date: String,
}

impl BuildInfo {
    /// Build information of this binary.
    ///
    /// `GIT_AGE_COMMIT` and `GIT_AGE_BUILD_DATE` may be set when compiling.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("GIT_AGE_COMMIT").unwrap_or("unknown").to_string(),
            date: option_env!("GIT_AGE_BUILD_DATE").unwrap_or("unknown").to_string(),
        }
    }

    pub fn short(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "git-age {} (commit {}, built {})",
            self.version, self.commit, self.date
        )
    }
}
