//! Identities stored in a plain text file.
//!
//! ```text
//! # laptop
//! # public key: age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p
//! AGE-SECRET-KEY-1...
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{default_comment, GenerateIdentity, IdentitiesQuery, IdentitySource};
use crate::crypto::{parse_identities, Identity};
use crate::error::Result;

pub struct FileIdentitySource {
    path: PathBuf,
}

impl FileIdentitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<Identity>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_identities(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Identities file does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, identity: &Identity, comment: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(dir)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        let mut entry = String::new();
        for line in comment.lines() {
            entry.push_str(&format!("# {line}\n"));
        }
        entry.push_str(&format!("# public key: {}\n", identity.to_public()));
        entry.push_str(&identity.to_secret_string());
        entry.push('\n');

        file.write_all(entry.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

#[async_trait]
impl IdentitySource for FileIdentitySource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn is_valid(&self, _cancel: &CancellationToken) -> Result<bool> {
        Ok(!self.path.as_os_str().is_empty())
    }

    async fn identities(
        &self,
        _cancel: &CancellationToken,
        _query: &IdentitiesQuery,
    ) -> Result<Vec<Identity>> {
        self.load()
    }

    async fn generate(
        &self,
        _cancel: &CancellationToken,
        cmd: &GenerateIdentity,
    ) -> Result<String> {
        let identity = Identity::generate();
        let comment = if cmd.comment.is_empty() {
            default_comment()
        } else {
            cmd.comment.clone()
        };

        self.store(&identity, &comment)?;
        debug!(path = %self.path.display(), "Stored new identity");

        Ok(identity.to_public().to_string())
    }
}
