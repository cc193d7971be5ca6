//! # Recipients File
//!
//! The project's public recipient list lives in `.agerecipients` at the
//! repository root and is committed alongside the encrypted files.
//!
//! ```text
//! # alice
//! age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p
//! # bob
//! ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIHsKLqeplhpW+uObz5dvMgjz1OxfM/XXUB+VHtZ6isGN
//! ```
//!
//! Appending is idempotent: a key already present is never written twice.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::crypto::{parse_recipients, Recipient};
use crate::error::{GitAgeError, Result};

/// File name of the recipients list at the repository root
pub const RECIPIENTS_FILE_NAME: &str = ".agerecipients";

pub struct RecipientsFile {
    path: PathBuf,
}

impl RecipientsFile {
    /// Recipients file of the repository rooted at `repo_root`
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            path: repo_root.as_ref().join(RECIPIENTS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// All recipients in file order; a missing file yields none
    pub fn all(&self) -> Result<Vec<Recipient>> {
        match self.read()? {
            Some(text) => parse_recipients(&text),
            None => Ok(Vec::new()),
        }
    }

    /// Append a single `public_key` (preceded by `# comment` if given) unless already present.
    ///
    /// Returns the recipients that were added, empty when the key was already listed.
    /// Input holding several keys is rejected.
    pub fn append(&self, public_key: &str, comment: &str) -> Result<Vec<Recipient>> {
        let public_key = public_key.trim();
        let added = parse_recipients(public_key)
            .map_err(|e| GitAgeError::Parse(format!("Failed to parse public key: {e}")))?;
        let recipient = match added.as_slice() {
            [] => return Err(GitAgeError::Parse("No public key given".into())),
            [recipient] => recipient.clone(),
            _ => {
                return Err(GitAgeError::Parse(format!(
                    "Expected a single public key, got {}",
                    added.len()
                )))
            }
        };

        let existing_text = self.read()?.unwrap_or_default();
        let existing = parse_recipients(&existing_text)?;
        if existing.contains(&recipient) {
            debug!(recipient = public_key, "Recipient already present");
            return Ok(Vec::new());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if !existing_text.is_empty() && !existing_text.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        if !comment.is_empty() {
            for line in comment.lines() {
                writeln!(file, "# {line}")?;
            }
        }
        writeln!(file, "{public_key}")?;

        Ok(vec![recipient])
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
