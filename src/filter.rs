//! # Clean and Smudge
//!
//! Git runs the clean filter when content is staged and the smudge filter when
//! it is checked out:
//!
//! ```text
//! git add:      working tree ──clean──▶ index      (plaintext → envelope)
//! git checkout: index ──smudge──▶ working tree     (envelope → plaintext)
//! ```
//!
//! ## Diff Stability
//!
//! age draws a fresh file key for every encryption, so sealing unchanged
//! plaintext would produce new ciphertext and Git would report the file as
//! modified. Before sealing, [`clean`] decrypts the version committed at HEAD
//! and compares content hashes. When nothing changed the committed ciphertext
//! is emitted byte for byte.
//!
//! ## Plaintext Fallbacks
//!
//! - clean without recipients passes input through and warns
//! - smudge on input without the envelope header passes it through and warns
//! - a HEAD object without the header cannot serve as a baseline and is ignored

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::crypto::{Sealer, MAGIC_HEADER};
use crate::error::Result;
use crate::fsx::{self, ContentHash, PeekReader};
use crate::git::HeadObjectOpener;

/// What the clean filter emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// No recipients: input copied unchanged
    Plaintext,
    /// Content unchanged since HEAD: committed ciphertext re-emitted
    Unchanged,
    /// Freshly sealed envelope
    Sealed,
}

/// What the smudge filter emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmudgeOutcome {
    /// Input was not an envelope and was copied unchanged
    Plaintext,
    Decrypted,
}

/// The committed ciphertext of a path together with the hash of its plaintext
pub struct BaselineSnapshot {
    pub path: PathBuf,
    pub ciphertext: Vec<u8>,
    pub plaintext_hash: ContentHash,
}

impl BaselineSnapshot {
    /// Load the HEAD version of `path`.
    ///
    /// Returns `None` when nothing is committed at `path` or the committed
    /// object is not an envelope. Decryption failures are errors.
    pub fn load(sealer: &Sealer, head: &dyn HeadObjectOpener, path: &Path) -> Result<Option<Self>> {
        let Some(ciphertext) = head.open_object_at_head(path)? else {
            info!(path = %path.display(), "Could not compare file to HEAD, handling as new");
            return Ok(None);
        };

        if !Sealer::is_encrypted(&ciphertext) {
            warn!(path = %path.display(), "Expected encrypted file at HEAD but age header is missing");
            return Ok(None);
        }

        let plaintext_hash = fsx::hash_reader(sealer.open(ciphertext.as_slice())?)?;
        Ok(Some(Self {
            path: path.to_path_buf(),
            ciphertext,
            plaintext_hash,
        }))
    }
}

/// Turn the working tree content of `path` read from `input` into its stored form
pub fn clean<R: Read, W: Write>(
    sealer: &Sealer,
    head: &dyn HeadObjectOpener,
    path: &Path,
    mut input: R,
    mut output: W,
) -> Result<CleanOutcome> {
    if !sealer.can_seal() {
        warn!(path = %path.display(), "No recipients specified - file will be staged as plain text");
        io::copy(&mut input, &mut output)?;
        output.flush()?;
        return Ok(CleanOutcome::Plaintext);
    }

    debug!(path = %path.display(), "Copying file to temp");
    let mut buffered = fsx::copy_to_temp(input)?;

    if let Some(baseline) = BaselineSnapshot::load(sealer, head, path)? {
        let current_hash = fsx::hash_file(&mut buffered)?;
        debug!(
            path = %path.display(),
            orig_hash = %hex::encode(baseline.plaintext_hash),
            current_hash = %hex::encode(current_hash),
            "Compared file to HEAD"
        );

        if baseline.plaintext_hash == current_hash {
            info!(path = %path.display(), "File has not changed, returning original");
            output.write_all(&baseline.ciphertext)?;
            output.flush()?;
            return Ok(CleanOutcome::Unchanged);
        }
        info!(path = %path.display(), "File has changed since last commit");
    }

    seal_into(sealer, &mut buffered, &mut output)?;
    Ok(CleanOutcome::Sealed)
}

fn seal_into<W: Write>(sealer: &Sealer, plaintext: &mut File, output: &mut W) -> Result<()> {
    let mut writer = sealer.seal(&mut *output)?;
    io::copy(plaintext, &mut writer)?;
    writer.finish()?;
    output.flush()?;
    Ok(())
}

/// Turn stored content read from `input` back into working tree content
pub fn smudge<R: Read, W: Write>(sealer: &Sealer, input: R, mut output: W) -> Result<SmudgeOutcome> {
    let mut reader = PeekReader::new(input);

    if !Sealer::is_encrypted(reader.peek(MAGIC_HEADER.len())?) {
        warn!("Expected age-encrypted file, but got plaintext. Copying to stdout.");
        io::copy(&mut reader, &mut output)?;
        output.flush()?;
        return Ok(SmudgeOutcome::Plaintext);
    }

    let mut plaintext = sealer.open(reader)?;
    io::copy(&mut plaintext, &mut output)?;
    output.flush()?;
    Ok(SmudgeOutcome::Decrypted)
}
