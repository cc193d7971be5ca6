//! # Sealing and Opening
//!
//! This module wraps the age file format behind a small envelope abstraction.
//!
//! ## Envelope Format
//!
//! ```text
//! [age-encryption.org/v1\n][recipient stanzas][header MAC][STREAM payload]
//! ```
//!
//! The first line is a fixed magic header. It is peeked before any decrypt
//! attempt; content without it is treated as plaintext, never as a failure.
//!
//! ## Key Types
//!
//! - [`Recipient`]: public keys new ciphertext is sealed for (`age1…` X25519
//!   keys and `ssh-ed25519`/`ssh-rsa` public keys)
//! - [`Identity`]: private keys able to open envelopes (`AGE-SECRET-KEY-1…`)
//!
//! Every age encryption draws a fresh file key, so sealing the same plaintext
//! twice never yields the same bytes.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use age::secrecy::ExposeSecret;
use age::stream::{StreamReader, StreamWriter};
use age::{Decryptor, Encryptor};

use crate::error::{GitAgeError, Result};

/// Magic header every age envelope starts with
pub const MAGIC_HEADER: &[u8] = b"age-encryption.org/v1\n";

/// A public key new ciphertext is sealed for
#[derive(Clone)]
pub enum Recipient {
    X25519(age::x25519::Recipient),
    Ssh(age::ssh::Recipient),
}

impl Recipient {
    /// Parse a single public key
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if input.starts_with("age1") {
            age::x25519::Recipient::from_str(input)
                .map(Recipient::X25519)
                .map_err(|e| GitAgeError::Parse(format!("Invalid X25519 recipient: {e}")))
        } else if input.starts_with("ssh-") {
            age::ssh::Recipient::from_str(input)
                .map(Recipient::Ssh)
                .map_err(|e| GitAgeError::Parse(format!("Invalid SSH recipient: {e:?}")))
        } else {
            Err(GitAgeError::Parse(format!(
                "Unknown recipient type: {input}"
            )))
        }
    }

    fn as_age(&self) -> &dyn age::Recipient {
        match self {
            Recipient::X25519(recipient) => recipient as &dyn age::Recipient,
            Recipient::Ssh(recipient) => recipient as &dyn age::Recipient,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::X25519(recipient) => write!(f, "{recipient}"),
            Recipient::Ssh(recipient) => write!(f, "{recipient}"),
        }
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::X25519(_) => write!(f, "Recipient::X25519({self})"),
            Recipient::Ssh(_) => write!(f, "Recipient::Ssh({self})"),
        }
    }
}

impl PartialEq for Recipient {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// A private key able to open envelopes sealed for its paired recipient
#[derive(Clone)]
pub enum Identity {
    X25519(age::x25519::Identity),
}

impl Identity {
    /// Generate a new random X25519 identity
    pub fn generate() -> Self {
        Identity::X25519(age::x25519::Identity::generate())
    }

    /// Parse a single private key
    pub fn parse(input: &str) -> Result<Self> {
        age::x25519::Identity::from_str(input.trim())
            .map(Identity::X25519)
            .map_err(|e| GitAgeError::Parse(format!("Invalid X25519 identity: {e}")))
    }

    /// The recipient paired with this identity
    pub fn to_public(&self) -> Recipient {
        match self {
            Identity::X25519(identity) => Recipient::X25519(identity.to_public()),
        }
    }

    /// Encoded private key, suitable for writing to a key store
    pub fn to_secret_string(&self) -> String {
        match self {
            Identity::X25519(identity) => identity.to_string().expose_secret().to_string(),
        }
    }

    fn as_age(&self) -> &dyn age::Identity {
        match self {
            Identity::X25519(identity) => identity as &dyn age::Identity,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private key material
        write!(f, "Identity({})", self.to_public())
    }
}

/// Parse recipients text: `#` comment lines, blank lines and one key per line
pub fn parse_recipients(text: &str) -> Result<Vec<Recipient>> {
    parse_lines(text, Recipient::parse)
}

/// Parse identities text: `#` comment lines, blank lines and one key per line
pub fn parse_identities(text: &str) -> Result<Vec<Identity>> {
    parse_lines(text, Identity::parse)
}

fn parse_lines<T>(text: &str, parse: impl Fn(&str) -> Result<T>) -> Result<Vec<T>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            parse(line).map_err(|e| match e {
                GitAgeError::Parse(msg) => GitAgeError::Parse(format!("line {line_no}: {msg}")),
                other => other,
            })
        })
        .collect()
}

/// Seals plaintext for a recipient set and opens envelopes with an identity set.
///
/// Both sets are gathered before any file bytes are processed; the streams
/// handed out by [`Sealer::seal`] and [`Sealer::open`] capture them as they
/// were at that moment.
#[derive(Clone, Default)]
pub struct Sealer {
    recipients: Vec<Recipient>,
    identities: Vec<Identity>,
}

impl Sealer {
    pub fn new(recipients: Vec<Recipient>, identities: Vec<Identity>) -> Self {
        Self {
            recipients,
            identities,
        }
    }

    pub fn add_recipients(&mut self, recipients: impl IntoIterator<Item = Recipient>) {
        self.recipients.extend(recipients);
    }

    pub fn add_identities(&mut self, identities: impl IntoIterator<Item = Identity>) {
        self.identities.extend(identities);
    }

    /// True iff at least one recipient is configured
    pub fn can_seal(&self) -> bool {
        !self.recipients.is_empty()
    }

    /// True iff at least one identity is configured
    pub fn can_open(&self) -> bool {
        !self.identities.is_empty()
    }

    /// Check whether peeked bytes start with the envelope magic header
    pub fn is_encrypted(peeked: &[u8]) -> bool {
        peeked.len() >= MAGIC_HEADER.len() && &peeked[..MAGIC_HEADER.len()] == MAGIC_HEADER
    }

    /// Wrap `dst` in a writer that seals everything written to it.
    ///
    /// The envelope is only complete once [`StreamWriter::finish`] is called.
    pub fn seal<W: Write>(&self, dst: W) -> Result<StreamWriter<W>> {
        if !self.can_seal() {
            return Err(GitAgeError::Encryption("No recipients configured".into()));
        }

        let encryptor = Encryptor::with_recipients(self.recipients.iter().map(Recipient::as_age))
            .map_err(|e| GitAgeError::Encryption(format!("age encryption failed: {e}")))?;

        encryptor.wrap_output(dst).map_err(GitAgeError::from)
    }

    /// Wrap `src` in a reader yielding the plaintext of the envelope it contains
    pub fn open<R: Read>(&self, src: R) -> Result<StreamReader<R>> {
        if !self.can_open() {
            return Err(GitAgeError::Decryption("No identities configured".into()));
        }

        let decryptor = Decryptor::new(src).map_err(map_decrypt_err)?;
        decryptor
            .decrypt(self.identities.iter().map(Identity::as_age))
            .map_err(map_decrypt_err)
    }
}

fn map_decrypt_err(err: age::DecryptError) -> GitAgeError {
    GitAgeError::Decryption(format!("age decryption failed: {err}"))
}
