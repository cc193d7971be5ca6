//! # git-age
//!
//! Transparent encryption of files in a git repository with [age](https://age-encryption.org).
//!
//! ## Features
//!
//! - **Transparent Encryption**: Files are encrypted when staged and decrypted when checked out
//! - **Public Key Recipients**: Every team member has their own key; no shared secret to pass around
//! - **Stable Diffs**: Unchanged files keep their committed ciphertext, so `git status` stays clean
//! - **Several Key Stores**: Identities can live in a file, the OS keyring, or a remote agent
//! - **Re-encryption**: Adding a recipient re-seals every tracked file in a single commit
//!
//! ## Quick Start
//!
//! ### Installation
//!
//! ```bash
//! cargo install --path .
//!
//! # Register the filter driver in the global git config
//! git-age install
//! ```
//!
//! ### Basic Usage
//!
//! ```bash
//! # Generate an identity and add its public key to .agerecipients
//! git-age init
//!
//! # Select the files to encrypt
//! git-age files track '*.env'
//! git add .gitattributes .agerecipients
//! git commit -m "Configure git-age"
//!
//! # Encrypted files are committed like any other file
//! echo "API_KEY=secret" > .env
//! git add .env
//! git commit -m "Add secrets"
//! ```
//!
//! ### Granting Access
//!
//! ```bash
//! # The new team member shares their public key
//! git-age keys generate
//!
//! # Someone with access adds it; every tracked file is re-encrypted and committed
//! git-age add-recipient age1...
//! ```
//!
//! ## How It Works
//!
//! ```text
//! git add:      working tree ──clean──▶ index      (plaintext → age envelope)
//! git checkout: index ──smudge──▶ working tree     (age envelope → plaintext)
//! ```
//!
//! Files are selected through `.gitattributes`:
//!
//! ```text
//! *.env filter=age diff=age merge=age -text
//! ```
//!
//! Recipients (public keys) are stored in `.agerecipients` at the repository root and
//! committed. Identities (private keys) never enter the repository; they are resolved
//! from every configured source at once:
//!
//! | Source  | Selected by                                             |
//! |---------|---------------------------------------------------------|
//! | agent   | `GIT_AGE_AGENT_HOST`                                    |
//! | file    | `--keys PATH`, default `<config dir>/git-age/keys.txt`   |
//! | keyring | `--keys keychain://SERVICE`                             |
//!
//! ## Module Overview
//!
//! - [`crypto`] - Recipients, identities and the [`Sealer`](crypto::Sealer) envelope abstraction
//! - [`recipients`] - The `.agerecipients` file
//! - [`identities`] - Identity sources and the concurrent resolution chain
//! - [`filter`] - Clean and smudge
//! - [`reencrypt`] - Re-sealing every tracked file
//! - [`git`] - Repository access
//! - [`fsx`] - Hashing, temp files and stream helpers
//! - [`config`] - Settings from file and environment
//! - [`version`] - Build information
//! - [`error`] - Error types and unified error handling
//!
//! ## Commands
//!
//! - `install` - Register the `age` filter driver in the global git config
//! - `init` - Generate an identity and create `.agerecipients`
//! - `keys generate|list` - Manage identities
//! - `add-recipient PUBKEY` - Grant access and re-encrypt
//! - `files list|track|re-encrypt` - Manage encrypted files
//! - `clean FILE` / `smudge FILE` - Filter driver, invoked by git
//! - `version [--short]` - Print build information
//!
//! ## Logging
//!
//! Logs go to stderr, since stdout carries file content while git runs the filters.
//! The level defaults to `info` and can be changed with `RUST_LOG` or `--log-level`.

pub mod config;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod fsx;
pub mod git;
pub mod identities;
pub mod recipients;
pub mod reencrypt;
pub mod version;

// Re-export commonly used types
pub use crypto::{Identity, Recipient, Sealer};
pub use error::{GitAgeError, Result};
pub use git::GitRepo;
pub use identities::IdentityChain;
pub use recipients::RecipientsFile;
