//! User settings.
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. `<config dir>/git-age/config.toml`
//! 3. `GIT_AGE_KEYS`, `GIT_AGE_AGENT_HOST`, `GIT_AGE_KEYRING_SERVICE`
//! 4. command line flags, applied by the caller
//!
//! ```toml
//! keys = "keychain://git-age"
//! agent_host = "http://localhost:3000"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::{GitAgeError, Result};

const ENV_PREFIX: &str = "GIT_AGE_";
const APP_DIR: &str = "git-age";
const CONFIG_FILE: &str = "config.toml";
const KEYS_FILE: &str = "keys.txt";
const DEFAULT_KEYRING_SERVICE: &str = "git-age";

const FILE_SCHEME: &str = "file://";
const KEYCHAIN_SCHEME: &str = "keychain://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Location of the local identities, see [`KeysLocation`]
    pub keys: String,
    /// Base URL of the remote agent
    pub agent_host: Option<String>,
    /// Keyring service used by `keychain://` without an explicit service
    pub keyring_service: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    keys: Option<String>,
    agent_host: Option<String>,
    keyring_service: Option<String>,
}

/// Where the local identities live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeysLocation {
    File(PathBuf),
    Keyring(String),
}

impl Settings {
    /// Load settings from the user's config directory and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(dirs::config_dir().as_deref())
    }

    /// Load settings with `config_dir` as the base configuration directory
    pub fn load_from(config_dir: Option<&Path>) -> Result<Self> {
        let app_dir = config_dir.map(|dir| dir.join(APP_DIR));

        let mut settings = Settings {
            keys: app_dir
                .as_ref()
                .map(|dir| dir.join(KEYS_FILE).to_string_lossy().into_owned())
                .unwrap_or_default(),
            agent_host: None,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        };

        if let Some(config_path) = app_dir.map(|dir| dir.join(CONFIG_FILE)) {
            if config_path.exists() {
                settings.merge(read_file(&config_path)?);
            }
        }

        // Apply environment variable overrides manually
        settings.merge(FileSettings {
            keys: env::var(format!("{ENV_PREFIX}KEYS")).ok(),
            agent_host: env::var(format!("{ENV_PREFIX}AGENT_HOST")).ok(),
            keyring_service: env::var(format!("{ENV_PREFIX}KEYRING_SERVICE")).ok(),
        });

        settings.agent_host = settings
            .agent_host
            .map(|host| expand_env(&host))
            .filter(|host| !host.is_empty());

        Ok(settings)
    }

    /// Replace the keys location if given on the command line
    pub fn with_keys(mut self, keys: Option<String>) -> Self {
        if let Some(keys) = keys {
            self.keys = keys;
        }
        self
    }

    pub fn keys_location(&self) -> Result<KeysLocation> {
        KeysLocation::parse(&self.keys, &self.keyring_service)
    }

    fn merge(&mut self, layer: FileSettings) {
        if let Some(keys) = layer.keys {
            self.keys = keys;
        }
        if let Some(agent_host) = layer.agent_host {
            self.agent_host = Some(agent_host);
        }
        if let Some(service) = layer.keyring_service {
            self.keyring_service = service;
        }
    }
}

fn read_file(path: &Path) -> Result<FileSettings> {
    let path_str = path
        .to_str()
        .ok_or_else(|| GitAgeError::Config(format!("Invalid config path: {}", path.display())))?;

    Config::builder()
        .add_source(File::new(path_str, FileFormat::Toml))
        .build()
        .and_then(|cfg| cfg.try_deserialize::<FileSettings>())
        .map_err(|err| GitAgeError::Config(format!("Failed to load config file: {err}")))
}

impl KeysLocation {
    /// Parse `path`, `file://path` or `keychain://service`
    pub fn parse(raw: &str, default_service: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(service) = raw.strip_prefix(KEYCHAIN_SCHEME) {
            let service = if service.is_empty() {
                default_service
            } else {
                service
            };
            return Ok(KeysLocation::Keyring(service.to_string()));
        }

        let path = raw.strip_prefix(FILE_SCHEME).unwrap_or(raw);
        if path.is_empty() {
            return Err(GitAgeError::Config(
                "No keys location configured; pass --keys or set GIT_AGE_KEYS".into(),
            ));
        }
        Ok(KeysLocation::File(PathBuf::from(path)))
    }
}

/// Replace `$VAR` and `${VAR}` with environment values; unset variables expand to nothing
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name: String = match chars.peek() {
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    out.push_str("${");
                    out.push_str(&name);
                    continue;
                }
                name
            }
            Some((_, c)) if c.is_ascii_alphanumeric() || *c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                name
            }
            _ => {
                out.push('$');
                continue;
            }
        };

        out.push_str(&env::var(&name).unwrap_or_default());
    }

    out
}
