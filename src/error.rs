use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitAgeError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not in a git repository")]
    NotInGitRepo,

    #[error("Staging area has uncommitted changes; commit or reset them first")]
    DirtyStaging,

    #[error("Cannot generate identity: empty identities chain")]
    EmptyChain,

    #[error("Cannot read from STDIN: input is an interactive terminal")]
    StdinIsTerminal,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{}", join_messages(.0))]
    Sources(Vec<GitAgeError>),

    #[error("{0}")]
    Other(String),
}

impl GitAgeError {
    /// Combine errors the way several independent operations report them.
    ///
    /// Returns `None` for an empty list and unwraps a single error.
    pub fn join(mut errors: Vec<GitAgeError>) -> Option<GitAgeError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(GitAgeError::Sources(errors)),
        }
    }
}

fn join_messages(errors: &[GitAgeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, GitAgeError>;
