mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use git_age::error::Result;
use git_age::version::BuildInfo;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use commands::Context;

#[derive(Parser)]
#[command(name = "git-age")]
#[command(version)]
#[command(about = "Transparent age encryption of files in git", long_about = None)]
struct Cli {
    /// Identities location: a path, file://PATH or keychain://SERVICE
    #[arg(long, global = true)]
    keys: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the age filter driver in the global git config
    Install,

    /// Generate an identity and create the recipients file
    Init {
        /// Comment stored with the identity and the recipient
        #[arg(short, long, default_value = "")]
        comment: String,

        /// Remote the identity is scoped to
        #[arg(long, default_value = "")]
        remote: String,
    },

    /// Manage identities
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Grant a public key access and re-encrypt all tracked files
    AddRecipient {
        /// age or SSH public key
        recipient: String,

        /// Comment written above the key
        #[arg(short, long, default_value = "")]
        comment: String,

        /// Message of the re-encryption commit
        #[arg(short, long, default_value = "chore: add recipient")]
        message: String,
    },

    /// Manage encrypted files
    #[command(subcommand)]
    Files(FilesCommands),

    /// Clean filter (used internally by git)
    Clean {
        /// Path of the file being staged
        file: PathBuf,
    },

    /// Smudge filter (used internally by git)
    Smudge {
        /// Path of the file being checked out
        file: PathBuf,
    },

    /// Print version information
    Version {
        /// Only print the version number
        #[arg(long)]
        short: bool,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Generate a new identity and print its public key
    #[command(visible_alias = "gen")]
    Generate {
        #[arg(short, long, default_value = "")]
        comment: String,

        #[arg(long, default_value = "")]
        remote: String,
    },

    /// List the public keys of all available identities
    #[command(visible_alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum FilesCommands {
    /// List files selected for encryption
    #[command(visible_alias = "ls")]
    List,

    /// Select files matching a pattern for encryption
    Track {
        /// gitattributes pattern, e.g. '*.env'
        pattern: String,
    },

    /// Re-encrypt all tracked files for the current recipients
    ReEncrypt {
        /// Message of the re-encryption commit
        #[arg(short, long, default_value = "chore: re-encrypt secret files")]
        message: String,
    },
}

fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let ctx = Context {
        keys: cli.keys,
        cancel,
    };

    match cli.command {
        Commands::Init { comment, remote } => commands::init(&ctx, &comment, &remote).await,
        Commands::Keys(KeysCommands::Generate { comment, remote }) => {
            commands::generate_key(&ctx, &comment, &remote).await
        }
        Commands::Keys(KeysCommands::List) => commands::list_keys(&ctx).await,
        Commands::AddRecipient {
            recipient,
            comment,
            message,
        } => commands::add_recipient(&ctx, &recipient, &comment, &message).await,
        Commands::Files(FilesCommands::List) => commands::list_files(),
        Commands::Files(FilesCommands::Track { pattern }) => commands::track_files(&pattern),
        Commands::Files(FilesCommands::ReEncrypt { message }) => {
            commands::reencrypt_files(&ctx, &message).await
        }
        Commands::Clean { file } => commands::clean(&ctx, &file).await,
        Commands::Smudge { file } => commands::smudge(&ctx, &file).await,
        Commands::Install => commands::install(),
        Commands::Version { short } => commands::version(&BuildInfo::current(), short),
    }
}
