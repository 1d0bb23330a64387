//! sigil - sign and verify container images
//!
//! Key pairs live in a local keyring and can be published to a keystore;
//! signatures are recorded per image object and verified against keys from
//! the keyring or the keystore.

mod config;
mod error;
mod interactive;
mod keypair;
mod keystore;
mod newpair;
mod sign;
mod signing;
mod verify;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::interactive::Terminal;
use crate::keypair::Keyring;
use crate::newpair::NewpairFlags;

#[derive(Parser)]
#[command(name = "sigil")]
#[command(author, version, about = "Sign and verify container images", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage signing key pairs
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Sign an object of a container image
    Sign {
        /// Image to sign
        image: PathBuf,

        /// Descriptor ID to record the signature under
        #[arg(short = 'i', long, default_value_t = 1)]
        id: u32,

        /// Signature group of the object
        #[arg(short = 'g', long, default_value_t = 1)]
        groupid: u32,

        /// Fingerprint of the signing key (default: first local key)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Verify signatures embedded in a container image
    Verify {
        /// Image to verify
        image: PathBuf,

        /// Keyserver URL
        #[arg(short, long)]
        url: Option<String>,

        /// Group ID to be verified
        #[arg(short = 'g', long, default_value_t = 0)]
        groupid: u32,

        /// Descriptor ID to be verified
        #[arg(short = 'i', long, default_value_t = 0)]
        id: u32,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Generate a new key pair, optionally pushing it to the keystore
    Newpair {
        /// Key owner name
        #[arg(short = 'N', long)]
        name: Option<String>,

        /// Key owner email
        #[arg(short = 'E', long)]
        email: Option<String>,

        /// Key comment
        #[arg(short = 'C', long)]
        comment: Option<String>,

        /// Key passphrase
        #[arg(short = 'P', long)]
        password: Option<String>,

        /// Push the public key to the keystore (prompted when omitted)
        #[arg(short = 'U', long, num_args = 0..=1, default_missing_value = "true")]
        push: Option<bool>,

        /// Key length in bits
        #[arg(short = 'b', long, default_value_t = keypair::ED25519_KEY_LENGTH_BITS)]
        bits: u32,

        /// Keyserver URL
        #[arg(short, long)]
        url: Option<String>,
    },

    /// List local key pairs
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{e}");
        process::exit(2);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Key { action } => match action {
            KeyAction::Newpair {
                name,
                email,
                comment,
                password,
                push,
                bits,
                url,
            } => {
                let config = Config::load_or_create(cli.config.as_deref(), url.as_deref())?;
                let flags = NewpairFlags {
                    name,
                    email,
                    comment,
                    password,
                    push,
                    bits,
                };
                newpair::run(&flags, &config, &mut Terminal).await
            }

            KeyAction::List => {
                let config = Config::load_or_create(cli.config.as_deref(), None)?;
                let records = Keyring::new(&config.key_dir).list()?;
                if records.is_empty() {
                    println!("No local key pairs.");
                }
                for record in records {
                    println!(
                        "{}  {}  {}",
                        record.fingerprint, record.algorithm, record.identity
                    );
                }
                Ok(())
            }
        },

        Commands::Sign {
            image,
            id,
            groupid,
            key,
        } => {
            let config = Config::load_or_create(cli.config.as_deref(), None)?;
            sign::run(&image, id, groupid, key.as_deref(), &config, &mut Terminal)
        }

        Commands::Verify {
            image,
            url,
            groupid,
            id,
        } => {
            let config = Config::load_or_create(cli.config.as_deref(), url.as_deref())?;
            verify::run(&image, groupid, id, &config).await
        }
    }
}
