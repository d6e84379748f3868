use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datsocial_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use datsocial_core::{check_handshake, follow, handshake, Config, DatKey, User};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "datsocial")]
#[command(author, version, about = "Decentralized identity and trust over dats", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML); when omitted, defaults plus DATSOCIAL_*
    /// environment variables apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new identity
    Setup {
        /// Identity directory
        path: PathBuf,
        /// Display name
        name: String,
        /// Passphrase protecting the private key
        passphrase: String,
    },
    /// Load an identity and print its public details
    Load {
        path: PathBuf,
        passphrase: String,
    },
    /// Create a content dat
    CreateDat {
        path: PathBuf,
        passphrase: String,
        /// Logical name of the dat
        name: String,
        /// Publish the dat key in the manifest
        #[arg(long)]
        public: bool,
    },
    /// Follow a peer's public metadat
    Follow {
        path: PathBuf,
        passphrase: String,
        /// Hex key of the peer's public metadat
        peer_key: String,
    },
    /// Initiate a handshake with a peer
    Handshake {
        path: PathBuf,
        passphrase: String,
        peer_key: String,
    },
    /// Check for and accept a pending handshake invite
    CheckHandshake {
        path: PathBuf,
        passphrase: String,
        /// Hex key of the initiator's public metadat
        peer_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::parse(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });
    init_logging_with_config(LogConfig::new(log_level).json_format(args.json_logs))?;

    let config = match &args.config {
        Some(path) => Config::from_file(path).context("loading configuration file")?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    match args.command {
        Command::Setup { path, name, passphrase } => {
            let mut user = User::setup(&config, &path, &name, &passphrase)?;
            println!("id: {}", user.identity.id);
            println!("public metadat key: {}", user.public_metadat_key());
            user.close();
        }
        Command::Load { path, passphrase } => {
            let mut user = User::load(&config, &path, &passphrase)?;
            println!("name: {}", user.identity.name);
            println!("id: {}", user.identity.id);
            println!("public metadat key: {}", user.public_metadat_key());
            println!("published dats: {}", user.manifest.dats.len());
            println!("follows: {}", user.private.follows.len());
            println!("relationships: {}", user.private.relationships.len());
            user.close();
        }
        Command::CreateDat { path, passphrase, name, public } => {
            let mut user = User::load(&config, &path, &passphrase)?;
            let dat = user.create_dat(&name, public)?;
            println!("dat key: {}", dat.key());
            user.close();
        }
        Command::Follow { path, passphrase, peer_key } => {
            let key: DatKey = peer_key.parse()?;
            let mut user = User::load(&config, &path, &passphrase)?;
            let peer = follow(&mut user, &key).await?;
            println!("following {} ({})", peer.name, peer.id);
            user.close();
        }
        Command::Handshake { path, passphrase, peer_key } => {
            let key: DatKey = peer_key.parse()?;
            let mut user = User::load(&config, &path, &passphrase)?;
            let peer = handshake(&mut user, &key).await?;
            info!(peer = %peer.id, "invite delivered");
            println!("handshake initiated with {} ({})", peer.name, peer.id);
            user.close();
        }
        Command::CheckHandshake { path, passphrase, peer_key } => {
            let key: DatKey = peer_key.parse()?;
            let mut user = User::load(&config, &path, &passphrase)?;
            let peer = check_handshake(&mut user, &key).await?;
            println!("relationship established with {} ({})", peer.name, peer.id);
            user.close();
        }
    }

    Ok(())
}
