//! Two-process handshake harness
//!
//! Drives a full handshake between two identities living in separate OS
//! processes that share nothing but a swarm directory. The initiator
//! process spawns this same binary in the responder role; the two exchange
//! public metadat keys through plain files in the shared directory and
//! then run the protocol end to end.
//!
//!   test-harness --dir /tmp/handshake-demo

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use datsocial_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use datsocial_core::{check_handshake, handshake, Config, DatKey, SocialError, User};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Initiator,
    Responder,
}

#[derive(Parser, Debug)]
#[command(name = "test-harness")]
#[command(about = "Two-process datsocial handshake simulation", long_about = None)]
struct Args {
    /// Shared working directory for both peers
    #[arg(long)]
    dir: PathBuf,

    /// Which side of the handshake this process plays
    #[arg(long, value_enum, default_value = "initiator")]
    role: Role,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = LogLevel::parse(&args.log_level).unwrap_or(LogLevel::Info);
    init_logging_with_config(LogConfig::new(level))?;

    let mut config = Config::default();
    config.dat.swarm_dir = args.dir.join("swarm");

    match args.role {
        Role::Initiator => run_initiator(&config, &args.dir).await,
        Role::Responder => run_responder(&config, &args.dir).await,
    }
}

async fn run_initiator(config: &Config, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut u1 = User::setup(config, &dir.join("u1-base"), "u1", "arstarst")?;
    std::fs::write(dir.join("u1.key"), u1.public_metadat_key().to_hex())?;

    // The responder is this same binary; the peers share only `dir`
    let mut child = tokio::process::Command::new(std::env::current_exe()?)
        .arg("--dir")
        .arg(dir)
        .arg("--role")
        .arg("responder")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .context("spawning responder process")?;

    let u2_key = wait_for_key(&dir.join("u2.key")).await?;
    let peer = handshake(&mut u1, &u2_key).await?;
    println!("initiator: invite delivered to {} ({})", peer.name, peer.id);

    let status = child.wait().await?;
    if !status.success() {
        bail!("responder process failed: {}", status);
    }

    if !u1.private.relationships.contains_key(&peer.id) {
        bail!("initiator is missing its relationship record");
    }
    println!("initiator: relationship recorded for {}", peer.id);

    u1.close();
    println!("handshake round trip complete");
    Ok(())
}

async fn run_responder(config: &Config, dir: &Path) -> Result<()> {
    let mut u2 = User::setup(config, &dir.join("u2-base"), "u2", "arstarst")?;
    std::fs::write(dir.join("u2.key"), u2.public_metadat_key().to_hex())?;

    let u1_key = wait_for_key(&dir.join("u1.key")).await?;

    // The invite may not have replicated yet; keep polling until it shows
    // up or the window closes.
    let deadline = tokio::time::Instant::now() + EXCHANGE_TIMEOUT;
    let peer = loop {
        match check_handshake(&mut u2, &u1_key).await {
            Ok(peer) => break peer,
            Err(SocialError::HandshakeNotFound(_)) | Err(SocialError::PeerUnreachable(_)) => {
                if tokio::time::Instant::now() >= deadline {
                    bail!("no invite arrived within {:?}", EXCHANGE_TIMEOUT);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if !u2.private.relationships.contains_key(&peer.id) {
        bail!("responder is missing its relationship record");
    }
    println!(
        "responder: relationship established with {} ({})",
        peer.name, peer.id
    );

    u2.close();
    Ok(())
}

async fn wait_for_key(path: &Path) -> Result<DatKey> {
    let deadline = tokio::time::Instant::now() + EXCHANGE_TIMEOUT;
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            return contents
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("bad key file {}: {}", path.display(), e));
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {}", path.display());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
