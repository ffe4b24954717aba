//! Generate per-client wallets for tempest
//!
//! Prints (or writes) `VU_<i>_PK` / `VU_<i>_ADDR` pairs in dotenv form,
//! ready to be sourced before a write-enabled load test.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::OsRng;
use rand::Rng;
use std::path::PathBuf;
use tempest_core::wallet::{address_var, private_key_var};
use tempest_core::{PrivateKey, Wallet};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Draws before giving up on finding a valid scalar
const MAX_KEY_ATTEMPTS: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "tempest-wallets")]
#[command(about = "Generate VU_<i>_PK / VU_<i>_ADDR wallet pairs")]
#[command(version)]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of wallets
    #[arg(long, default_value_t = 50)]
    count: u32,

    /// Write to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn random_wallet<R: Rng>(rng: &mut R) -> Result<Wallet> {
    for _ in 0..MAX_KEY_ATTEMPTS {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        match PrivateKey::from_bytes(&bytes) {
            Ok(key) => return Ok(Wallet::from_key(key)),
            // zero or >= curve order
            Err(e) => debug!("rejected key candidate: {}", e),
        }
    }
    anyhow::bail!("no valid secp256k1 key after {} attempts", MAX_KEY_ATTEMPTS)
}

fn generate_wallets<R: Rng>(count: u32, rng: &mut R) -> Result<Vec<Wallet>> {
    (0..count).map(|_| random_wallet(rng)).collect()
}

/// Ordinals start at 1
fn render_env(wallets: &[Wallet]) -> String {
    let mut out = String::new();
    for (index, wallet) in wallets.iter().enumerate() {
        let ordinal = index as u32 + 1;
        out.push_str(&format!("{}={}\n", private_key_var(ordinal), wallet.key().to_hex()));
        out.push_str(&format!(
            "{}={}\n",
            address_var(ordinal),
            wallet.address().to_checksum()
        ));
    }
    out
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays a clean dotenv stream
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let wallets = generate_wallets(cli.count, &mut OsRng)?;
    let env = render_env(&wallets);

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &env)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} wallets to {}", wallets.len(), path.display());
        }
        None => print!("{}", env),
    }
    Ok(())
}
