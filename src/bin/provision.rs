// src/bin/provision.rs - Identity provisioning CLI for the oracle
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neofeed_attest::{AttestationService, RunSecret};
use neofeed_chain::KeyPair;

/// Default N3 address version, used when no node is reachable at
/// provisioning time.
const N3_ADDRESS_VERSION: u8 = 0x35;

#[derive(Parser)]
#[command(
    name = "neofeed-provision",
    about = "Provision the oracle's TEE identity and manage its attestation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh TEE key pair, write it to a key file and attest it
    GenerateKey {
        /// Destination file; written mode 0600, directory 0700
        #[arg(long)]
        output: PathBuf,
    },
    /// Write an account attestation for an existing address
    CreateAccountAttestation {
        /// The account address to attest
        #[arg(long)]
        address: String,
    },
    /// Verify the stored account attestation
    VerifyAccountAttestation,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neofeed_provision=info,neofeed_attest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let attestor = attestor_from_env();

    match cli.command {
        Command::GenerateKey { output } => generate_key(&attestor, &output),
        Command::CreateAccountAttestation { address } => {
            let record = attestor.create_account_with_defaults(address)?;
            info!("Account attestation created for {}", record.account_address);
            Ok(())
        }
        Command::VerifyAccountAttestation => {
            let record = attestor
                .load_account()
                .context("no account attestation found")?;
            if attestor.verify_account(&record) {
                info!("Attestation for {} verifies", record.account_address);
                Ok(())
            } else {
                bail!("attestation signature does NOT verify");
            }
        }
    }
}

/// Generate the TEE identity: a fresh P-256 key, a locked-down key file for
/// the launcher to ingest, and the account attestation. The WIF is written
/// to the file only; it never reaches stdout or logs.
fn generate_key(attestor: &AttestationService, output: &Path) -> Result<()> {
    let pair = KeyPair::generate();
    let address = pair.address(N3_ADDRESS_VERSION);

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating key directory {}", dir.display()))?;
        restrict_permissions(dir, 0o700)?;
    }

    let contents = format!("Address: {}\nWIF: {}\n", address, pair.to_wif());
    fs::write(output, contents)
        .with_context(|| format!("writing key file {}", output.display()))?;
    restrict_permissions(output, 0o600)?;

    attestor.create_account_with_defaults(address.clone())?;
    info!("Generated TEE account {}", address);
    info!("Key material written to {}", output.display());
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("restricting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn attestor_from_env() -> AttestationService {
    let base_dir =
        std::env::var("ATTESTATION_DIR").unwrap_or_else(|_| "attestations".to_string());
    AttestationService::new(
        base_dir,
        RunSecret {
            build_commit: std::env::var("ATTEST_BUILD_COMMIT")
                .unwrap_or_else(|_| "unknown".to_string()),
            run_actor: std::env::var("ATTEST_RUN_ACTOR")
                .unwrap_or_else(|_| "unknown".to_string()),
            run_token: std::env::var("ATTEST_RUN_TOKEN").unwrap_or_default(),
        },
    )
}
