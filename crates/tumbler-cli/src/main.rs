//! Tumbler CLI - Coordinate Vault recovery key rekey ceremonies
//!
//! One participant runs `tumbler leader <addr>`, everyone else runs
//! `tumbler follower <addr>`. The tool walks each of them through share
//! submission and verification of the new shares.

mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tumbler_core::{
    run_follower_ceremony, run_leader_ceremony, CancellationToken, CeremonyConfig,
    CeremonyOutcome, Operator, RemoteCeremonyClient,
};
use tumbler_vault::{KeybaseResolver, VaultClient};

use terminal::TerminalOperator;

#[derive(Parser)]
#[command(name = "tumbler")]
#[command(about = "Coordinate a multi-party Vault recovery key rekey", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the new recovery key record
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Delay between status checks in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Give up on a key share after this many failed attempts
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a rekey and submit the final share
    Leader {
        /// Vault address, e.g. https://vault.example.com:8200
        address: String,
    },

    /// Join a rekey started by the leader
    Follower {
        /// Vault address, e.g. https://vault.example.com:8200
        address: String,
    },

    /// Show the current rekey and verification status
    Status {
        /// Vault address
        address: String,
    },

    /// Cancel the running rekey, discarding submitted shares
    Cancel {
        /// Vault address
        address: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "tumbler=debug,tumbler_core=debug,tumbler_vault=debug"
    } else {
        "tumbler=warn,tumbler_core=warn,tumbler_vault=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    debug!("Using configuration {:?}", config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Leader { address } => {
            let client = vault_client(&address, &config)?;
            let resolver = KeybaseResolver::new(config.keybase_url.clone(), config.request_timeout())
                .context("invalid keybase_url")?;
            let operator = TerminalOperator::new(cancel.clone());

            println!("🔐 Welcome to Tumbler!");
            let outcome =
                run_leader_ceremony(&client, &resolver, &operator, config, cancel).await?;
            report(&outcome);
        }

        Commands::Follower { address } => {
            let client = vault_client(&address, &config)?;
            let operator = TerminalOperator::new(cancel.clone());

            println!("🔐 Welcome to Tumbler!");
            let outcome = run_follower_ceremony(&client, &operator, config, cancel).await?;
            report(&outcome);
        }

        Commands::Status { address } => {
            let client = vault_client(&address, &config)?;
            print_status(&client).await?;
        }

        Commands::Cancel { address, yes } => {
            let client = vault_client(&address, &config)?;
            let status = client.fetch_ceremony_status().await?;
            if !status.in_progress() {
                println!("No rekey operation is in progress.");
                return Ok(());
            }

            if !yes {
                let operator = TerminalOperator::new(cancel);
                let answer = operator
                    .prompt_text(&format!(
                        "Cancel the rekey at {} ({}/{} shares provided)? Type 'yes' to confirm",
                        client.address(),
                        status.progress,
                        status.required
                    ))
                    .await?;
                if answer != "yes" {
                    bail!("cancellation aborted");
                }
            }

            client.cancel_ceremony().await?;
            println!("Rekey operation cancelled.");
        }
    }

    Ok(())
}

fn vault_client(address: &str, config: &CeremonyConfig) -> Result<VaultClient> {
    VaultClient::new(address, config.request_timeout())
        .with_context(|| format!("cannot use Vault address {}", address))
}

/// Defaults, then the config file, then command-line flags
fn load_config(cli: &Cli) -> Result<CeremonyConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            CeremonyConfig::load(&path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => CeremonyConfig::default(),
    };

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.poll_interval_ms = interval;
        config.max_poll_interval_ms = config.max_poll_interval_ms.max(interval);
    }
    if let Some(attempts) = cli.max_attempts {
        config.max_submit_attempts = Some(attempts);
    }
    if let Some(timeout) = cli.timeout_secs {
        config.request_timeout_secs = timeout;
    }

    config.validate()?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tumbler").join("config.json"))
}

fn report(outcome: &CeremonyOutcome) {
    match outcome {
        CeremonyOutcome::Leader {
            record,
            verified: true,
        } => {
            println!("✅ Vault rekey operation complete. New keys have been verified. You're done!");
            println!("Distribute the encrypted keys in {} to their owners.", record.display());
        }
        CeremonyOutcome::Leader {
            record,
            verified: false,
        } => {
            println!("✅ Vault rekey operation complete. New keys were not verified.");
            println!("Distribute the encrypted keys in {} to their owners.", record.display());
        }
        CeremonyOutcome::Follower { verified: true } => {
            println!("✅ Vault rekey operation complete. New keys have been verified. You're done!");
        }
        CeremonyOutcome::Follower { verified: false } => {
            println!("✅ Vault rekey operation complete. New keys were not verified.");
        }
    }
}

async fn print_status(client: &VaultClient) -> Result<()> {
    let rekey = client.fetch_ceremony_status().await?;
    println!("Vault: {}", client.address());

    if !rekey.in_progress() {
        println!("Rekey: not in progress");
        return Ok(());
    }
    println!("Rekey: in progress");
    println!("  Shares provided: {}/{}", rekey.progress, rekey.required);
    println!("  New shares: {} (threshold {})", rekey.shares, rekey.threshold);
    println!("  Verification required: {}", rekey.verification_required);
    if let Some(message) = rekey.error_message() {
        println!("  Error: {}", message);
    }

    if !rekey.verification_started() {
        return Ok(());
    }
    let verification = client.fetch_verification_status().await?;
    if verification.completed() {
        println!("Verification: complete");
    } else if verification.in_progress() {
        println!(
            "Verification: in progress ({}/{} shares verified)",
            verification.progress, verification.threshold
        );
    } else {
        println!("Verification: not in progress");
    }
    Ok(())
}
