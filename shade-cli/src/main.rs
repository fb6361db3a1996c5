//! Shade command line wallet
//!
//! Every command runs in its own process, so commands that need private
//! keys unlock the vault first. The password is read from `SHADE_PASSWORD`
//! or prompted for.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shade_core::stealth::StealthMetaAddress;
use shade_core::{ExternalSigner, LedgerAddress, LocalSigner};
use shade_discovery::{MemoryLedger, PipelineResult};
use shade_storage_sqlite::MemoryVaultStore;
use shade_wallet_service::{KeyManagerConfig, WalletConfig, WalletService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "SHADE_PASSWORD";

#[derive(Parser)]
#[command(name = "shade-cli")]
#[command(about = "Stealth payment wallet", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault for a signer's account
    Init {
        /// Hex secp256k1 key of the external signer
        #[arg(long)]
        signer_key: String,

        /// Application user id
        #[arg(short, long)]
        user: String,

        /// Authentication method tag
        #[arg(short, long, default_value = "email")]
        auth_method: String,
    },

    /// Show key manager status after unlocking
    Status {
        /// Account of the vault
        #[arg(short, long)]
        account: String,
    },

    /// Print the stealth meta-address to publish
    MetaAddress {
        /// Account of the vault
        #[arg(short, long)]
        account: String,
    },

    /// Re-encrypt the vault under a new password
    ChangePassword {
        /// Account of the vault
        #[arg(short, long)]
        account: String,
    },

    /// Delete the vault of an account
    Reset {
        /// Account of the vault
        #[arg(short, long)]
        account: String,

        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },

    /// Stealth address operations
    #[command(subcommand)]
    Stealth(StealthCommands),

    /// Print `registerUsername` calldata
    RegisterUsername {
        /// Account of the vault
        #[arg(short, long)]
        account: String,

        /// Username to register
        #[arg(short, long)]
        username: String,
    },

    /// Pay yourself through an in-memory ledger, then scan and claim
    Demo {
        /// Number of payments
        #[arg(short, long, default_value = "3")]
        payments: u32,
    },
}

#[derive(Subcommand)]
enum StealthCommands {
    /// One-time address for a recipient's meta-address
    Generate {
        /// Recipient meta-address (`st:shade:0x...`)
        meta_address: String,
    },

    /// Check whether an address was generated for this wallet
    Check {
        /// Account of the vault
        #[arg(short, long)]
        account: String,

        /// Hex ephemeral public key
        #[arg(short, long)]
        ephemeral: String,

        /// Candidate stealth address
        #[arg(long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => WalletConfig::load_or_default(path)?,
        None => WalletConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }

    match cli.command {
        Commands::Init {
            signer_key,
            user,
            auth_method,
        } => {
            let signer = LocalSigner::from_hex(&signer_key).context("invalid signer key")?;
            let service = open_service(config)?;
            let password = read_new_password()?;
            let public = service
                .key_manager()
                .initialize(&password, &signer, &user, &auth_method)
                .await?;
            println!("account: {}", signer.account().checksum_hex());
            println!("meta-address: {}", StealthMetaAddress(public));
        }
        Commands::Status { account } => {
            let service = unlocked(config, &account).await?;
            println!("{}", serde_json::to_string_pretty(&service.status())?);
        }
        Commands::MetaAddress { account } => {
            let service = unlocked(config, &account).await?;
            println!("{}", service.meta_address()?);
        }
        Commands::ChangePassword { account } => {
            let service = unlocked(config, &account).await?;
            let old = read_password("Current password: ")?;
            let new = read_new_password()?;
            service.key_manager().update_password(&old, &new).await?;
            println!("password changed");
        }
        Commands::Reset { account, yes } => {
            if !yes {
                bail!("reset deletes the vault permanently; pass --yes to confirm");
            }
            let service = open_service(config)?;
            let existed = service.key_manager().reset(&account).await?;
            println!("{}", if existed { "vault deleted" } else { "no vault" });
        }
        Commands::Stealth(StealthCommands::Generate { meta_address }) => {
            let service = open_service(config)?;
            let meta = StealthMetaAddress::parse(&meta_address)?;
            let generated = service.generate_stealth(&meta)?;
            println!("stealth address: {}", generated.stealth_address);
            println!("ephemeral key: 0x{}", hex::encode(generated.ephemeral_bytes()));
        }
        Commands::Stealth(StealthCommands::Check {
            account,
            ephemeral,
            address,
        }) => {
            let service = unlocked(config, &account).await?;
            let ephemeral = hex::decode(ephemeral.trim_start_matches("0x"))
                .context("ephemeral key is not hex")?;
            let candidate = LedgerAddress::parse(&address)?;
            let check = service.check_stealth(&ephemeral, &candidate)?;
            println!("for me: {}", check.is_for_me);
            println!("derived address: {}", check.derived_address);
        }
        Commands::RegisterUsername { account, username } => {
            let service = unlocked(config, &account).await?;
            let registration = service.build_register_username(&username)?;
            println!("calldata: 0x{}", hex::encode(registration.call.encode()));
            println!("secret: 0x{}", hex::encode(registration.secret.as_slice()));
        }
        Commands::Demo { payments } => run_demo(payments).await?,
    }

    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Service over the on-disk vault. No ledger is configured, so scanning
/// only sees an empty chain.
fn open_service(config: WalletConfig) -> Result<WalletService> {
    let contract = config.payment_contract()?;
    let ledger = Arc::new(MemoryLedger::new(contract));
    Ok(WalletService::open(config, ledger)?)
}

async fn unlocked(config: WalletConfig, account: &str) -> Result<WalletService> {
    let service = open_service(config)?;
    let password = read_password("Password: ")?;
    service.key_manager().unlock(&password, account).await?;
    Ok(service)
}

fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}

fn read_new_password() -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }
    let first = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let second = Zeroizing::new(rpassword::prompt_password("Repeat password: ")?);
    if first.as_str() != second.as_str() {
        bail!("passwords do not match");
    }
    Ok(first)
}

async fn run_demo(payments: u32) -> Result<()> {
    let config = WalletConfig {
        key_manager: KeyManagerConfig::insecure_fast(),
        ..WalletConfig::default()
    };
    let contract = config.payment_contract()?;
    let ledger = Arc::new(MemoryLedger::new(contract));
    let service = WalletService::new(config, Arc::new(MemoryVaultStore::new()), ledger.clone())?;

    let signer = LocalSigner::random();
    service
        .key_manager()
        .initialize("Demo1!Password", &signer, "demo", "local")
        .await?;
    let meta = service.meta_address()?;
    info!(%meta, "demo wallet ready");

    let payer = LedgerAddress::new([0x0b; 20]);
    for i in 1..=payments {
        let (call, generated) = service.build_send(&meta, u128::from(i) * 1_000)?;
        ledger.submit(payer, contract, call.encode());
        info!(address = %generated.stealth_address, "sent payment {}", i);
    }

    let result = service.scan_payments(0).await?;
    print_result(&result)?;

    if let Some(payment) = result.received().next() {
        let claim = service.build_claim(payment, signer.account())?;
        println!("claim calldata: 0x{}", hex::encode(claim.encode()));
    }
    Ok(())
}

fn print_result(result: &PipelineResult) -> Result<()> {
    println!(
        "scanned blocks {}..={} in {:?}",
        result.from_block,
        result.to_block.map_or_else(|| "-".to_string(), |b| b.to_string()),
        result.duration
    );
    for payment in &result.payments {
        println!("{}", serde_json::to_string(payment)?);
    }
    println!("{}", serde_json::to_string(&result.perf)?);
    Ok(())
}
