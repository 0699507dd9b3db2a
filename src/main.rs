use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

mod api;
mod config;
mod license;
mod machine;

use crate::config::LicenseConfig;
use crate::license::{LicenseEngine, Status};

#[derive(Parser)]
#[command(
    name = "wizado",
    version,
    about = "Wizado license engine",
    long_about = "Validates, activates and manages the wizado license on this machine.\n\
                  License required: $10 for 5 machines at https://wizado.app"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the stored license and report its status
    Check,
    /// Activate a license key on this machine (non-interactive)
    Activate {
        #[arg(long)]
        email: String,
        #[arg(long)]
        key: String,
    },
    /// Look up the license key registered for an email address
    Recover {
        #[arg(long)]
        email: String,
    },
    /// Remove the stored license from this machine
    Clear,
    /// Output the license status as single-line JSON (for scripts/status bars)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wizado=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = LicenseEngine::new(LicenseConfig::default())?;

    match cli.command {
        Command::Check => run_check(&engine).await,
        Command::Activate { email, key } => run_activate(&engine, &email, &key).await,
        Command::Recover { email } => run_recover(&engine, &email).await,
        Command::Clear => {
            engine.clear();
            println!("License removed from this machine.");
            Ok(())
        }
        Command::Status => run_status(&engine).await,
    }
}

async fn run_check(engine: &LicenseEngine) -> Result<()> {
    let outcome = engine.check().await;

    // Each status gets its own actionable message; collapsing them into one
    // generic "unlicensed" would hide what the user should actually do.
    match outcome.status {
        Status::Valid => println!("License valid."),
        Status::OfflineGrace => {
            println!("License valid (offline grace period - could not reach the license server).")
        }
        Status::NoLicense => {
            println!("No license found. Activate one with: wizado activate --email <email> --key <key>")
        }
        Status::Invalid => println!("The license server reports this key as invalid or revoked."),
        Status::Expired => println!("The license has expired. Please re-activate."),
        Status::MachineMismatch => {
            println!("This license was activated on a different machine. Re-activate it here to continue.")
        }
        Status::OfflineExpired => {
            println!("The offline grace period has ended and the license server is unreachable. Reconnect to verify.")
        }
        Status::Tampered => {
            println!("The stored license failed its integrity check and was removed. Please re-activate.")
        }
        Status::ClockTampered => {
            println!("The system clock appears to have moved backward. Fix the clock and try again.")
        }
    }

    if outcome.status.is_licensed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

async fn run_activate(engine: &LicenseEngine, email: &str, key: &str) -> Result<()> {
    let result = engine.activate(email, key).await?;

    if !result.activated {
        eprintln!("Activation failed: {}", result.message);
        std::process::exit(1);
    }

    println!("License activated successfully!");
    if let Some(account) = &result.email {
        println!("Email: {}", account);
    }
    if let (Some(used), Some(total)) = (result.slots_used, result.slots_total) {
        println!("Slots: {}/{}", used, total);
    }
    Ok(())
}

async fn run_recover(engine: &LicenseEngine, email: &str) -> Result<()> {
    match engine.recover(email).await {
        Ok(key) => {
            println!("{}", key);
            Ok(())
        }
        Err(e) => {
            eprintln!("Recovery failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_status(engine: &LicenseEngine) -> Result<()> {
    let outcome = engine.check().await;
    info!("License status: {}", outcome.status);

    let output = serde_json::json!({
        "status": outcome.status,
        "licensed": outcome.status.is_licensed(),
    });
    println!("{}", output);
    Ok(())
}
