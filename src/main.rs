//! Billing Ledger maintenance CLI
//!
//! `migrate` applies pending ledger migrations; `replay` rebuilds one
//! entitlement from the ledger and reports drift against the stored row.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use billing_ledger::adapters::PostgresBillingStore;
use billing_ledger::application::{ReplayEntitlementHandler, ReplayEntitlementQuery};
use billing_ledger::config::AppConfig;
use billing_ledger::domain::billing::ProductKey;
use billing_ledger::domain::foundation::UserId;

#[derive(Parser, Debug)]
#[command(name = "billing-ledger")]
#[command(version)]
#[command(about = "Maintenance commands for the billing ledger")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations
    Migrate,

    /// Rebuild an entitlement from the ledger and compare with the stored row
    Replay {
        user_id: String,
        /// lifetime, pro_monthly or pro_annual
        product_key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = init_tracing(&config) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(args.command, &config).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = config.logging.filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.logging.use_json(config.environment) {
        builder.json().try_init()?;
    } else {
        builder.try_init()?;
    }
    Ok(())
}

async fn run(
    command: Command,
    config: &AppConfig,
) -> Result<ExitCode, Box<dyn Error + Send + Sync>> {
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    let store = PostgresBillingStore::new(pool);

    match command {
        Command::Migrate => {
            store.migrate().await?;
            tracing::info!("Migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Command::Replay {
            user_id,
            product_key,
        } => {
            if config.database.run_migrations {
                store.migrate().await?;
            }

            let query = ReplayEntitlementQuery {
                user_id: UserId::new(user_id)?,
                product_key: product_key.parse::<ProductKey>()?,
            };
            let report = ReplayEntitlementHandler::new(Arc::new(store))
                .handle(query)
                .await?;

            tracing::info!(
                user_id = %report.rebuilt.user_id,
                product_key = %report.rebuilt.product_key,
                events = report.event_count,
                status = %report.rebuilt.status,
                version = report.rebuilt.version,
                consistent = report.consistent,
                "Replay finished"
            );

            Ok(if report.consistent {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
