//! wallet_transfer - command line entry point
//!
//! ```text
//! wallet_transfer [--env <env>] migrate
//! wallet_transfer [--env <env>] create   <address> <balance>
//! wallet_transfer [--env <env>] balance  <address>
//! wallet_transfer [--env <env>] transfer <from> <to> <amount>
//! ```
//!
//! Configuration comes from `config/<env>.yaml` (default `dev`).

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;

use wallet_transfer::config::AppConfig;
use wallet_transfer::db::Database;
use wallet_transfer::transfer::{RetryPolicy, TransferEngine};
use wallet_transfer::wallet::PgWalletStore;

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Positional arguments with the `--env <value>` pair removed
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args.iter().skip(1) {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--env" || arg == "-e" {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn parse_amount(value: &str, what: &str) -> anyhow::Result<i64> {
    value
        .parse::<i64>()
        .with_context(|| format!("{} must be an integer, got '{}'", what, value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let command = positional(&args);

    let app_config = AppConfig::load(&env)?;
    let _log_guard = wallet_transfer::logging::init_logging(&app_config);

    tracing::info!(
        "Starting wallet_transfer ({}) in {} mode",
        env!("GIT_HASH"),
        env
    );

    let db = Database::connect(
        &app_config.database_url()?,
        app_config.database.max_connections,
        app_config.database.acquire_timeout(),
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database ping failed")?;

    let store = Arc::new(PgWalletStore::new(db.pool().clone()));
    let engine = TransferEngine::new(store, RetryPolicy::from(&app_config.transfer));

    match command.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["migrate"] => {
            db.migrate().await?;
            println!("Schema up to date");
        }
        ["create", address, balance] => {
            let balance = parse_amount(balance, "balance")?;
            let wallet = engine.create_wallet(address, balance).await?;
            println!("{}", serde_json::to_string(&wallet)?);
        }
        ["balance", address] => {
            let balance = engine.balance_of(address).await?;
            println!(
                "{}",
                serde_json::json!({ "address": address, "balance": balance })
            );
        }
        ["transfer", from, to, amount] => {
            let amount = parse_amount(amount, "amount")?;

            // Ctrl-C aborts a transfer that has not committed yet
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            match engine.transfer(&cancel, from, to, amount).await {
                Ok(balance) => println!(
                    "{}",
                    serde_json::json!({ "sender": from, "balance": balance })
                ),
                Err(e) => {
                    println!(
                        "{}",
                        serde_json::json!({ "error": e.code(), "message": e.to_string() })
                    );
                    return Err(e.into());
                }
            }
        }
        _ => bail!(
            "usage: wallet_transfer [--env <env>] \
             migrate | create <address> <balance> | balance <address> | transfer <from> <to> <amount>"
        ),
    }

    Ok(())
}
