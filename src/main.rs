//! CLC Top-up CLI
//!
//! ```text
//! clc_topup [--env <name>] [--mock] <user_id> <coin_id>
//! ```
//!
//! Opens an invoice for `<user_id>` paying into `<coin_id>`, prints the
//! deposit address, then polls until the deposit is merged and credited.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use clc_topup::config::AppConfig;
use clc_topup::core_types::CoinId;
use clc_topup::ledger::{HttpLedgerClient, InMemoryLedger, LedgerClient};
use clc_topup::topup::{PollReport, ReconciliationEngine, SettlementPoller};

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn use_mock_ledger(args: &[String]) -> bool {
    args.iter().any(|a| a == "--mock")
}

/// Positional arguments: everything that is not a flag or a flag value
fn positionals(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        match arg.as_str() {
            "--env" | "-e" => skip_next = true,
            "--mock" => {}
            _ => out.push(arg.clone()),
        }
    }
    out
}

/// In-memory ledger holding the exchange coin and an undeposited coin
fn mock_ledger(exchange_coin_id: CoinId, coin_id: CoinId) -> Arc<InMemoryLedger> {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.insert_coin(exchange_coin_id, Decimal::ZERO, Decimal::ZERO, "exchange");
    ledger.insert_coin(coin_id, Decimal::ONE, Decimal::ONE, "wallet");
    ledger
}

/// Open the invoice and poll it, printing every reply. With a mock ledger
/// the deposit is sent to the issued address after the first poll.
async fn run_session(
    engine: &ReconciliationEngine,
    poller: &SettlementPoller,
    user_id: &str,
    coin_id: CoinId,
    mock: Option<&InMemoryLedger>,
) -> PollReport {
    let address = match engine.create_invoice(user_id, coin_id).await {
        Ok(issued) => {
            println!("{}", issued);
            Some(issued.address)
        }
        Err(e) => {
            println!("{}", e);
            None
        }
    };

    poller
        .run_with(engine, user_id, |attempt, reply| {
            println!("[{}] {}", attempt, reply);
            if let (1, Some(ledger), Some(address)) = (attempt, mock, &address) {
                if ledger.transfer(coin_id, address.as_str()) {
                    tracing::info!(coin_id, %address, "Simulated deposit sent");
                }
            }
        })
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let positional = positionals(&args);
    let [user_id, coin_id] = positional.as_slice() else {
        bail!("usage: clc_topup [--env <name>] [--mock] <user_id> <coin_id>");
    };
    let coin_id: u64 = coin_id
        .parse()
        .with_context(|| format!("invalid coin id: {}", coin_id))?;

    let env = get_env(&args);
    let app_config = AppConfig::load(&env)?;
    let _log_guard = clc_topup::logging::init_logging(&app_config);

    tracing::info!(
        "Starting CLC top-up ({}) in {} mode",
        env!("GIT_HASH"),
        env
    );

    let mock = use_mock_ledger(&args).then(|| {
        tracing::warn!("Using in-memory ledger; the deposit is simulated");
        mock_ledger(app_config.ledger.exchange_coin_id, coin_id)
    });
    let ledger: Arc<dyn LedgerClient> = match &mock {
        Some(ledger) => ledger.clone(),
        None => Arc::new(HttpLedgerClient::new(&app_config.ledger)?),
    };

    let engine = ReconciliationEngine::from_config(ledger, &app_config);
    let poller = SettlementPoller::from_config(&app_config.topup);
    let report = run_session(&engine, &poller, user_id, coin_id, mock.as_deref()).await;

    tracing::info!(
        user_id = %user_id,
        attempts = report.attempts,
        settled = report.settled,
        balance = %engine.balance_of(user_id),
        "Top-up session finished"
    );

    Ok(())
}
