//! CLC Top-up Bridge
//!
//! Credits users' internal exchange balances with coins they hold on the
//! external CLC ledger.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers (UserId, CoinId)
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup
//! - [`ledger`] - CLC ledger client trait, HTTP and in-memory implementations
//! - [`topup`] - Invoice/credential stores, reconciliation engine, poller

pub mod config;
pub mod core_types;
pub mod ledger;
pub mod logging;
pub mod topup;

// Convenient re-exports at crate root
pub use config::{AppConfig, CreditPolicy, PublicKeyFormat};
pub use core_types::{CoinId, UserId};
pub use ledger::{
    Coin, CoinTransaction, HttpLedgerClient, InMemoryLedger, LedgerClient, LedgerError,
    MergeRequest, MergeResponse,
};
pub use topup::{
    BalanceLedger, CredentialVault, InvoiceState, InvoiceTracker, ReconciliationEngine,
    SettlementOutcome, SettlementPoller, TopupError,
};
