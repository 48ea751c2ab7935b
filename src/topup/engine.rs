//! Reconciliation Engine
//!
//! Drives the top-up protocol for each user:
//!
//! 1. `create_invoice` opens an invoice and issues a deposit credential
//!    (paired: both exist or neither does).
//! 2. `poll_settlement` is called by an outside scheduler as often as it
//!    likes. Each call checks whether the target coin is now held by the
//!    credential, and if so signs the merge challenge, merges the coin into
//!    the exchange coin, credits the user and clears the pair.
//!
//! The engine owns no timers. Calls for one user are serialized; calls for
//! different users run concurrently except for the merge itself, which is
//! serialized against the exchange coin so every signature covers its
//! current transaction count.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use super::balance::BalanceLedger;
use super::challenge::MergeChallenge;
use super::credential::{Credential, PublicKeyHex};
use super::error::TopupError;
use super::invoice::{Invoice, InvoiceTracker};
use super::state::InvoiceState;
use super::vault::CredentialVault;
use crate::config::{AppConfig, CreditPolicy};
use crate::core_types::{CoinId, UserId};
use crate::ledger::{Coin, LedgerClient, LedgerError, MergeRequest, MergeResponse};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub exchange_coin_id: CoinId,
    pub request_timeout: Duration,
    pub credit_policy: CreditPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            exchange_coin_id: config.ledger.exchange_coin_id,
            request_timeout: Duration::from_millis(config.ledger.request_timeout_ms),
            credit_policy: config.topup.credit_policy,
        }
    }
}

/// Returned by a successful `create_invoice`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceIssued {
    pub invoice_id: Ulid,
    pub target_coin_id: CoinId,
    pub address: PublicKeyHex,
}

impl fmt::Display for InvoiceIssued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Please transact as much clc as you wish to coin #{}, address: {}, once done, please press refresh",
            self.target_coin_id, self.address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Target coin is not (yet) held by the deposit credential
    Pending,
    /// Coin merged into the exchange coin and the user credited
    Settled {
        target_coin_id: CoinId,
        amount: Decimal,
    },
}

impl SettlementOutcome {
    pub fn state(&self) -> InvoiceState {
        match self {
            SettlementOutcome::Pending => InvoiceState::Invoicing,
            SettlementOutcome::Settled { .. } => InvoiceState::Settled,
        }
    }
}

impl fmt::Display for SettlementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementOutcome::Pending => {
                write!(f, "Haven't received any CLC yet, try again in a few seconds...")
            }
            SettlementOutcome::Settled { amount, .. } => {
                write!(f, "Added {}CLC to your balance", amount.round_dp(2).normalize())
            }
        }
    }
}

pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerClient>,
    vault: Arc<CredentialVault>,
    invoices: Arc<InvoiceTracker>,
    balances: Arc<BalanceLedger>,
    settings: EngineSettings,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    merge_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        vault: Arc<CredentialVault>,
        invoices: Arc<InvoiceTracker>,
        balances: Arc<BalanceLedger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledger,
            vault,
            invoices,
            balances,
            settings,
            user_locks: DashMap::new(),
            merge_lock: Mutex::new(()),
        }
    }

    /// Engine with fresh in-memory stores configured from `config`
    pub fn from_config(ledger: Arc<dyn LedgerClient>, config: &AppConfig) -> Self {
        Self::new(
            ledger,
            Arc::new(CredentialVault::new(config.topup.public_key_format)),
            Arc::new(InvoiceTracker::new()),
            Arc::new(BalanceLedger::new()),
            EngineSettings::from_config(config),
        )
    }

    pub fn invoice_state(&self, user_id: &str) -> InvoiceState {
        if self.invoices.get(user_id).is_some() {
            InvoiceState::Invoicing
        } else {
            InvoiceState::NoInvoice
        }
    }

    pub fn invoice(&self, user_id: &str) -> Option<Invoice> {
        self.invoices.get(user_id)
    }

    pub fn balance_of(&self, user_id: &str) -> Decimal {
        self.balances.balance_of(user_id)
    }

    #[cfg(test)]
    pub(crate) fn user_lock_count(&self) -> usize {
        self.user_locks.len()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Open an invoice for `target_coin_id` and issue its deposit address
    pub async fn create_invoice(
        &self,
        user_id: &str,
        target_coin_id: CoinId,
    ) -> Result<InvoiceIssued, TopupError> {
        if target_coin_id == self.settings.exchange_coin_id {
            return Err(TopupError::InvalidTargetCoin(target_coin_id));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if self.vault.contains(user_id) {
            debug!(user_id, "Invoice already open");
            return Err(TopupError::AlreadyInvoicing);
        }

        let invoice = self.invoices.open(user_id, target_coin_id)?;
        let address = match self.vault.issue(user_id) {
            Ok(address) => address,
            Err(e) => {
                // Never leave an invoice without its credential
                self.invoices.close(user_id);
                return Err(e);
            }
        };

        info!(
            user_id,
            coin_id = target_coin_id,
            invoice_id = %invoice.invoice_id,
            "Invoice opened: {} -> {}",
            InvoiceState::NoInvoice,
            InvoiceState::Invoicing
        );

        Ok(InvoiceIssued {
            invoice_id: invoice.invoice_id,
            target_coin_id,
            address,
        })
    }

    /// Check the invoice once and settle it if the deposit has arrived
    pub async fn poll_settlement(&self, user_id: &str) -> Result<SettlementOutcome, TopupError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.poll_locked(user_id).await
        };
        drop(lock);

        if matches!(result, Ok(SettlementOutcome::Settled { .. })) {
            // Only evict when no other call is holding or waiting on it
            self.user_locks
                .remove_if(user_id, |_, entry| Arc::strong_count(entry) == 1);
        }
        result
    }

    async fn poll_locked(&self, user_id: &str) -> Result<SettlementOutcome, TopupError> {
        let invoice = self.invoices.get(user_id).ok_or(TopupError::NotInvoicing)?;
        let Some(credential) = self.vault.get(user_id) else {
            error!(
                user_id,
                coin_id = invoice.target_coin_id,
                "Open invoice has no credential"
            );
            return Err(TopupError::CredentialMissing(user_id.to_string()));
        };

        let lookup = self.ledger_call(self.ledger.get_coin(invoice.target_coin_id)).await;
        let coin = match (lookup, invoice.merge_submitted) {
            (Ok(coin), _) => coin,
            // Only this credential can sign the coin away, so a missing
            // coin means the earlier unanswered merge went through.
            (Err(LedgerError::CoinNotFound(_)), Some(amount)) => {
                info!(
                    user_id,
                    coin_id = invoice.target_coin_id,
                    %amount,
                    "Target coin merged by an unanswered request"
                );
                return self.finish_settlement(&invoice, amount);
            }
            (Err(e), _) => {
                warn!(user_id, coin_id = invoice.target_coin_id, "Coin lookup failed: {}", e);
                return Err(e.into());
            }
        };

        if !coin
            .latest_holder()
            .is_some_and(|holder| credential.is_held_by(holder))
        {
            debug!(user_id, coin_id = invoice.target_coin_id, "Deposit not received yet");
            return Ok(SettlementOutcome::Pending);
        }

        let amount = coin.value;
        match self.settings.credit_policy {
            CreditPolicy::AfterMerge => self.balances.check_credit(user_id, amount)?,
            CreditPolicy::BeforeMerge => {
                let credited = self
                    .balances
                    .credit_once(user_id, invoice.invoice_id, amount)?;
                debug!(user_id, %amount, credited, "Credited ahead of merge");
            }
        }

        self.merge_into_exchange(&invoice, &credential, &coin).await?;
        self.finish_settlement(&invoice, amount)
    }

    /// Credit (or release the early-credit marker) and clear the pair
    fn finish_settlement(
        &self,
        invoice: &Invoice,
        amount: Decimal,
    ) -> Result<SettlementOutcome, TopupError> {
        let user_id = invoice.user_id.as_str();
        match self.settings.credit_policy {
            CreditPolicy::AfterMerge => {
                self.balances.credit(user_id, amount)?;
            }
            CreditPolicy::BeforeMerge => self.balances.release_credit_marker(user_id),
        }
        self.vault.clear(user_id);
        self.invoices.close(user_id);

        info!(
            user_id,
            coin_id = invoice.target_coin_id,
            invoice_id = %invoice.invoice_id,
            %amount,
            "Invoice settled: {} -> {}",
            InvoiceState::Invoicing,
            InvoiceState::Settled
        );

        Ok(SettlementOutcome::Settled {
            target_coin_id: invoice.target_coin_id,
            amount,
        })
    }

    /// Text reply for the "top up" entry point
    pub async fn create_invoice_reply(&self, user_id: &str, target_coin_id: CoinId) -> String {
        match self.create_invoice(user_id, target_coin_id).await {
            Ok(issued) => issued.to_string(),
            Err(e) => e.to_string(),
        }
    }

    /// Text reply for the "refresh" entry point
    pub async fn poll_settlement_reply(&self, user_id: &str) -> String {
        match self.poll_settlement(user_id).await {
            Ok(outcome) => outcome.to_string(),
            Err(e) => e.to_string(),
        }
    }

    async fn merge_into_exchange(
        &self,
        invoice: &Invoice,
        credential: &Credential,
        coin: &Coin,
    ) -> Result<(), TopupError> {
        let exchange_coin_id = self.settings.exchange_coin_id;

        // Held until the merge returns: the challenge embeds the exchange
        // coin's transaction count, which every merge advances.
        let _merge_guard = self.merge_lock.lock().await;

        let exchange = self
            .ledger_call(self.ledger.get_coin(exchange_coin_id))
            .await?;
        let challenge =
            MergeChallenge::new(exchange_coin_id, exchange.transaction_count(), coin.value);
        let signature = credential
            .sign_digest(&challenge.digest())
            .map_err(|e| TopupError::Signing(e.to_string()))?;

        let request = MergeRequest {
            origin: invoice.target_coin_id,
            target: exchange_coin_id,
            signature,
            volume: coin.volume,
        };

        let response = match self.ledger_call(self.ledger.merge(&request)).await {
            Ok(response) => response,
            Err(e) => {
                // No verdict came back; the ledger may still have applied it
                self.invoices.mark_merge_submitted(&invoice.user_id, coin.value);
                warn!(
                    user_id = %invoice.user_id,
                    coin_id = invoice.target_coin_id,
                    "Merge outcome unknown: {}",
                    e
                );
                return Err(e.into());
            }
        };

        match response {
            MergeResponse::Accepted => Ok(()),
            MergeResponse::Rejected(reason) => {
                warn!(
                    user_id = %invoice.user_id,
                    coin_id = invoice.target_coin_id,
                    %reason,
                    "Merge rejected, invoice stays open"
                );
                Err(TopupError::MergeRejected(reason))
            }
        }
    }

    async fn ledger_call<T>(
        &self,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let limit = self.settings.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(LedgerError::Timeout(limit)))
    }
}
