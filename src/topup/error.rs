//! Top-up error types.
//!
//! `Display` is the text shown to the user; `code()` is the stable
//! identifier for logs and API responses.

use thiserror::Error;

use crate::core_types::{CoinId, UserId};
use crate::ledger::LedgerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopupError {
    // === Invoice lifecycle ===
    #[error("Already invoicing!")]
    AlreadyInvoicing,

    #[error("Not yet invoicing!")]
    NotInvoicing,

    #[error("Coin #{0} cannot be used as a deposit target")]
    InvalidTargetCoin(CoinId),

    // === Ledger ===
    #[error("Ledger unavailable, try again in a few seconds: {0}")]
    LedgerUnavailable(String),

    #[error("Error merging into wallet: {0}")]
    MergeRejected(String),

    #[error("Invalid coin value: {0}")]
    InvalidCoinValue(String),

    // === Internal ===
    #[error("Balance overflow")]
    BalanceOverflow,

    #[error("Deposit credential missing for user {0}")]
    CredentialMissing(UserId),

    #[error("Failed to sign merge challenge: {0}")]
    Signing(String),
}

impl TopupError {
    pub fn code(&self) -> &'static str {
        match self {
            TopupError::AlreadyInvoicing => "ALREADY_INVOICING",
            TopupError::NotInvoicing => "NOT_INVOICING",
            TopupError::InvalidTargetCoin(_) => "INVALID_TARGET_COIN",
            TopupError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            TopupError::MergeRejected(_) => "MERGE_REJECTED",
            TopupError::InvalidCoinValue(_) => "INVALID_COIN_VALUE",
            TopupError::BalanceOverflow => "BALANCE_OVERFLOW",
            TopupError::CredentialMissing(_) => "CREDENTIAL_MISSING",
            TopupError::Signing(_) => "SIGNING_FAILED",
        }
    }

    /// Whether polling again may succeed without anyone changing the invoice
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TopupError::LedgerUnavailable(_) | TopupError::MergeRejected(_)
        )
    }
}

impl From<LedgerError> for TopupError {
    fn from(e: LedgerError) -> Self {
        TopupError::LedgerUnavailable(e.to_string())
    }
}
