use std::time::Duration;
use thiserror::Error;

use crate::core_types::CoinId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Coin #{0} not found")]
    CoinNotFound(CoinId),

    #[error("Malformed ledger response: {0}")]
    Decode(String),
}
