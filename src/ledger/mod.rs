//! CLC Ledger Client
//!
//! The remote coin ledger is an external collaborator. The engine only needs
//! two calls from it: read a coin, and submit a signed merge.
//!
//! - [`HttpLedgerClient`] talks to the public ledger over HTTP
//! - [`InMemoryLedger`] is a process-local ledger for tests and `--mock` runs

pub mod error;
pub mod http;
pub mod memory;

pub use error::LedgerError;
pub use http::HttpLedgerClient;
pub use memory::InMemoryLedger;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::core_types::CoinId;

/// Read-only view of a coin as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    #[serde(default)]
    pub id: CoinId,
    /// JSON numbers arrive as f64 and are taken at their shortest
    /// round-trip decimal form; JSON strings are parsed exactly.
    #[serde(rename = "val")]
    pub value: Decimal,
    #[serde(rename = "vol")]
    pub volume: Decimal,
    #[serde(default)]
    pub transactions: Vec<CoinTransaction>,
}

/// One entry of a coin's ownership history. The ledger sends more fields,
/// only the holder matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub holder: String,
}

impl Coin {
    /// Holder established by the most recent transaction
    pub fn latest_holder(&self) -> Option<&str> {
        self.transactions.last().map(|tx| tx.holder.as_str())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Signed request to fold `origin` into `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub origin: CoinId,
    pub target: CoinId,
    /// Hex-encoded r||s ECDSA signature over the merge challenge digest
    pub signature: String,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResponse {
    Accepted,
    /// The ledger refused the merge and said why
    Rejected(String),
}

#[async_trait]
pub trait LedgerClient: Send + Sync + Debug {
    /// Fetch the current state of a coin
    async fn get_coin(&self, coin_id: CoinId) -> Result<Coin, LedgerError>;

    /// Submit a merge. Transport failures are `Err`, ledger refusals are
    /// `Ok(MergeResponse::Rejected)`.
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_deserialize_from_ledger_json() {
        let json = r#"{
            "val": 10.5,
            "vol": 3,
            "transactions": [
                {"holder": "aa", "time": 1700000000},
                {"holder": "bb", "time": 1700000100}
            ]
        }"#;

        let coin: Coin = serde_json::from_str(json).unwrap();

        assert_eq!(coin.value, Decimal::new(105, 1));
        assert_eq!(coin.volume, Decimal::new(3, 0));
        assert_eq!(coin.transaction_count(), 2);
        assert_eq!(coin.latest_holder(), Some("bb"));
    }

    #[test]
    fn test_coin_amounts_keep_their_decimal_digits() {
        let coin: Coin = serde_json::from_str(r#"{"val": 0.1, "vol": 1234.5678}"#).unwrap();
        assert_eq!(coin.value, Decimal::new(1, 1));
        assert_eq!(coin.volume, Decimal::new(12345678, 4));

        let coin: Coin =
            serde_json::from_str(r#"{"val": "1.000000000000000001", "vol": "2"}"#).unwrap();
        assert_eq!(coin.value, Decimal::new(1_000_000_000_000_000_001, 18));
    }

    #[test]
    fn test_coin_without_transactions_has_no_holder() {
        let coin: Coin = serde_json::from_str(r#"{"val": 1, "vol": 1}"#).unwrap();
        assert_eq!(coin.latest_holder(), None);
        assert_eq!(coin.transaction_count(), 0);
    }
}
