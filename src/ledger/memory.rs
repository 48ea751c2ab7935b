//! Process-local CLC ledger.
//!
//! Behaves like the public ledger for the two calls the engine makes,
//! including signature checks on merge, and lets tests inject outages,
//! latency and merge refusals.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::error::LedgerError;
use super::{Coin, CoinTransaction, LedgerClient, MergeRequest, MergeResponse};
use crate::core_types::CoinId;
use crate::topup::challenge::{MergeChallenge, verify_merge_signature};

#[derive(Debug, Default)]
struct LedgerState {
    coins: HashMap<CoinId, Coin>,
    offline: bool,
    latency: Option<Duration>,
    forced_merge_error: Option<String>,
    merge_log: Vec<MergeRequest>,
    coin_reads: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A panicking test thread must not wedge every other caller.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mint a coin with a single transaction to `holder`
    pub fn insert_coin(&self, coin_id: CoinId, value: Decimal, volume: Decimal, holder: &str) {
        let coin = Coin {
            id: coin_id,
            value,
            volume,
            transactions: vec![CoinTransaction {
                holder: holder.to_string(),
            }],
        };
        self.state().coins.insert(coin_id, coin);
    }

    /// Hand a coin over to a new holder. Returns false if the coin is unknown.
    pub fn transfer(&self, coin_id: CoinId, new_holder: &str) -> bool {
        match self.state().coins.get_mut(&coin_id) {
            Some(coin) => {
                coin.transactions.push(CoinTransaction {
                    holder: new_holder.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn coin(&self, coin_id: CoinId) -> Option<Coin> {
        self.state().coins.get(&coin_id).cloned()
    }

    /// Every call fails with a network error while offline
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Force every merge to be refused with `error`
    pub fn set_merge_error(&self, error: Option<&str>) {
        self.state().forced_merge_error = error.map(str::to_string);
    }

    /// All merge requests received, accepted or not
    pub fn merge_requests(&self) -> Vec<MergeRequest> {
        self.state().merge_log.clone()
    }

    pub fn coin_reads(&self) -> usize {
        self.state().coin_reads
    }

    async fn simulate_network(&self) -> Result<(), LedgerError> {
        let (offline, latency) = {
            let state = self.state();
            (state.offline, state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(LedgerError::Network("ledger offline".to_string()));
        }
        Ok(())
    }

    fn apply_merge(state: &mut LedgerState, request: &MergeRequest) -> MergeResponse {
        if let Some(error) = &state.forced_merge_error {
            return MergeResponse::Rejected(error.clone());
        }
        if request.origin == request.target {
            return MergeResponse::Rejected("cannot merge a coin into itself".to_string());
        }

        let Some(origin) = state.coins.get(&request.origin) else {
            return MergeResponse::Rejected("origin coin not found".to_string());
        };
        let Some(target) = state.coins.get(&request.target) else {
            return MergeResponse::Rejected("target coin not found".to_string());
        };
        let Some(holder) = origin.latest_holder() else {
            return MergeResponse::Rejected("origin coin has no holder".to_string());
        };

        let challenge =
            MergeChallenge::new(request.target, target.transaction_count(), origin.value);
        if !verify_merge_signature(holder, &challenge, &request.signature) {
            return MergeResponse::Rejected("invalid signature".to_string());
        }
        if request.volume != origin.volume {
            return MergeResponse::Rejected("volume mismatch".to_string());
        }

        let Some(origin) = state.coins.remove(&request.origin) else {
            return MergeResponse::Rejected("origin coin not found".to_string());
        };
        let Some(target) = state.coins.get_mut(&request.target) else {
            return MergeResponse::Rejected("target coin not found".to_string());
        };
        target.value += origin.value;
        target.volume += origin.volume;
        let target_holder = target.latest_holder().unwrap_or_default().to_string();
        target.transactions.push(CoinTransaction {
            holder: target_holder,
        });
        MergeResponse::Accepted
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_coin(&self, coin_id: CoinId) -> Result<Coin, LedgerError> {
        self.simulate_network().await?;
        let mut state = self.state();
        state.coin_reads += 1;
        state
            .coins
            .get(&coin_id)
            .cloned()
            .ok_or(LedgerError::CoinNotFound(coin_id))
    }

    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse, LedgerError> {
        self.simulate_network().await?;
        let mut state = self.state();
        state.merge_log.push(request.clone());
        Ok(Self::apply_merge(&mut state, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublicKeyFormat;
    use crate::topup::credential::Credential;

    const EXCHANGE: CoinId = 248;
    const DEPOSIT: CoinId = 16585;

    fn seeded() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.insert_coin(EXCHANGE, Decimal::new(100, 0), Decimal::new(40, 0), "exchange");
        ledger.insert_coin(DEPOSIT, Decimal::new(105, 1), Decimal::new(3, 0), "alice");
        ledger
    }

    fn signed_request(ledger: &InMemoryLedger, credential: &Credential) -> MergeRequest {
        let exchange = ledger.coin(EXCHANGE).unwrap();
        let deposit = ledger.coin(DEPOSIT).unwrap();
        let challenge =
            MergeChallenge::new(EXCHANGE, exchange.transaction_count(), deposit.value);
        MergeRequest {
            origin: DEPOSIT,
            target: EXCHANGE,
            signature: credential.sign_digest(&challenge.digest()).unwrap(),
            volume: deposit.volume,
        }
    }

    #[tokio::test]
    async fn test_get_coin_unknown() {
        let ledger = seeded();
        assert_eq!(
            ledger.get_coin(7).await.unwrap_err(),
            LedgerError::CoinNotFound(7)
        );
    }

    #[tokio::test]
    async fn test_offline_ledger_fails_reads() {
        let ledger = seeded();
        ledger.set_offline(true);
        assert!(matches!(
            ledger.get_coin(EXCHANGE).await,
            Err(LedgerError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_with_valid_signature_moves_value() {
        let ledger = seeded();
        let credential = Credential::generate(PublicKeyFormat::XOnly);
        assert!(ledger.transfer(DEPOSIT, credential.public_key().as_str()));

        let request = signed_request(&ledger, &credential);
        let response = ledger.merge(&request).await.unwrap();

        assert_eq!(response, MergeResponse::Accepted);
        assert!(ledger.coin(DEPOSIT).is_none());
        let exchange = ledger.coin(EXCHANGE).unwrap();
        assert_eq!(exchange.value, Decimal::new(1105, 1));
        assert_eq!(exchange.volume, Decimal::new(43, 0));
        assert_eq!(exchange.transaction_count(), 2);
    }

    #[tokio::test]
    async fn test_merge_rejects_non_holder_signature() {
        let ledger = seeded();
        let holder = Credential::generate(PublicKeyFormat::XOnly);
        let intruder = Credential::generate(PublicKeyFormat::XOnly);
        ledger.transfer(DEPOSIT, holder.public_key().as_str());

        let request = signed_request(&ledger, &intruder);
        let response = ledger.merge(&request).await.unwrap();

        assert_eq!(
            response,
            MergeResponse::Rejected("invalid signature".to_string())
        );
        assert!(ledger.coin(DEPOSIT).is_some());
    }

    #[tokio::test]
    async fn test_merge_rejects_stale_challenge() {
        let ledger = seeded();
        let credential = Credential::generate(PublicKeyFormat::Raw);
        ledger.transfer(DEPOSIT, credential.public_key().as_str());

        let request = signed_request(&ledger, &credential);
        // Someone else touches the exchange coin between signing and merging.
        ledger.transfer(EXCHANGE, "exchange");

        let response = ledger.merge(&request).await.unwrap();
        assert_eq!(
            response,
            MergeResponse::Rejected("invalid signature".to_string())
        );
    }

    #[tokio::test]
    async fn test_forced_merge_error_is_logged_and_returned() {
        let ledger = seeded();
        ledger.set_merge_error(Some("insufficient volume"));
        let credential = Credential::generate(PublicKeyFormat::XOnly);
        ledger.transfer(DEPOSIT, credential.public_key().as_str());

        let request = signed_request(&ledger, &credential);
        let response = ledger.merge(&request).await.unwrap();

        assert_eq!(
            response,
            MergeResponse::Rejected("insufficient volume".to_string())
        );
        assert_eq!(ledger.merge_requests(), vec![request]);
    }
}
