//! HTTP client for the public CLC ledger.
//!
//! Endpoints:
//! - `GET {base}/coin/{id}` → `{"coin": {"val", "vol", "transactions": [...]}}`
//! - `GET {base}/merge?origin=&target=&sign=&vol=` → `{}` or `{"error": "..."}`

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::error::LedgerError;
use super::{Coin, LedgerClient, MergeRequest, MergeResponse};
use crate::config::LedgerConfig;
use crate::core_types::CoinId;

#[derive(Debug)]
pub struct HttpLedgerClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Deserialize)]
struct CoinEnvelope {
    coin: Option<Coin>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct MergeEnvelope {
    error: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        info!(
            "Initializing ledger client at {} (timeout {:?})",
            config.base_url, timeout
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn coin_url(&self, coin_id: CoinId) -> String {
        format!("{}/coin/{}", self.base_url, coin_id)
    }

    fn merge_url(&self) -> String {
        format!("{}/merge", self.base_url)
    }

    fn map_transport(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else {
            LedgerError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_coin(&self, coin_id: CoinId) -> Result<Coin, LedgerError> {
        let response = self
            .client
            .get(self.coin_url(coin_id))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::CoinNotFound(coin_id));
        }

        let envelope: CoinEnvelope = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("coin #{}: {}", coin_id, e)))?;

        if let Some(error) = envelope.error {
            debug!(coin_id, %error, "Ledger refused coin lookup");
            return Err(LedgerError::CoinNotFound(coin_id));
        }

        let mut coin = envelope
            .coin
            .ok_or_else(|| LedgerError::Decode(format!("coin #{}: missing `coin` field", coin_id)))?;
        coin.id = coin_id;
        Ok(coin)
    }

    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse, LedgerError> {
        let response = self
            .client
            .get(self.merge_url())
            .query(&[
                ("origin", request.origin.to_string()),
                ("target", request.target.to_string()),
                ("sign", request.signature.clone()),
                ("vol", request.volume.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let envelope: Result<MergeEnvelope, _> = response.json().await;

        match envelope {
            Ok(MergeEnvelope { error: Some(error) }) => Ok(MergeResponse::Rejected(error)),
            Ok(MergeEnvelope { error: None }) if status.is_success() => Ok(MergeResponse::Accepted),
            Ok(MergeEnvelope { error: None }) => {
                Err(LedgerError::Network(format!("merge returned HTTP {}", status)))
            }
            Err(e) => Err(LedgerError::Decode(format!("merge: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> LedgerConfig {
        LedgerConfig {
            base_url: base_url.to_string(),
            exchange_coin_id: 248,
            request_timeout_ms: 1500,
        }
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let client = HttpLedgerClient::new(&config("https://clc.ix.tc/")).unwrap();
        assert_eq!(client.coin_url(16585), "https://clc.ix.tc/coin/16585");
        assert_eq!(client.merge_url(), "https://clc.ix.tc/merge");
        assert_eq!(client.timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_network_error() {
        // Port 9 (discard) on localhost is closed on CI runners.
        let client = HttpLedgerClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client.get_coin(1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Network(_) | LedgerError::Timeout(_)
        ));
    }

    #[test]
    fn test_coin_envelope_with_error() {
        let envelope: CoinEnvelope =
            serde_json::from_str(r#"{"error": "coin not found"}"#).unwrap();
        assert!(envelope.coin.is_none());
        assert_eq!(envelope.error.as_deref(), Some("coin not found"));
    }

    #[test]
    fn test_merge_envelope_empty_object() {
        let envelope: MergeEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.error.is_none());
    }
}
