//! Invoice tracker: which coin each user was told to pay into.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use ulid::Ulid;

use super::error::TopupError;
use super::store::{MemoryStore, UserStore};
use crate::core_types::{CoinId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    /// Unique per opened invoice; used as the settlement idempotency token
    pub invoice_id: Ulid,
    pub user_id: UserId,
    pub target_coin_id: CoinId,
    pub opened_at: DateTime<Utc>,
    /// Coin value sent in a merge whose outcome never came back
    pub merge_submitted: Option<Decimal>,
}

pub struct InvoiceTracker {
    store: Arc<dyn UserStore<Invoice>>,
}

impl InvoiceTracker {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::<Invoice>::new()))
    }

    pub fn with_store(store: Arc<dyn UserStore<Invoice>>) -> Self {
        Self { store }
    }

    pub fn open(&self, user_id: &str, target_coin_id: CoinId) -> Result<Invoice, TopupError> {
        let invoice = Invoice {
            invoice_id: Ulid::new(),
            user_id: user_id.to_string(),
            target_coin_id,
            opened_at: Utc::now(),
            merge_submitted: None,
        };
        if self.store.insert_if_absent(user_id, invoice.clone()) {
            Ok(invoice)
        } else {
            Err(TopupError::AlreadyInvoicing)
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Invoice> {
        self.store.get(user_id)
    }

    /// Record that a merge of `value` may have reached the ledger.
    /// Returns false if the user has no open invoice.
    pub fn mark_merge_submitted(&self, user_id: &str, value: Decimal) -> bool {
        self.store
            .update(user_id, &mut |current| {
                current.map(|invoice| Invoice {
                    merge_submitted: Some(value),
                    ..invoice.clone()
                })
            })
            .is_some()
    }

    pub fn close(&self, user_id: &str) -> Option<Invoice> {
        self.store.remove(user_id)
    }

    pub fn open_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for InvoiceTracker {
    fn default() -> Self {
        Self::new()
    }
}
