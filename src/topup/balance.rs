//! Internal CLC balances.
//!
//! Credit-only: balances never decrease here. `credit_once` backs the
//! credit-before-merge policy, where a failed merge leaves the invoice open
//! and the next poll must not credit the same invoice again.

use rust_decimal::Decimal;
use std::sync::Arc;
use ulid::Ulid;

use super::error::TopupError;
use super::store::{MemoryStore, UserStore};

pub struct BalanceLedger {
    balances: Arc<dyn UserStore<Decimal>>,
    /// Invoice already credited per user, kept until the invoice settles
    credited: Arc<dyn UserStore<Ulid>>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::with_stores(
            Arc::new(MemoryStore::<Decimal>::new()),
            Arc::new(MemoryStore::<Ulid>::new()),
        )
    }

    pub fn with_stores(
        balances: Arc<dyn UserStore<Decimal>>,
        credited: Arc<dyn UserStore<Ulid>>,
    ) -> Self {
        Self { balances, credited }
    }

    pub fn balance_of(&self, user_id: &str) -> Decimal {
        self.balances.get(user_id).unwrap_or(Decimal::ZERO)
    }

    /// Fail early if `credit` would fail, without touching anything
    pub fn check_credit(&self, user_id: &str, amount: Decimal) -> Result<(), TopupError> {
        if amount.is_sign_negative() {
            return Err(TopupError::InvalidCoinValue(amount.to_string()));
        }
        self.balance_of(user_id)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(TopupError::BalanceOverflow)
    }

    /// Add `amount` to the user's balance, creating it at zero. Returns the new balance.
    pub fn credit(&self, user_id: &str, amount: Decimal) -> Result<Decimal, TopupError> {
        if amount.is_sign_negative() {
            return Err(TopupError::InvalidCoinValue(amount.to_string()));
        }
        self.balances
            .update(user_id, &mut |current| {
                current.copied().unwrap_or(Decimal::ZERO).checked_add(amount)
            })
            .ok_or(TopupError::BalanceOverflow)
    }

    /// Credit at most once per invoice. Returns `Ok(false)` if this invoice
    /// was already credited.
    ///
    /// Callers must serialize calls per user.
    pub fn credit_once(
        &self,
        user_id: &str,
        invoice_id: Ulid,
        amount: Decimal,
    ) -> Result<bool, TopupError> {
        if self.credited.get(user_id) == Some(invoice_id) {
            return Ok(false);
        }
        self.credit(user_id, amount)?;
        self.credited.update(user_id, &mut |_| Some(invoice_id));
        Ok(true)
    }

    /// Forget the credited-invoice marker once the invoice is settled
    pub fn release_credit_marker(&self, user_id: &str) {
        self.credited.remove(user_id);
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_creates_entry_at_zero() {
        let ledger = BalanceLedger::new();
        assert_eq!(ledger.balance_of("u1"), Decimal::ZERO);
        assert_eq!(ledger.credit("u1", Decimal::new(105, 1)).unwrap(), Decimal::new(105, 1));
        assert_eq!(ledger.balance_of("u1"), Decimal::new(105, 1));
    }

    #[test]
    fn test_credit_is_additive() {
        let ledger = BalanceLedger::new();
        ledger.credit("u1", Decimal::new(1, 1)).unwrap();
        ledger.credit("u1", Decimal::new(2, 1)).unwrap();
        assert_eq!(ledger.balance_of("u1"), Decimal::new(3, 1));
    }

    #[test]
    fn test_credit_zero_is_allowed() {
        let ledger = BalanceLedger::new();
        assert_eq!(ledger.credit("u1", Decimal::ZERO).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_negative_credit_rejected() {
        let ledger = BalanceLedger::new();
        assert!(matches!(
            ledger.credit("u1", Decimal::new(-1, 0)),
            Err(TopupError::InvalidCoinValue(_))
        ));
        assert_eq!(ledger.balance_of("u1"), Decimal::ZERO);
    }

    #[test]
    fn test_overflow_rejected_and_balance_kept() {
        let ledger = BalanceLedger::new();
        ledger.credit("u1", Decimal::MAX).unwrap();
        assert_eq!(ledger.check_credit("u1", Decimal::ONE), Err(TopupError::BalanceOverflow));
        assert_eq!(ledger.credit("u1", Decimal::ONE), Err(TopupError::BalanceOverflow));
        assert_eq!(ledger.balance_of("u1"), Decimal::MAX);
    }

    #[test]
    fn test_credit_once_per_invoice() {
        let ledger = BalanceLedger::new();
        let invoice = Ulid::new();
        assert!(ledger.credit_once("u1", invoice, Decimal::TEN).unwrap());
        assert!(!ledger.credit_once("u1", invoice, Decimal::TEN).unwrap());
        assert_eq!(ledger.balance_of("u1"), Decimal::TEN);

        ledger.release_credit_marker("u1");
        let next_invoice = Ulid::new();
        assert!(ledger.credit_once("u1", next_invoice, Decimal::ONE).unwrap());
        assert_eq!(ledger.balance_of("u1"), Decimal::new(11, 0));
    }
}
