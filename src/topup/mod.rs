//! CLC Top-up
//!
//! Moves value from the external CLC ledger into a user's internal balance.
//!
//! # Flow
//!
//! ```text
//! create_invoice(user, coin)          poll_settlement(user)  (repeated)
//!   ├─ InvoiceTracker.open              ├─ LedgerClient.get_coin(target)
//!   └─ CredentialVault.issue            ├─ latest holder == credential? else Pending
//!        → deposit address              ├─ sign "{exchange} {tx_count} {value}"
//!                                       ├─ LedgerClient.merge(target → exchange)
//!                                       ├─ BalanceLedger.credit
//!                                       └─ clear vault + tracker (paired)
//! ```
//!
//! # Invariants
//!
//! 1. **Paired lifecycle**: an invoice and its credential are created and
//!    removed together.
//! 2. **Exactly-once credit**: a settled invoice is gone, so it cannot be
//!    polled into a second credit.
//! 3. **No premature deletion**: every failure path leaves the pair in place
//!    so the poll can be retried.

pub mod balance;
pub mod challenge;
pub mod credential;
pub mod engine;
pub mod error;
pub mod invoice;
pub mod poller;
pub mod state;
pub mod store;
pub mod vault;


// Re-exports for convenience
pub use balance::BalanceLedger;
pub use challenge::{MergeChallenge, verify_merge_signature};
pub use credential::{Credential, PublicKeyFormat, PublicKeyHex};
pub use engine::{EngineSettings, InvoiceIssued, ReconciliationEngine, SettlementOutcome};
pub use error::TopupError;
pub use invoice::{Invoice, InvoiceTracker};
pub use poller::{PollReport, SettlementPoller};
pub use state::InvoiceState;
pub use store::{MemoryStore, UserStore};
pub use vault::CredentialVault;
